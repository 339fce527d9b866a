use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::{ProcResultRow, ProcRow};
use crate::error::Result;

#[derive(Clone)]
pub struct ProcRepository {
    pool: SqlitePool,
}

impl fmt::Debug for ProcRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcRepository")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl ProcRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Queue a new proc. The row starts unexecuted.
    pub async fn insert(
        &self,
        command: &str,
        args: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ProcRow> {
        let row = sqlx::query_as::<_, ProcRow>(
            r#"
            INSERT INTO proc (command, args, is_executed, created_at)
            VALUES (?, ?, 0, ?)
            RETURNING id, command, args, is_executed, created_at
            "#,
        )
        .bind(command)
        .bind(args)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_all(&self) -> Result<Vec<ProcRow>> {
        let rows = sqlx::query_as::<_, ProcRow>(
            r#"
            SELECT id, command, args, is_executed, created_at
            FROM proc
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Rows not yet claimed by any worker, oldest first.
    pub async fn pending(&self) -> Result<Vec<ProcRow>> {
        let rows = sqlx::query_as::<_, ProcRow>(
            r#"
            SELECT id, command, args, is_executed, created_at
            FROM proc
            WHERE is_executed = 0
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Atomically flip `is_executed` from 0 to 1. Returns `false` when some
    /// other worker already holds the row.
    pub async fn claim(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE proc SET is_executed = 1 WHERE id = ? AND is_executed = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Persist captured output. The primary key rejects a second result for
    /// the same id.
    pub async fn insert_result(&self, result: &ProcResultRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO proc_results (id, stdout, stderr, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(result.id)
        .bind(result.stdout.as_str())
        .bind(result.stderr.as_str())
        .bind(result.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_results(&self) -> Result<Vec<ProcResultRow>> {
        let rows = sqlx::query_as::<_, ProcResultRow>(
            r#"
            SELECT id, stdout, stderr, created_at
            FROM proc_results
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn results_for(&self, id: i64) -> Result<Vec<ProcResultRow>> {
        let rows = sqlx::query_as::<_, ProcResultRow>(
            "SELECT id, stdout, stderr, created_at FROM proc_results WHERE id = ?",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, ProcRepository) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("fsd.db")).await.unwrap();
        db.initialize_schema().await.unwrap();
        (dir, db.procs())
    }

    #[tokio::test]
    async fn claim_succeeds_once() {
        let (_dir, repo) = setup().await;
        let row = repo.insert("mkdir", "/tmp/fsd/x", Utc::now()).await.unwrap();
        assert_eq!(row.is_executed, 0);
        assert_eq!(repo.pending().await.unwrap().len(), 1);

        assert!(repo.claim(row.id).await.unwrap());
        assert!(!repo.claim(row.id).await.unwrap());
        assert!(repo.pending().await.unwrap().is_empty());
        assert_eq!(repo.list_all().await.unwrap()[0].is_executed, 1);
    }

    #[tokio::test]
    async fn duplicate_result_is_rejected() {
        let (_dir, repo) = setup().await;
        let row = repo.insert("mkdir", "/tmp/fsd/y", Utc::now()).await.unwrap();
        let result = ProcResultRow {
            id: row.id,
            stdout: "out".into(),
            stderr: String::new(),
            created_at: row.created_at,
        };

        repo.insert_result(&result).await.unwrap();
        assert!(repo.insert_result(&result).await.is_err());

        let stored = repo.results_for(row.id).await.unwrap();
        assert_eq!(stored, vec![result]);
        assert!(repo.results_for(row.id + 1).await.unwrap().is_empty());
        assert_eq!(repo.list_results().await.unwrap().len(), 1);
    }
}
