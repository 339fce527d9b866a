use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::DiskStatsRow;
use crate::disk::DiskUsage;
use crate::error::Result;

#[derive(Clone)]
pub struct DiskStatsRepository {
    pool: SqlitePool,
}

impl fmt::Debug for DiskStatsRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskStatsRepository")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl DiskStatsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, usage: &DiskUsage, created_at: DateTime<Utc>) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO disk_stats (free, available, size, used, used_pct, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(clamp(usage.free))
        .bind(clamp(usage.available))
        .bind(clamp(usage.size))
        .bind(clamp(usage.used))
        .bind(usage.used_pct)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Keep the `keep` newest rows by `created_at` and delete the rest.
    pub async fn retain_newest(&self, keep: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM disk_stats
            WHERE id NOT IN (
                SELECT id FROM disk_stats
                ORDER BY created_at DESC, id DESC
                LIMIT ?
            )
            "#,
        )
        .bind(i64::from(keep))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_all(&self) -> Result<Vec<DiskStatsRow>> {
        let rows = sqlx::query_as::<_, DiskStatsRow>(
            r#"
            SELECT id, free, available, size, used, used_pct, created_at
            FROM disk_stats
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn latest(&self) -> Result<Option<DiskStatsRow>> {
        let row = sqlx::query_as::<_, DiskStatsRow>(
            r#"
            SELECT id, free, available, size, used, used_pct, created_at
            FROM disk_stats
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::Duration;
    use tempfile::TempDir;

    fn usage(free: u64) -> DiskUsage {
        DiskUsage::from_parts(1_000, free, free)
    }

    #[tokio::test]
    async fn retention_keeps_newest_rows() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("fsd.db")).await.unwrap();
        db.initialize_schema().await.unwrap();
        let repo = db.disk_stats();

        let base = Utc::now() - Duration::seconds(60);
        for i in 0..12 {
            repo.insert(&usage(i), base + Duration::seconds(i as i64))
                .await
                .unwrap();
        }

        assert_eq!(repo.retain_newest(5).await.unwrap(), 7);
        let rows = repo.list_all().await.unwrap();
        assert_eq!(rows.len(), 5);
        let frees: Vec<i64> = rows.iter().map(|row| row.free).collect();
        assert_eq!(frees, vec![11, 10, 9, 8, 7]);

        let latest = repo.latest().await.unwrap().unwrap();
        assert_eq!(latest.free, 11);
        assert_eq!(latest.used, 989);
    }

    #[tokio::test]
    async fn latest_on_empty_table_is_none() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("fsd.db")).await.unwrap();
        db.initialize_schema().await.unwrap();
        assert!(db.disk_stats().latest().await.unwrap().is_none());
    }
}
