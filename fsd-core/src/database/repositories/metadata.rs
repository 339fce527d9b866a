use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::database::models::{MetadataRow, NewMetadata, SnapshotItem};
use crate::error::{FsdError, Result};

const INSERT_METADATA: &str = r#"
INSERT INTO metadata (full_path, size_bytes, file_mode, is_directory, created_at, modified_at)
VALUES (?, ?, ?, ?, ?, ?)
"#;

const SELECT_COLUMNS: &str =
    "id, full_path, size_bytes, file_mode, is_directory, created_at, modified_at";

#[derive(Clone)]
pub struct MetadataRepository {
    pool: SqlitePool,
}

impl fmt::Debug for MetadataRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRepository")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl MetadataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, row: &NewMetadata) -> Result<i64> {
        let result = bind_metadata(sqlx::query(INSERT_METADATA), row)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Insert every entry from `entries` inside one transaction.
    ///
    /// The transaction commits only after the producer sends
    /// [`SnapshotItem::Done`]. The first `Err` from the producer (or from an
    /// insert) aborts the snapshot, as does the channel closing early, and
    /// the transaction rolls back when dropped.
    pub async fn insert_snapshot(
        &self,
        mut entries: mpsc::Receiver<Result<SnapshotItem>>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        loop {
            match entries.recv().await {
                Some(item) => match item? {
                    SnapshotItem::Row(entry) => {
                        bind_metadata(sqlx::query(INSERT_METADATA), &entry)
                            .execute(&mut *tx)
                            .await?;
                        inserted += 1;
                    }
                    SnapshotItem::Done => break,
                },
                None => {
                    return Err(FsdError::Internal(format!(
                        "snapshot producer stopped after {inserted} rows without finishing"
                    )));
                }
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn delete_by_path(&self, full_path: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metadata WHERE full_path = ?")
            .bind(full_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metadata WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// All rows, newest first.
    pub async fn list_all(&self) -> Result<Vec<MetadataRow>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM metadata ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, MetadataRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// The row with the greatest `created_at` for every distinct path.
    pub async fn latest_per_path(&self) -> Result<Vec<MetadataRow>> {
        let rows = sqlx::query_as::<_, MetadataRow>(
            r#"
            SELECT m.id, m.full_path, m.size_bytes, m.file_mode, m.is_directory,
                   m.created_at, m.modified_at
            FROM metadata m
            JOIN (
                SELECT full_path, MAX(created_at) AS max_created_at
                FROM metadata
                GROUP BY full_path
            ) latest
              ON m.full_path = latest.full_path
             AND m.created_at = latest.max_created_at
            ORDER BY m.full_path ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn rows_for_path(&self, full_path: &str) -> Result<Vec<MetadataRow>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM metadata WHERE full_path = ? ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, MetadataRow>(&sql)
            .bind(full_path)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM metadata")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn bind_metadata<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    row: &'q NewMetadata,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(row.full_path.as_str())
        .bind(i64::try_from(row.size_bytes).unwrap_or(i64::MAX))
        .bind(i64::from(row.file_mode))
        .bind(i64::from(row.is_directory))
        .bind(row.created_at)
        .bind(row.modified_at)
}
