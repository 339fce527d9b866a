use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One observation of a path, taken by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MetadataRow {
    pub id: i64,
    pub full_path: String,
    pub size_bytes: i64,
    /// Permission bits only.
    pub file_mode: i64,
    pub is_directory: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Values for a metadata insert; `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMetadata {
    pub full_path: String,
    pub size_bytes: u64,
    pub file_mode: u32,
    pub is_directory: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// One item from a snapshot producer. A snapshot is only complete once the
/// producer has sent `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotItem {
    Row(NewMetadata),
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DiskStatsRow {
    pub id: i64,
    pub free: i64,
    pub available: i64,
    pub size: i64,
    pub used: i64,
    pub used_pct: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProcRow {
    pub id: i64,
    pub command: String,
    /// Space-joined argv tail.
    pub args: String,
    pub is_executed: i64,
    pub created_at: DateTime<Utc>,
}

impl ProcRow {
    pub fn argv(&self) -> Vec<String> {
        self.args.split_whitespace().map(str::to_owned).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProcResultRow {
    pub id: i64,
    pub stdout: String,
    pub stderr: String,
    pub created_at: DateTime<Utc>,
}
