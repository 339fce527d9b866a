//! Table definitions. Every statement is idempotent and runs at startup.

pub const METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    id INTEGER NOT NULL PRIMARY KEY,
    full_path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    file_mode INTEGER NOT NULL,
    is_directory INTEGER NOT NULL,
    created_at DATETIME NOT NULL,
    modified_at DATETIME NOT NULL
)
"#;

pub const DISK_STATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS disk_stats (
    id INTEGER NOT NULL PRIMARY KEY,
    free INTEGER NOT NULL,
    available INTEGER NOT NULL,
    size INTEGER NOT NULL,
    used INTEGER NOT NULL,
    used_pct FLOAT NOT NULL,
    created_at DATETIME NOT NULL
)
"#;

pub const PROC_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS proc (
    id INTEGER NOT NULL PRIMARY KEY,
    command TEXT NOT NULL,
    args TEXT NOT NULL,
    is_executed INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL
)
"#;

pub const PROC_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS proc_results (
    id INTEGER NOT NULL PRIMARY KEY,
    stdout TEXT NOT NULL,
    stderr TEXT NOT NULL,
    created_at DATETIME NOT NULL
)
"#;

pub const INDICES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_metadata_full_path ON metadata (full_path)",
    "CREATE INDEX IF NOT EXISTS idx_metadata_created_at ON metadata (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_disk_stats_created_at ON disk_stats (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_proc_is_executed ON proc (is_executed)",
];

pub const TABLES: &[&str] = &[
    METADATA_TABLE,
    DISK_STATS_TABLE,
    PROC_TABLE,
    PROC_RESULTS_TABLE,
];
