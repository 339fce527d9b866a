use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Usage of the filesystem that holds a path, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiskUsage {
    pub size: u64,
    pub free: u64,
    /// Bytes available to unprivileged users.
    pub available: u64,
    pub used: u64,
    /// `used / size`, in `[0, 1]`.
    pub used_pct: f64,
}

impl DiskUsage {
    pub fn sample(path: &Path) -> Result<Self> {
        let stats = fs2::statvfs(path)?;
        Ok(Self::from_parts(
            stats.total_space(),
            stats.free_space(),
            stats.available_space(),
        ))
    }

    pub fn from_parts(size: u64, free: u64, available: u64) -> Self {
        let used = size.saturating_sub(free);
        let used_pct = if size == 0 {
            0.0
        } else {
            used as f64 / size as f64
        };
        Self {
            size,
            free,
            available,
            used,
            used_pct,
        }
    }
}
