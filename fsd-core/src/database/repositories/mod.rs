pub mod disk_stats;
pub mod metadata;
pub mod proc;

pub use disk_stats::DiskStatsRepository;
pub use metadata::MetadataRepository;
pub use proc::ProcRepository;
