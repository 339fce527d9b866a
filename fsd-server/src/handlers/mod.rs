pub mod disk;
pub mod health;
pub mod metadata;
pub mod proc;
