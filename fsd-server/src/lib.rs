//! HTTP surface and process lifecycle for fsd.

pub mod handlers;
pub mod infra;
pub mod routes;
pub mod runtime;

pub use infra::AppState;
