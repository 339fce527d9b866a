pub mod app_state;
pub mod errors;
pub mod response;

pub use app_state::AppState;
pub use errors::{AppError, AppResult};
pub use response::ApiResponse;
