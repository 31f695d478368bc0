pub mod bgprocess_handlers;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod schema_diff_handlers;

pub use response::{ApiError, ApiResponse, ApiResult};
pub use routes::*;
