pub mod browser_node;
pub mod common;
pub mod response;
pub mod schema_diff;
pub mod server;

pub use browser_node::*;
pub use common::*;
pub use response::*;
pub use schema_diff::*;
pub use server::*;
