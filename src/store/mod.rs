pub mod manager;
pub mod postgres;
pub mod traits;

pub use manager::*;
pub use postgres::*;
pub use traits::*;
