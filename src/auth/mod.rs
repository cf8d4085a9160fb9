pub mod models;
pub mod jwt;
pub mod middleware;

pub use models::*;
pub use jwt::*;
pub use middleware::*;