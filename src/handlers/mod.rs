pub mod applications;
pub mod auth;
pub mod certificates;
pub mod containers;
pub mod deploy_submission;
pub mod incoming_webhook;
pub mod logs;
pub mod middlewares;
pub mod networks;
pub mod notifications;
pub mod projects;
pub mod repos;
pub mod routes;
pub mod secrets;
pub mod stats;
pub mod system;
pub mod user;
pub mod webhooks;

pub use applications::*;
pub use auth::*;
pub use certificates::*;
pub use containers::*;
pub use deploy_submission::*;
pub use incoming_webhook::*;
pub use logs::*;
pub use middlewares::*;
pub use networks::*;
pub use notifications::*;
pub use projects::*;
pub use repos::*;
pub use routes::*;
pub use secrets::*;
pub use stats::*;
pub use system::*;
pub use user::*;
pub use webhooks::*;
