pub mod models;
pub mod webhook_models;
