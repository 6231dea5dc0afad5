pub mod cluster;
pub mod config;
pub mod error;
pub mod github;
pub mod provisioning;
pub mod web;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
