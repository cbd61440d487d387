pub mod auth;
pub mod config;
pub mod deploy;
pub mod device_settings;
pub mod error;
pub mod models;
pub mod participants;
pub mod reporting;
pub mod researchers;
pub mod store;
pub mod study;
pub mod surveys;

pub use error::{ModelError, ModelResult};
