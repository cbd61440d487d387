pub mod defaults;
mod repo_types;
mod services;

pub use repo_types::DeviceSettings;
