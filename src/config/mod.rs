pub mod env;
mod loader;

pub use env::{AppConfig, DeliveryMode, DirectoryConfig, PollingConfig};
pub use loader::load_config;
