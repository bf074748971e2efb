pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod highlight;
pub mod loader;
pub mod store;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
