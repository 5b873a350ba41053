pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

pub use adapters::LocalStorage;
pub use config::AppConfig;

#[cfg(feature = "cli")]
pub use config::cli::Cli;

pub use core::report::{ReportEngine, ReportPipeline, ReportRequest};
pub use utils::error::{InventoryError, Result};
