pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{RunSettings, TomlConfig};

pub use adapters::{database::SqlxDatabase, mail::SmtpNotifier, storage::LocalStorage};
pub use core::{etl::ExportEngine, pipeline::QueryPipeline};
pub use utils::error::{ReportError, Result};
