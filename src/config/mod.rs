#[cfg(feature = "cli")]
pub mod cli;
pub mod connection;
pub mod settings;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::{CliConfig, Command};
pub use connection::ConnectionDetails;
pub use settings::RunSettings;
pub use toml_config::TomlConfig;
