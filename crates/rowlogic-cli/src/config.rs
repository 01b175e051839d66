//! CLI configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rowlogic_core::config::DEFAULT_DECIMAL_SCALE;
use rowlogic_core::{EngineConfig, StorageConfig};

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "rowlogic=info";

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "rowlogic")]
#[command(version, about = "Declarative derivation rules over the sample order domain", long_about = None)]
pub struct Args {
    /// Sled data directory. Rows are kept in memory when omitted.
    #[arg(short, long, global = true)]
    pub data_path: Option<PathBuf>,

    /// Decimal places kept on derived values.
    #[arg(long, global = true, default_value_t = DEFAULT_DECIMAL_SCALE)]
    pub scale: u32,

    /// Flush sled on every commit.
    #[arg(long, global = true)]
    pub sync: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What to run.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Load the sample data and print the derived state.
    Demo,
    /// Print the rules and their dependency graph.
    Graph,
    /// Run the credit-limit walkthrough.
    Scenario,
}

/// Resolved CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Command to run.
    pub command: Command,
    /// Durable storage, or `None` for the in-memory store.
    pub storage: Option<StorageConfig>,
    /// Engine settings.
    pub engine: EngineConfig,
}

impl Args {
    /// Convert command-line arguments to configuration.
    pub fn into_config(self) -> CliConfig {
        let storage = self.data_path.map(|path| {
            let config = StorageConfig::new(path);
            if self.sync {
                config.with_sync_commits()
            } else {
                config
            }
        });

        CliConfig {
            command: self.command,
            storage,
            engine: EngineConfig::new().with_decimal_scale(self.scale),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_memory() {
        let config = Args::parse_from(["rowlogic", "demo"]).into_config();
        assert_eq!(config.command, Command::Demo);
        assert!(config.storage.is_none());
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_data_path_and_scale() {
        let config = Args::parse_from([
            "rowlogic",
            "scenario",
            "--data-path",
            "/tmp/rowlogic",
            "--scale",
            "4",
            "--sync",
        ])
        .into_config();

        assert_eq!(config.command, Command::Scenario);
        let storage = config.storage.unwrap();
        assert_eq!(storage.path, PathBuf::from("/tmp/rowlogic"));
        assert!(storage.flushes_on_commit());
        assert_eq!(config.engine.decimal_scale, 4);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["rowlogic"]).is_err());
    }
}
