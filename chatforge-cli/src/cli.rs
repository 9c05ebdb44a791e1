//! Command-line surface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Multi-tenant chatbot platform core
#[derive(Parser, Debug)]
#[command(name = "chatforge", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the platform: supervisor fleet or single-process worker
    Serve,

    /// Configuration tooling
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print a sample configuration file
    Generate,

    /// Validate a configuration file
    Validate { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["chatforge", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_serve_with_config() {
        let cli =
            Cli::try_parse_from(["chatforge", "serve", "--config", "/etc/chatforge.yaml"]).unwrap();
        assert_eq!(
            cli.config.as_deref(),
            Some(std::path::Path::new("/etc/chatforge.yaml"))
        );
    }

    #[test]
    fn test_parse_config_generate() {
        let cli = Cli::try_parse_from(["chatforge", "config", "generate"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Generate
            }
        ));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli =
            Cli::try_parse_from(["chatforge", "config", "validate", "cf.yaml"]).unwrap();
        match cli.command {
            Commands::Config {
                command: ConfigCommands::Validate { path },
            } => assert_eq!(path, PathBuf::from("cf.yaml")),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
