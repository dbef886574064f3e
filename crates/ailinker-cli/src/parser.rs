//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Voice-assistant worker nodes: chat replies in, paced audio frames out.
#[derive(Parser)]
#[command(name = "ailinker")]
#[command(about = "Run ailinker chat and TTS nodes")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short = 'c', long = "config", global = true, env = "AILINKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from(["ailinker", "--verbose", "run", "--config", "/tmp/a.json"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.json")));
        assert!(matches!(cli.command, Some(Commands::Run)));
    }

    #[test]
    fn test_node_name_override() {
        let cli = Cli::parse_from(["ailinker", "tts", "--name", "tts-2"]);
        match cli.command {
            Some(Commands::Tts { name }) => assert_eq!(name.as_deref(), Some("tts-2")),
            _ => panic!("expected tts subcommand"),
        }
    }

    #[test]
    fn test_no_command() {
        let cli = Cli::parse_from(["ailinker"]);
        assert!(cli.command.is_none());
    }
}
