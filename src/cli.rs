//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Posture Sentinel - webcam slouch monitor
#[derive(Parser, Debug)]
#[command(name = "posture-sentinel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the webcam and alert on sustained slouching (needs the `desktop` feature)
    Watch {
        /// Camera index, overriding the config file
        #[arg(long)]
        camera: Option<i32>,

        /// Pose model path, overriding the config file
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Run a recorded landmark trace (JSON lines) through the posture engine
    Replay {
        /// Trace file
        #[arg(short, long)]
        input: PathBuf,

        /// Print every frame result, not just the summary
        #[arg(long)]
        frames: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_replay() {
        let cli = Cli::try_parse_from([
            "posture-sentinel",
            "replay",
            "-i",
            "trace.jsonl",
            "--frames",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay { input, frames } => {
                assert_eq!(input, PathBuf::from("trace.jsonl"));
                assert!(frames);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = ["posture-sentinel", "config", "show", "-v", "-c", "my.toml"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
        match cli.command {
            Commands::Config { action } => assert!(matches!(action, ConfigAction::Show)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_watch_overrides() {
        let cli = Cli::try_parse_from(["posture-sentinel", "watch", "--camera", "1"]).unwrap();
        match cli.command {
            Commands::Watch { camera, model } => {
                assert_eq!(camera, Some(1));
                assert!(model.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
