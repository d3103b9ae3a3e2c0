use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Result;
use posture_sentinel::cli::{Cli, Commands, ConfigAction};
use posture_sentinel::config::{Config, DEFAULT_CONFIG_PATH};
use posture_sentinel::replay::replay_reader;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    match cli.command {
        Commands::Watch { camera, model } => {
            let mut config = Config::load_or_default(&config_path)?;
            if let Some(camera) = camera {
                config.camera_id = camera;
            }
            if let Some(model) = model {
                config.model_path = model.to_string_lossy().into_owned();
            }
            run_watch(&config)?;
        }
        Commands::Replay { input, frames } => {
            let config = Config::load_or_default(&config_path)?;
            run_replay(&input, frames, &config)?;
        }
        Commands::Config { action } => run_config(action, &config_path)?,
    }

    Ok(())
}

#[cfg(feature = "desktop")]
fn run_watch(config: &Config) -> Result<()> {
    info!(camera_id = config.camera_id, model = %config.model_path, "starting posture sentinel");
    let mut sentinel = posture_sentinel::app::Sentinel::from_config(config)?;
    sentinel.run()
}

#[cfg(not(feature = "desktop"))]
fn run_watch(_config: &Config) -> Result<()> {
    anyhow::bail!("this build has no camera support; rebuild with `--features desktop`")
}

fn run_replay(input: &Path, frames: bool, config: &Config) -> Result<()> {
    info!(input = %input.display(), "replaying trace");
    let reader = BufReader::new(File::open(input)?);

    let mut frame_error = None;
    let summary = replay_reader(reader, config.engine_settings()?, |result| {
        if frames && frame_error.is_none() {
            match serde_json::to_string(result) {
                Ok(line) => println!("{line}"),
                Err(e) => frame_error = Some(e),
            }
        }
    })?;
    if let Some(e) = frame_error {
        return Err(e.into());
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_config(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save(path)?;
            info!(path = %path.display(), "wrote default config");
        }
    }
    Ok(())
}
