mod app;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use landmark_overlay::OverlayConfig;

fn main() -> Result<()> {
    env_logger::init();

    let mut config_path: Option<PathBuf> = None;
    let mut image_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            "--image" => {
                let path = args.next().context("--image needs a path")?;
                image_path = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("usage: landmark-overlay [--config <file.toml>] [--image <input>]");
                return Ok(());
            }
            other => return Err(anyhow!("unknown argument {other}")),
        }
    }

    let config = match &config_path {
        Some(path) => OverlayConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => OverlayConfig::default(),
    };

    match image_path {
        Some(path) => app::run_still(&config, &path),
        None => app::run_live(&config),
    }
}
