use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use electromart_core::Config;
use tracing_subscriber::EnvFilter;

fn filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.log_level;
        EnvFilter::new(format!("electromart={level},electromart_core={level}"))
    })
}

/// The chat screen owns the terminal, so logs go to
/// `<cache dir>/electromart/electromart.log`.
pub fn init_file(config: &Config) -> Result<PathBuf> {
    let log_dir = dirs::cache_dir()
        .ok_or_else(|| anyhow!("Could not determine cache directory"))?
        .join("electromart");
    fs::create_dir_all(&log_dir)?;

    let path = log_dir.join("electromart.log");
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();

    Ok(path)
}

pub fn init_stderr(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
