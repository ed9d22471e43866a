use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Optional defaults merged under CLI flags: host URL, polling cadence and
/// account credentials. All fields are optional; an absent file means plain
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub host: Option<String>,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Option<Duration>,
    pub email: Option<String>,
    pub password: Option<String>,
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scrapedeck").join("config.json"))
}

fn parse(raw: &str) -> Result<ConsoleConfig> {
    serde_json::from_str(raw).context("parse config file")
}

/// Load the config file if one exists. A malformed file is an error so typos
/// don't silently fall back to defaults.
pub fn load() -> Result<Option<ConsoleConfig>> {
    let Some(path) = config_path() else {
        return Ok(None);
    };
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return Ok(None),
    };
    parse(&raw)
        .with_context(|| format!("in {}", path.display()))
        .map(Some)
}

/// Config problems shouldn't stop the console; warn on stderr and continue
/// with defaults.
pub fn load_or_warn() -> ConsoleConfig {
    match load() {
        Ok(Some(config)) => config,
        Ok(None) => ConsoleConfig::default(),
        Err(e) => {
            eprintln!("Warning: ignoring config: {e:#}");
            ConsoleConfig::default()
        }
    }
}
