use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::ReportOrder;
use crate::output::OutputFormat;

/// Optional `specavg.toml`. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisSection {
    pub block_size: Option<i64>,
    pub hop_size: Option<i64>,
    pub threshold: Option<f64>,
    pub threads: Option<i64>,
    pub timeout_secs: Option<f64>,
    pub power_of_two: Option<bool>,
    pub parallel: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    pub order: Option<ReportOrder>,
    pub format: Option<OutputFormat>,
}

pub fn default_block_size() -> i64 { 1024 }
pub fn default_hop_size() -> i64 { 512 }
pub fn default_threshold() -> f64 { 0.01 }
pub fn default_threads() -> i64 { 1 }
pub fn default_timeout_secs() -> f64 { crate::analysis::DEFAULT_TIMEOUT.as_secs_f64() }

/// Explicit path, then `./specavg.toml`, then the user config locations.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("specavg.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("specavg").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("specavg").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
