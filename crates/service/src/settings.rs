use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SETTINGS_FILE: &str = "combination-generator.json";

/// Last-used run inputs, restored on the next start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSettings {
    #[serde(default)]
    pub input_dir: Option<PathBuf>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_files_per_combination")]
    pub files_per_combination: usize,
}

fn default_files_per_combination() -> usize {
    2
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            input_dir: None,
            output_dir: None,
            files_per_combination: default_files_per_combination(),
        }
    }
}

/// Reads settings from `path`; a missing file yields the defaults.
pub fn load_settings(path: impl AsRef<Path>) -> Result<RunSettings> {
    let path = path.as_ref();
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RunSettings::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read settings {}", path.display()))
        }
    };
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_settings(path: impl AsRef<Path>, settings: &RunSettings) -> Result<()> {
    let path = path.as_ref();
    let payload = serde_json::to_string_pretty(settings).context("failed to serialize settings")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write settings to {}", path.display()))?;
    Ok(())
}
