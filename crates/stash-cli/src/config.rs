//! Per-user CLI settings.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use stash_core::Namespace;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Per-user CLI settings. Engine settings live in `CacheConfig`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CliConfig {
    /// Engine configuration file used when `--config` is not given.
    pub engine_config: Option<PathBuf>,
    /// Namespace used when `--namespace` is not given.
    pub namespace: Option<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl CliConfig {
    /// Settings from the per-user file, or defaults when there is none yet.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        match std::fs::read_to_string(path) {
            Ok(yaml) => Ok(serde_yaml::from_str(&yaml)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(format!("Could not read {}: {}", path.display(), e).into()),
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// `<config dir>/stash-cli/settings.yaml` on the current platform.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("dev", "stash", "stash-cli")
            .ok_or("No home directory to keep CLI settings in")?;
        Ok(dirs.config_dir().join("settings.yaml"))
    }

    /// Apply `stash config set <key> <value>`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "engine_config" => self.engine_config = Some(PathBuf::from(value)),
            "namespace" => {
                let namespace = Namespace::new(value).map_err(|e| e.to_string())?;
                self.namespace = Some(namespace.to_string());
            }
            "output_format" => {
                self.output_format = OutputFormat::from_str(value, true)
                    .map_err(|_| format!("output_format must be table, json or yaml, got {value:?}"))?;
            }
            other => return Err(format!("No CLI setting named {other:?}")),
        }
        Ok(())
    }
}
