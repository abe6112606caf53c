use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::round::TrialRules;
use crate::score::RadarConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Falls back to the platform state directory when unset.
    pub database_path: Option<PathBuf>,
    pub rounds_per_session: u32,
    pub rules: TrialRules,
    pub radar: RadarConfig,
    pub heatmap_rows: usize,
    pub heatmap_cols: usize,
    pub stimulus_tokens: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            rounds_per_session: 15,
            rules: TrialRules {
                response_window_ms: Some(2000),
            },
            radar: RadarConfig::default(),
            heatmap_rows: 3,
            heatmap_cols: 5,
            stimulus_tokens: ["red", "green", "blue", "yellow"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Config {
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .or_else(|| AppDirs::discover().map(|dirs| dirs.db_path()))
            .unwrap_or_else(|| PathBuf::from("reflex.db"))
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = AppDirs::discover()
            .map(|dirs| dirs.config_path())
            .unwrap_or_else(|| PathBuf::from("reflex_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Config::default(),
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!(
                    "ignoring unreadable config {}: {e}",
                    self.path.display()
                );
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}
