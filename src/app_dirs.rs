use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const APPLICATION: &str = "reflex";
const DB_FILE: &str = "results.db";
const CONFIG_FILE: &str = "config.json";

/// Platform locations for the results database and the config file.
pub struct AppDirs {
    project: ProjectDirs,
}

impl AppDirs {
    /// `None` when no home directory can be determined.
    pub fn discover() -> Option<Self> {
        ProjectDirs::from("", "", APPLICATION).map(|project| Self { project })
    }

    /// The XDG state directory on Linux, the local data directory elsewhere.
    pub fn data_dir(&self) -> &Path {
        self.project
            .state_dir()
            .unwrap_or_else(|| self.project.data_local_dir())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join(DB_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.project.config_dir().join(CONFIG_FILE)
    }
}
