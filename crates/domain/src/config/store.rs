use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Persistence + working-directory configuration (spec §4.D, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: d_data_dir(),
        }
    }
}

impl StoreConfig {
    /// Path to the SQLite database file (spec §6: `<data-dir>/rooms.db`).
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("rooms.db")
    }
}

fn d_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
