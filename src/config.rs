use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::LineError;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub chip: String,
    pub debounce_window_ms: u64,
    pub broadcast_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chip: "/dev/gpiochip0".to_string(),
            debounce_window_ms: 200,
            broadcast_capacity: 64,
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, LineError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| LineError::Config(format!("Failed to read config: {e}")))?;
        serde_json::from_str(&contents)
            .map_err(|e| LineError::Config(format!("Invalid config json: {e}")))
    }
}
