// discedit/src/config.rs
//! Editor configuration loaded from `config.toml`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR_NAME: &str = "disc-edit";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Upper bound for the mastering tool's wait, whatever the file says.
pub const MAX_TIMEOUT_SECS: u64 = 600;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    pub mastering: MasteringConfig,
    pub defaults: DefaultsConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MasteringConfig {
    /// Program name (looked up on `PATH`) or path to the mastering tool.
    pub program: String,
    /// Arguments placed before the generated ones, e.g. `-as mkisofs` for xorriso.
    pub prefix_args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for MasteringConfig {
    fn default() -> Self {
        Self {
            program: "xorriso".to_string(),
            prefix_args: vec!["-as".to_string(), "mkisofs".to_string()],
            timeout_secs: 120,
        }
    }
}

impl MasteringConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(1, MAX_TIMEOUT_SECS))
    }
}

/// Values a new session starts with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    pub volume_id: String,
    pub system_id: String,
    pub use_udf: bool,
    pub make_hybrid: bool,
    pub checksum: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            volume_id: "NEW_ISO".to_string(),
            system_id: "DISC_EDIT".to_string(),
            use_udf: false,
            make_hybrid: false,
            checksum: true,
        }
    }
}

impl EditorConfig {
    /// `$XDG_CONFIG_HOME/disc-edit/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads `explicit` if given, else the per-user file, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> io::Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) => Self::from_file(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Reads a TOML file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };
        let config = Self::from_toml(&text).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid config {}: {}", path.display(), e),
            )
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> io::Result<Self> {
        toml::from_str(text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }

    pub fn to_toml(&self) -> io::Result<String> {
        toml::to_string_pretty(self).map_err(|e| io::Error::other(e.to_string()))
    }
}
