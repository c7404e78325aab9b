use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_DEFLATE_LEVEL, DEFAULT_PORT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: io::Error,
    },
    #[error("no configuration path to save to")]
    NoPath,
}

/// Handle shared by every session. Locked on each access so the core stays
/// correct in a multi-threaded embedding even though the default server is
/// single-threaded.
pub type SharedConfig = Arc<Mutex<FtpConfig>>;

/// Lock the shared configuration, recovering from a poisoned mutex.
pub fn lock(config: &SharedConfig) -> MutexGuard<'_, FtpConfig> {
    config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Server configuration, persisted as TOML.
///
/// An empty `user` or `pass` auto-authorizes the corresponding login phase.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    user: String,
    pass: String,
    port: u16,
    deflate_level: u32,
    hostname: String,
    get_mtime: bool,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            pass: String::new(),
            port: DEFAULT_PORT,
            deflate_level: DEFAULT_DEFLATE_LEVEL,
            hostname: String::new(),
            get_mtime: true,
            path: None,
        }
    }
}

impl FtpConfig {
    /// Load from a TOML file. A missing file yields the defaults, which
    /// `SITE SAVE` will later persist to the same path.
    pub fn load(path: &Path) -> Result<FtpConfig, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("No configuration at {}, using defaults", path.display());
                let mut config = FtpConfig::default();
                config.path = Some(path.to_path_buf());
                return Ok(config);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut config: FtpConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Persist to the path the configuration was loaded from.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self.path.as_ref().ok_or(ConfigError::NoPath)?;
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn into_shared(self) -> SharedConfig {
        Arc::new(Mutex::new(self))
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn pass(&self) -> &str {
        &self.pass
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn deflate_level(&self) -> u32 {
        self.deflate_level
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn get_mtime(&self) -> bool {
        self.get_mtime
    }

    pub fn set_user(&mut self, user: &str) {
        self.user = user.to_string();
    }

    pub fn set_pass(&mut self, pass: &str) {
        self.pass = pass.to_string();
    }

    pub fn set_hostname(&mut self, hostname: &str) {
        self.hostname = hostname.to_string();
    }

    pub fn set_get_mtime(&mut self, get_mtime: bool) {
        self.get_mtime = get_mtime;
    }

    pub fn set_listen_port(&mut self, port: u16) {
        self.port = port;
    }

    /// Set the listen port from a SITE PORT argument.
    pub fn set_port(&mut self, arg: &str) -> bool {
        match arg.trim().parse::<u16>() {
            Ok(port) if port != 0 => {
                self.port = port;
                true
            }
            _ => false,
        }
    }

    /// Set the MODE Z compression level (0-9).
    pub fn set_deflate_level(&mut self, level: u32) -> bool {
        if level > 9 {
            return false;
        }
        self.deflate_level = level;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferroftpd.toml");

        let config = FtpConfig::load(&path).unwrap();
        assert_eq!(config.user(), "");
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.deflate_level(), DEFAULT_DEFLATE_LEVEL);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferroftpd.toml");

        let mut config = FtpConfig::load(&path).unwrap();
        config.set_user("admin");
        config.set_pass("secret");
        assert!(config.set_port("2121"));
        assert!(config.set_deflate_level(9));
        config.set_hostname("ferro");
        config.save().unwrap();

        let reloaded = FtpConfig::load(&path).unwrap();
        assert_eq!(reloaded.user(), "admin");
        assert_eq!(reloaded.pass(), "secret");
        assert_eq!(reloaded.port(), 2121);
        assert_eq!(reloaded.deflate_level(), 9);
        assert_eq!(reloaded.hostname(), "ferro");
    }

    #[test]
    fn rejects_bad_port_and_level() {
        let mut config = FtpConfig::default();
        assert!(!config.set_port("0"));
        assert!(!config.set_port("banana"));
        assert!(!config.set_deflate_level(10));
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.deflate_level(), DEFAULT_DEFLATE_LEVEL);
    }

    #[test]
    fn save_without_path_fails() {
        let config = FtpConfig::default();
        assert!(matches!(config.save(), Err(ConfigError::NoPath)));
    }
}
