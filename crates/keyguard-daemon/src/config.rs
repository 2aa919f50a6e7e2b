//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keyguard_core::policy::apps;
use keyguard_core::MAX_ATTEMPTS;

use crate::orchestrator::OrchestratorConfig;

/// Command line used to start a lock screen app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCommand {
    /// Executable path
    pub program: PathBuf,

    /// Extra arguments passed before the launch parameters
    #[serde(default)]
    pub args: Vec<String>,
}

impl AppCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path of the settings store file
    pub settings_path: PathBuf,

    /// Unix socket path for IPC
    pub ipc_socket_path: PathBuf,

    /// Argon2 hash of the lock password
    pub password_hash_path: PathBuf,

    /// Lock screen apps by app id
    pub lock_apps: BTreeMap<String, AppCommand>,

    /// App tried once when the primary lock app cannot start
    pub fallback_app_id: String,

    /// Launch attempts of the primary lock app before falling back
    pub launch_retry_count: u32,

    /// Pause between launch attempts (milliseconds)
    pub launch_retry_interval_ms: u64,

    /// Input block window after exhausting password attempts (seconds)
    pub block_window_secs: u32,

    /// Wrong passwords allowed before an input block
    pub max_attempts: u32,

    /// Upper bound of the settings write retry backoff (seconds)
    pub settings_retry_max_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            settings_path: Self::default_data_dir().join("settings.json"),
            ipc_socket_path: Self::default_ipc_path(),
            password_hash_path: Self::default_data_dir().join("password.hash"),
            lock_apps: Self::default_lock_apps(),
            fallback_app_id: apps::DEFAULT.to_string(),
            launch_retry_count: 3,
            launch_retry_interval_ms: 200,
            block_window_secs: keyguard_core::BLOCK_WINDOW_SECS,
            max_attempts: MAX_ATTEMPTS,
            settings_retry_max_secs: 60,
        }
    }
}

impl DaemonConfig {
    /// Default IPC socket path
    pub fn default_ipc_path() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, fallback to /tmp
        std::env::var_os("XDG_RUNTIME_DIR")
            .map(|dir| PathBuf::from(dir).join("keyguard.sock"))
            .unwrap_or_else(|| PathBuf::from("/tmp/keyguard.sock"))
    }

    /// Default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("keyguard")
            .join("daemon.json")
    }

    fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/var/lib"))
            .join("keyguard")
    }

    fn default_lock_apps() -> BTreeMap<String, AppCommand> {
        [
            (apps::SWIPE, "keyguard-swipe"),
            (apps::SIMPLE_PASSWORD, "keyguard-pin"),
            (apps::PASSWORD, "keyguard-password"),
            (apps::AUTO_LOCK, "keyguard-autolock"),
            (apps::DEFAULT, "keyguard-default"),
        ]
        .into_iter()
        .map(|(id, binary)| {
            (
                id.to_string(),
                AppCommand::new(PathBuf::from("/usr/libexec/keyguard").join(binary)),
            )
        })
        .collect()
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.launch_retry_count == 0 {
            return Err(crate::DaemonError::Config(
                "launch_retry_count must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(crate::DaemonError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.block_window_secs == 0 {
            return Err(crate::DaemonError::Config(
                "block_window_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Create directories if they don't exist
    pub fn ensure_directories(&self) -> crate::Result<()> {
        for path in [
            &self.settings_path,
            &self.ipc_socket_path,
            &self.password_hash_path,
        ] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Orchestrator tunables derived from this config
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            launch_retry_count: self.launch_retry_count,
            launch_retry_interval: Duration::from_millis(self.launch_retry_interval_ms),
            fallback_app_id: self.fallback_app_id.clone(),
            block_window_secs: self.block_window_secs,
            max_attempts: self.max_attempts,
            settings_retry_max: Duration::from_secs(self.settings_retry_max_secs.max(1)),
            ..OrchestratorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_covers_builtin_apps() {
        let config = DaemonConfig::default();
        for id in [
            apps::SWIPE,
            apps::SIMPLE_PASSWORD,
            apps::PASSWORD,
            apps::AUTO_LOCK,
            apps::DEFAULT,
        ] {
            assert!(config.lock_apps.contains_key(id), "missing {}", id);
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");

        let mut config = DaemonConfig::default();
        config.launch_retry_count = 5;
        config.save(&path).unwrap();

        let loaded = DaemonConfig::load(&path).unwrap();
        assert_eq!(loaded.launch_retry_count, 5);
        assert_eq!(loaded.lock_apps, config.lock_apps);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        std::fs::write(&path, r#"{ "block_window_secs": 10 }"#).unwrap();

        let loaded = DaemonConfig::load(&path).unwrap();
        assert_eq!(loaded.block_window_secs, 10);
        assert_eq!(loaded.max_attempts, MAX_ATTEMPTS);
    }

    #[test]
    fn test_zero_retry_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        std::fs::write(&path, r#"{ "launch_retry_count": 0 }"#).unwrap();

        assert!(matches!(
            DaemonConfig::load(&path),
            Err(crate::DaemonError::Config(_))
        ));
    }
}
