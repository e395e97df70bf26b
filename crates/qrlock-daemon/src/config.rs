//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket path for IPC
    pub ipc_socket_path: PathBuf,

    /// Directory under which QR artifacts are briefly written
    pub scratch_dir: PathBuf,

    /// How often the reclaimer sweeps (seconds)
    pub sweep_interval_secs: u64,

    /// Lifetime of a stored cipher bundle (minutes)
    pub encryption_ttl_minutes: i64,

    /// Lifetime of a stored plaintext (minutes)
    pub decryption_ttl_minutes: i64,

    /// Deadline for deleting on-disk QR artifacts (minutes)
    pub artifact_ttl_minutes: i64,

    /// Largest accepted image upload (bytes)
    pub max_upload_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ipc_socket_path: Self::default_ipc_path(),
            scratch_dir: std::env::temp_dir(),
            sweep_interval_secs: 60,
            encryption_ttl_minutes: 30,
            decryption_ttl_minutes: 5,
            artifact_ttl_minutes: 5,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl DaemonConfig {
    /// Default IPC path
    pub fn default_ipc_path() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, fallback to /tmp
        std::env::var_os("XDG_RUNTIME_DIR")
            .map(|dir| PathBuf::from(dir).join("qrlock.sock"))
            .unwrap_or_else(|| PathBuf::from("/tmp/qrlock.sock"))
    }

    /// Default config file location: `$QRLOCK_CONFIG`, else
    /// `$XDG_CONFIG_HOME/qrlock/daemon.json`
    pub fn default_path() -> PathBuf {
        std::env::var("QRLOCK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("/etc"))
                    .join("qrlock")
                    .join("daemon.json")
            })
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, writing the defaults there first if it does not exist
    pub fn load_or_create(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save(path)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values that would make records immortal or the reclaimer spin
    pub fn validate(&self) -> crate::Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(crate::DaemonError::Config(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        for (name, minutes) in [
            ("encryption_ttl_minutes", self.encryption_ttl_minutes),
            ("decryption_ttl_minutes", self.decryption_ttl_minutes),
            ("artifact_ttl_minutes", self.artifact_ttl_minutes),
        ] {
            if minutes <= 0 {
                return Err(crate::DaemonError::Config(format!(
                    "{} must be positive",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Create directories if they don't exist
    pub fn ensure_directories(&self) -> crate::Result<()> {
        std::fs::create_dir_all(&self.scratch_dir)?;
        if let Some(parent) = self.ipc_socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn encryption_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.encryption_ttl_minutes)
    }

    pub fn decryption_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.decryption_ttl_minutes)
    }

    pub fn artifact_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.artifact_ttl_minutes)
    }
}

/// Helper module for dirs crate functionality
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.encryption_ttl(), chrono::Duration::minutes(30));
        assert_eq!(config.decryption_ttl(), chrono::Duration::minutes(5));
        assert_eq!(config.artifact_ttl(), chrono::Duration::minutes(5));
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
        assert!(config.ipc_socket_path.ends_with("qrlock.sock"));
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("daemon.json");

        let created = DaemonConfig::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = DaemonConfig::load(&path).unwrap();
        assert_eq!(created, loaded);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        std::fs::write(&path, r#"{"sweep_interval_secs": 5}"#).unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.sweep_interval_secs, 5);
        assert_eq!(config.encryption_ttl_minutes, 30);
    }

    #[test]
    fn test_rejects_zero_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");

        std::fs::write(&path, r#"{"sweep_interval_secs": 0}"#).unwrap();
        assert!(DaemonConfig::load(&path).is_err());

        std::fs::write(&path, r#"{"decryption_ttl_minutes": -1}"#).unwrap();
        assert!(DaemonConfig::load(&path).is_err());
    }
}
