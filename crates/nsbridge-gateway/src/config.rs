//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GatewayError, Result};
use crate::mount::HostAllowList;

/// Longest entry name the daemon's READDIR slots hold, terminator included.
pub const DEFAULT_MAX_NAME_LEN: usize = 256;

/// Settings for one gateway process, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host directory backing the export
    pub export_root: String,
    /// Clients allowed to mount, by dotted-quad address or `*`
    pub allowed_hosts: Vec<String>,
    /// Widest READDIR name slot accepted from the daemon
    pub max_name_len: usize,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl BridgeConfig {
    /// Defaults with the given export root.
    pub fn default_with_root(root: &str) -> Self {
        Self {
            export_root: root.to_string(),
            allowed_hosts: vec!["127.0.0.1".to_string()],
            max_name_len: DEFAULT_MAX_NAME_LEN,
            log_level: "info".to_string(),
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s).map_err(|e| GatewayError::ConfigError {
            reason: format!("invalid config JSON: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Allow list built from `allowed_hosts`.
    pub fn mount_policy(&self) -> HostAllowList {
        HostAllowList::new(self.allowed_hosts.clone())
    }

    /// Rejects settings the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.export_root.is_empty() {
            return Err(GatewayError::ConfigError {
                reason: "export root cannot be empty".to_string(),
            });
        }

        if self.allowed_hosts.is_empty() {
            return Err(GatewayError::ConfigError {
                reason: "at least one allowed host must be configured (use \"*\" for any)"
                    .to_string(),
            });
        }

        for host in &self.allowed_hosts {
            if host != "*" && host.parse::<std::net::Ipv4Addr>().is_err() {
                return Err(GatewayError::ConfigError {
                    reason: format!("allowed host is not an IPv4 address: {}", host),
                });
            }
        }

        if self.max_name_len < 2 {
            return Err(GatewayError::ConfigError {
                reason: "max_name_len must leave room for a name and its terminator"
                    .to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::default_with_root("/export")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::MountPolicy;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.export_root, "/export");
        assert_eq!(config.allowed_hosts, vec!["127.0.0.1"]);
        assert_eq!(config.max_name_len, DEFAULT_MAX_NAME_LEN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial_uses_defaults() {
        let config = BridgeConfig::from_json_str(r#"{"export_root": "/srv/data"}"#).unwrap();
        assert_eq!(config.export_root, "/srv/data");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_from_json_full() {
        let json = r#"{
            "export_root": "/srv",
            "allowed_hosts": ["10.0.0.1", "*"],
            "max_name_len": 128,
            "log_level": "debug"
        }"#;
        let config = BridgeConfig::from_json_str(json).unwrap();
        assert_eq!(config.max_name_len, 128);
        assert_eq!(config.allowed_hosts.len(), 2);
    }

    #[test]
    fn test_from_json_malformed() {
        let err = BridgeConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, GatewayError::ConfigError { .. }));
    }

    #[test]
    fn test_validate_empty_root() {
        let mut config = BridgeConfig::default();
        config.export_root = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_hosts() {
        let mut config = BridgeConfig::default();
        config.allowed_hosts.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_host() {
        let mut config = BridgeConfig::default();
        config.allowed_hosts = vec!["client.example".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_name_len() {
        let mut config = BridgeConfig::default();
        config.max_name_len = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{"export_root": "/tmp/x", "allowed_hosts": ["*"]}"#).unwrap();
        let config = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(config.export_root, "/tmp/x");
    }

    #[test]
    fn test_mount_policy_from_config() {
        let config = BridgeConfig::default();
        let policy = config.mount_policy();
        assert!(policy.is_allowed(std::net::Ipv4Addr::LOCALHOST, "/"));
        assert!(!policy.is_allowed(std::net::Ipv4Addr::new(1, 2, 3, 4), "/"));
    }
}
