use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{VeilError, VeilResult};
use crate::types::{CipherAlgorithm, TransferMode};

/// Top-level configuration (loaded from veil.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VeilConfig {
    pub transfer: TransferConfig,
    pub link: LinkConfig,
    pub store: StoreConfig,
    pub transport: TransportConfig,
    pub log: LogConfig,
}

impl VeilConfig {
    /// Parse a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> VeilResult<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found (using defaults)");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: VeilConfig = toml::from_str(&content)
            .map_err(|e| VeilError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VeilResult<()> {
        if self.transfer.chunk_size == 0 {
            return Err(VeilError::Config("transfer.chunk_size must be non-zero".into()));
        }
        if self.transfer.chunk_size > self.transport.max_frame_bytes / 2 {
            // base64 plus JSON envelope must still fit in one transport message
            return Err(VeilError::Config(format!(
                "transfer.chunk_size ({}) too large for transport.max_frame_bytes ({})",
                self.transfer.chunk_size, self.transport.max_frame_bytes
            )));
        }
        if self.store.ttl_secs == 0 {
            return Err(VeilError::Config("store.ttl_secs must be non-zero".into()));
        }
        if self.transport.channel_capacity == 0 {
            return Err(VeilError::Config("transport.channel_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// "staged" or "direct" (default: staged)
    pub mode: TransferMode,
    /// Ciphertext bytes per chunk frame (default: 16 KiB)
    pub chunk_size: usize,
    /// "A256GCM" or "C20P" (default: A256GCM)
    pub algorithm: CipherAlgorithm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Scheme and host the link is rooted at
    pub origin: String,
    /// Fixed path segment between origin and token
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a staged transfer stays redeemable (default: 24h)
    pub ttl_secs: u64,
    /// How long tombstones outlive the TTL so late redemptions still
    /// report "consumed"/"expired" instead of "not found" (default: 1h)
    pub tombstone_grace_secs: u64,
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn tombstone_grace(&self) -> Duration {
        Duration::from_secs(self.tombstone_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// TCP listen address for direct mode
    pub listen: String,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Frames buffered in flight before the sender waits
    pub channel_capacity: usize,
    /// Largest single transport message accepted
    pub max_frame_bytes: usize,
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            mode: TransferMode::Staged,
            chunk_size: 16 * 1024,
            algorithm: CipherAlgorithm::Aes256Gcm,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            origin: "https://veil.local".into(),
            path: "download".into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            tombstone_grace_secs: 60 * 60,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:0".into(),
            connect_timeout_secs: 10,
            channel_capacity: 64,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[transfer]
mode = "direct"
chunk_size = 8192
algorithm = "C20P"

[link]
origin = "https://share.example.com"
path = "d"

[store]
ttl_secs = 600
tombstone_grace_secs = 30

[transport]
listen = "0.0.0.0:7070"
connect_timeout_secs = 3
channel_capacity = 8

[log]
level = "debug"
format = "json"
"#;
        let config: VeilConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.transfer.mode, TransferMode::Direct);
        assert_eq!(config.transfer.chunk_size, 8192);
        assert_eq!(config.transfer.algorithm, CipherAlgorithm::ChaCha20Poly1305);
        assert_eq!(config.link.origin, "https://share.example.com");
        assert_eq!(config.store.ttl(), Duration::from_secs(600));
        assert_eq!(config.transport.listen, "0.0.0.0:7070");
        assert_eq!(config.transport.channel_capacity, 8);
        assert_eq!(config.log.format, "json");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_defaults() {
        let config: VeilConfig = toml::from_str("").unwrap();

        assert_eq!(config.transfer.mode, TransferMode::Staged);
        assert_eq!(config.transfer.chunk_size, 16384);
        assert_eq!(config.transfer.algorithm, CipherAlgorithm::Aes256Gcm);
        assert_eq!(config.link.path, "download");
        assert_eq!(config.store.ttl_secs, 86400);
        assert_eq!(config.log.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[store]
ttl_secs = 60
"#;
        let config: VeilConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.store.ttl_secs, 60);
        assert_eq!(config.store.tombstone_grace_secs, 3600);
        assert_eq!(config.transfer.chunk_size, 16384);
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = VeilConfig::default();
        config.transfer.chunk_size = 0;
        assert!(matches!(config.validate(), Err(VeilError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_chunk_larger_than_frame() {
        let mut config = VeilConfig::default();
        config.transfer.chunk_size = config.transport.max_frame_bytes;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = VeilConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.store.ttl_secs, 86400);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("veil.toml");
        std::fs::write(&path, "[transfer]\nchunk_size = \"big\"\n").unwrap();
        let err = VeilConfig::load(&path).unwrap_err();
        assert!(matches!(err, VeilError::Config(_)));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = VeilConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: VeilConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.link.origin, parsed.link.origin);
        assert_eq!(config.transfer.mode, parsed.transfer.mode);
        assert_eq!(config.store.ttl_secs, parsed.store.ttl_secs);
    }
}
