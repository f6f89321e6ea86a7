use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{LockboxError, LockboxResult};

/// Top-level configuration (loaded from lockbox.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockboxConfig {
    pub storage: StorageConfig,
    pub layout: LayoutConfig,
    pub crypto: CryptoConfig,
    pub log: LogConfig,
}

impl LockboxConfig {
    /// Check the parts of the config that are cheap to validate up front.
    pub fn validate(&self) -> LockboxResult<()> {
        let root = &self.layout.system_root;
        if root.starts_with('/') {
            return Err(LockboxError::Config(format!(
                "layout.system_root must be relative to the backend root, got '{root}'"
            )));
        }
        if root.split('/').any(|s| s == "." || s == "..") {
            return Err(LockboxError::Config(format!(
                "layout.system_root must not contain '.' or '..' segments, got '{root}'"
            )));
        }
        if self.crypto.argon2_time_cost == 0 || self.crypto.argon2_parallelism == 0 {
            return Err(LockboxError::Config(
                "crypto.argon2_time_cost and crypto.argon2_parallelism must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Which OpenDAL service backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local filesystem under `storage.root`
    Fs,
    /// Process-local memory (tests, dry runs)
    Memory,
    /// S3-compatible object store
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend service (default: fs)
    pub backend: BackendKind,
    /// Filesystem root for the fs backend (default: /tmp/lockbox-bucket)
    pub root: PathBuf,
    /// Staging directory for atomic fs writes (default: <root>/.lockbox-staging)
    pub atomic_write_dir: Option<PathBuf>,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket name
    pub bucket: String,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
}

/// Placement of lockbox state inside the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Prefix under which profiles and user trees live (default: lockbox)
    pub system_root: String,
}

/// Key derivation and envelope parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// Plaintext bytes per envelope segment (default: 65536)
    pub segment_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Fs,
            root: PathBuf::from("/tmp/lockbox-bucket"),
            atomic_write_dir: None,
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "lockbox".into(),
            enforce_tls: false,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            system_root: "lockbox".into(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            segment_size: 64 * 1024,
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
