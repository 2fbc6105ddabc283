//! Backend store configuration.

use serde::{Deserialize, Serialize};

/// Top-level storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store implementation: `"local"` or `"s3"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Local filesystem store configuration.
    #[serde(default)]
    pub local: LocalStoreConfig,
    /// S3-compatible store configuration.
    #[serde(default)]
    pub s3: S3StoreConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            local: LocalStoreConfig::default(),
            s3: S3StoreConfig::default(),
        }
    }
}

/// Local filesystem store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStoreConfig {
    /// Directory holding cached blobs and their metadata.
    #[serde(default = "default_local_root")]
    pub root_path: String,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
        }
    }
}

/// S3-compatible object storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3StoreConfig {
    /// Endpoint URL for non-AWS services like MinIO. Empty uses AWS.
    #[serde(default)]
    pub endpoint: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket holding the cached objects.
    #[serde(default)]
    pub bucket: String,
    /// Optional key namespace; keys are stored as `prefix!!key`.
    #[serde(default)]
    pub prefix: String,
    /// Access key ID. Empty falls back to the default credential chain.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
    /// Use path-style addressing (required by most MinIO deployments).
    #[serde(default = "default_true")]
    pub force_path_style: bool,
}

impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            bucket: String::new(),
            prefix: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            force_path_style: true,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_local_root() -> String {
    "./data/fcache".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}
