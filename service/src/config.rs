//! Service configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use idv_crypto::{Fingerprinter, ServerKey};
use idv_proofing::ExecutionMode;
use idv_types::{CheckKind, IdvParams, Vendor};
use idv_utils::LogFormat;
use idv_vendors::OutageFlags;

use crate::ServiceError;

/// Configuration for one service deployment.
///
/// Loaded from a TOML file via [`ServiceConfig::from_toml_file`] or built
/// programmatically (e.g. for tests). Every field has a default, so an empty
/// file is valid apart from the two secrets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Run proofing inline or on a background task.
    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// LMDB environment directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter, e.g. "info" or "info,idv_proofing=debug".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Include the device-fraud check in verify_info.
    #[serde(default = "default_true")]
    pub device_fraud_enabled: bool,

    /// Vendor reported for each check kind.
    #[serde(default)]
    pub vendors: VendorSelection,

    /// Outage flags in effect at startup.
    #[serde(default)]
    pub outages: OutageFlags,

    /// Hex key for one-time code fingerprints.
    #[serde(default)]
    pub fingerprint_secret: String,

    /// Hex key (32 bytes) sealing in-progress PII.
    #[serde(default)]
    pub server_key: String,

    #[serde(default)]
    pub params: IdvParams,
}

/// Which vendor answers each kind of check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorSelection {
    pub document_auth: Vendor,
    pub resolution: Vendor,
    pub source_check: Vendor,
    pub device_fraud: Vendor,
    pub address_check: Vendor,
}

impl Default for VendorSelection {
    fn default() -> Self {
        Self {
            document_auth: Vendor::Mock,
            resolution: Vendor::Mock,
            source_check: Vendor::Mock,
            device_fraud: Vendor::Mock,
            address_check: Vendor::Mock,
        }
    }
}

impl VendorSelection {
    pub fn vendor(&self, kind: CheckKind) -> Vendor {
        match kind {
            CheckKind::DocumentAuth => self.document_auth,
            CheckKind::Resolution => self.resolution,
            CheckKind::SourceCheck => self.source_check,
            CheckKind::DeviceFraud => self.device_fraud,
            CheckKind::AddressCheck => self.address_check,
        }
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./idv_data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

// ── Impl ───────────────────────────────────────────────────────────────

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::default(),
            data_dir: default_data_dir(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            device_fraud_enabled: true,
            vendors: VendorSelection::default(),
            outages: OutageFlags::default(),
            fingerprint_secret: String::new(),
            server_key: String::new(),
            params: IdvParams::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ServiceError> {
        toml::from_str(s).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ServiceError> {
        toml::to_string_pretty(self).map_err(|e| ServiceError::Config(e.to_string()))
    }

    pub fn fingerprinter(&self) -> Result<Fingerprinter, ServiceError> {
        if self.fingerprint_secret.is_empty() {
            return Err(ServiceError::Config("fingerprint_secret is not set".into()));
        }
        let secret = hex::decode(&self.fingerprint_secret)
            .map_err(|e| ServiceError::Config(format!("fingerprint_secret: {e}")))?;
        Ok(Fingerprinter::new(&secret)?)
    }

    pub fn server_key(&self) -> Result<ServerKey, ServiceError> {
        if self.server_key.is_empty() {
            return Err(ServiceError::Config("server_key is not set".into()));
        }
        Ok(ServerKey::from_hex(&self.server_key)?)
    }
}
