//! Client configuration.
//!
//! Values come from an optional TOML file, then environment overrides.
//! The core never reads the environment on its own after construction.

use crate::error::{LicenseError, LicenseResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default authority base URL.
pub const DEFAULT_AUTHORITY_URL: &str = "https://hearth.master-data.ro";

/// Configuration for the license client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseClientConfig {
    /// Authority base URL.
    pub authority_url: String,
    /// This application's own public URL. Its host is the license domain.
    pub app_url: String,
    /// Verify endpoint, relative to `authority_url`.
    pub verify_path: String,
    /// PEM public key endpoint, relative to `authority_url`.
    pub public_key_path: String,
    /// JWKS endpoint, relative to `authority_url`.
    pub jwks_path: String,
    /// Fraud alert endpoint, relative to `authority_url`.
    pub alert_endpoint: String,
    /// Timeout for verify, PEM and JWKS calls.
    pub remote_timeout_secs: u64,
    /// Timeout for fraud alerts.
    pub alert_timeout_secs: u64,
    /// Directory holding the license store, fingerprint file and keys.
    pub storage_dir: PathBuf,
    /// License store file name inside `storage_dir`.
    pub license_file: String,
    /// Fingerprint file name inside `storage_dir`.
    pub fingerprint_file: String,
    /// Authority private key; defaults to `<storage_dir>/keys/license_private.pem`.
    pub private_key_path: Option<PathBuf>,
    /// Bundled authority public key; defaults to `<storage_dir>/keys/license_public.pem`.
    pub bundled_public_key_path: Option<PathBuf>,
    /// Store passphrase. Falls back to the application secret.
    pub passphrase: Option<String>,
    /// Request path prefixes that bypass enforcement.
    pub whitelist: Vec<String>,
}

impl Default for LicenseClientConfig {
    fn default() -> Self {
        Self {
            authority_url: DEFAULT_AUTHORITY_URL.to_string(),
            app_url: String::new(),
            verify_path: "/api/verify".to_string(),
            public_key_path: "/keys/pem".to_string(),
            jwks_path: "/.well-known/jwks.json".to_string(),
            alert_endpoint: "/api/alert/fraud".to_string(),
            remote_timeout_secs: 5,
            alert_timeout_secs: 3,
            storage_dir: default_storage_dir(),
            license_file: "license.json".to_string(),
            fingerprint_file: "license-fingerprint.json".to_string(),
            private_key_path: None,
            bundled_public_key_path: None,
            passphrase: None,
            whitelist: [
                "/health",
                "/.well-known/push-license",
                "/.well-known/jwks.json",
                "/keys/pem",
                "/licente",
                "/licenta",
                "/setari",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl std::fmt::Debug for LicenseClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseClientConfig")
            .field("authority_url", &self.authority_url)
            .field("app_url", &self.app_url)
            .field("storage_dir", &self.storage_dir)
            .field("remote_timeout_secs", &self.remote_timeout_secs)
            .field("private_key_path", &self.private_key_path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// `<local data dir>/hearth`, or `./storage` when the platform has none.
fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("hearth"))
        .unwrap_or_else(|| PathBuf::from("storage"))
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl LicenseClientConfig {
    /// Loads a TOML file; missing keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> LicenseResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| LicenseError::Config(format!("{}: {e}", path.display())))
    }

    /// Applies the `LICENSE_*` / `APP_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_nonempty("LICENSE_AUTHORITY_URL") {
            self.authority_url = v;
        }
        if let Some(v) = env_nonempty("APP_URL") {
            self.app_url = v;
        }
        if let Some(v) = env_nonempty("LICENSE_VERIFY_PATH") {
            self.verify_path = v;
        }
        if let Some(v) = env_nonempty("LICENSE_PEM_PATH") {
            self.public_key_path = v;
        }
        if let Some(v) = env_nonempty("LICENSE_AUTHORITY_ALERT_ENDPOINT") {
            self.alert_endpoint = v;
        }
        if let Some(secs) = env_nonempty("LICENSE_REMOTE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.remote_timeout_secs = secs;
        }
        if let Some(v) = env_nonempty("LICENSE_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = env_nonempty("LICENSE_FINGERPRINT_FILE") {
            self.fingerprint_file = v;
        }
        if let Some(v) = env_nonempty("LICENSE_PRIVATE_KEY_PATH") {
            self.private_key_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_nonempty("LICENSE_PUBLIC_KEY_PATH") {
            self.bundled_public_key_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_nonempty("APP_LICENSE_PASSPHRASE").or_else(|| env_nonempty("APP_KEY")) {
            self.passphrase = Some(v);
        }
        self
    }

    /// Rejects values the client cannot run with.
    pub fn validate(&self) -> LicenseResult<()> {
        Url::parse(&self.authority_url)
            .map_err(|e| LicenseError::Config(format!("invalid authority_url: {e}")))?;
        if self.remote_timeout_secs == 0 || self.alert_timeout_secs == 0 {
            return Err(LicenseError::Config("timeouts must be non-zero".to_string()));
        }
        if self.license_file.is_empty() {
            return Err(LicenseError::Config("license_file must not be empty".to_string()));
        }
        Ok(())
    }

    /// Joins a relative endpoint onto the authority base URL.
    #[must_use]
    pub fn authority_endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.authority_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Path of the encrypted license store.
    #[must_use]
    pub fn license_path(&self) -> PathBuf {
        self.storage_dir.join(&self.license_file)
    }

    /// Path of the fingerprint file.
    #[must_use]
    pub fn fingerprint_path(&self) -> PathBuf {
        self.storage_dir.join(&self.fingerprint_file)
    }

    /// Where the authority private key is looked for.
    #[must_use]
    pub fn resolved_private_key_path(&self) -> PathBuf {
        self.private_key_path
            .clone()
            .unwrap_or_else(|| self.storage_dir.join("keys").join("license_private.pem"))
    }

    /// Where the bundled authority public key is looked for.
    #[must_use]
    pub fn resolved_public_key_path(&self) -> PathBuf {
        self.bundled_public_key_path
            .clone()
            .unwrap_or_else(|| self.storage_dir.join("keys").join("license_public.pem"))
    }

    /// Timeout for verify, PEM and JWKS calls.
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// Timeout for fraud alerts.
    #[must_use]
    pub fn alert_timeout(&self) -> Duration {
        Duration::from_secs(self.alert_timeout_secs)
    }

    /// The license domain: host of `app_url`, else the machine hostname.
    #[must_use]
    pub fn license_domain(&self) -> String {
        host_of(&self.app_url).unwrap_or_else(local_hostname)
    }
}

/// Lowercased host component of `url`, if it parses and has one.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .filter(|h| !h.is_empty())
}

/// Gets the machine hostname.
fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
