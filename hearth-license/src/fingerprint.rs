//! Signed key fingerprint issued by an authority installation.
//!
//! The fingerprint identifies the authority key this installation holds.
//! It is the SHA-256 of the bundled public PEM when that file exists,
//! otherwise the compact `base64url(n).base64url(e)` form.

use crate::error::LicenseResult;
use crate::keys::{KeyIdentity, PrivateKeyHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Contents of the fingerprint file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFingerprint {
    /// Hex SHA-256 of the public PEM, or `n.e`.
    pub fingerprint: String,
    /// Base64 RSA-SHA256 signature of `fingerprint`; null if signing failed.
    pub signature: Option<String>,
    /// When the fingerprint was issued.
    pub created_at: DateTime<Utc>,
}

impl KeyFingerprint {
    /// Computes the fingerprint string.
    #[must_use]
    pub fn compute(bundled_public_pem: Option<&str>, identity: &KeyIdentity) -> String {
        match bundled_public_pem {
            Some(pem) => hex::encode(Sha256::digest(pem.as_bytes())),
            None => identity.compact(),
        }
    }

    /// Computes and signs a fingerprint with the authority private key.
    #[must_use]
    pub fn issue(private_key: &PrivateKeyHandle, bundled_public_pem: Option<&str>) -> Self {
        let fingerprint = Self::compute(bundled_public_pem, &private_key.identity());
        let signature = match private_key.sign_base64(fingerprint.as_bytes()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(error = %e, "Could not sign key fingerprint");
                None
            }
        };
        Self {
            fingerprint,
            signature,
            created_at: Utc::now(),
        }
    }

    /// Writes the fingerprint as pretty JSON.
    pub fn write_to(&self, path: &Path) -> LicenseResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        info!(path = %path.display(), "Key fingerprint written");
        Ok(())
    }

    /// Reads a previously written fingerprint file.
    pub fn read_from(path: &Path) -> LicenseResult<Self> {
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
