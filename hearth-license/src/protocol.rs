//! The remote verification protocol.
//!
//! 1. POST `{license_key, domain}` to the verify endpoint
//! 2. require `data` and `signature` in the response
//! 3. GET the authority PEM
//! 4. parse it
//! 5. verify RSA-SHA256 over the canonical JSON of `data`
//! 6. persist the record with the authority's `data`
//!
//! Nothing is written unless step 5 succeeds.

use crate::authority::AuthorityClient;
use crate::config::LicenseClientConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::keys::parse_public_key;
use crate::record::{LicenseData, LicenseRecord, LicenseStatus};
use crate::signature::SignedPayload;
use crate::store::LicenseStore;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

/// Markers the authority uses when it only registered a key for approval.
const REGISTRATION_MARKERS: [&str; 3] = ["nu există", "înregistrat", "înregistrată"];

/// The protocol step a verification failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStep {
    /// Input validation before any network call.
    Input,
    /// The verify call itself.
    Request,
    /// Shape of the verify response.
    Response,
    /// Fetching the authority PEM.
    KeyFetch,
    /// Parsing the authority PEM.
    KeyParse,
    /// Signature check.
    Signature,
    /// Writing the verified record.
    Persist,
}

impl VerificationStep {
    /// Attributes a protocol error to the step that produced it.
    #[must_use]
    pub fn of(error: &LicenseError) -> Self {
        match error {
            LicenseError::MissingLicenseKey => Self::Input,
            LicenseError::Network(_) | LicenseError::AuthorityRejected { .. } => Self::Request,
            LicenseError::MalformedResponse(_) => Self::Response,
            LicenseError::KeyFetchFailed(_) => Self::KeyFetch,
            LicenseError::InvalidAuthorityKey(_) => Self::KeyParse,
            LicenseError::SignatureInvalid => Self::Signature,
            _ => Self::Persist,
        }
    }
}

/// A record that passed verification and was stored.
#[derive(Debug, Clone)]
pub struct LicenseVerification {
    /// The record as written.
    pub record: LicenseRecord,
}

impl LicenseVerification {
    /// The authority's message, empty when it sent none.
    #[must_use]
    pub fn message(&self) -> &str {
        self.record.data.message().unwrap_or_default()
    }

    /// Validity as of now.
    #[must_use]
    pub fn status(&self) -> LicenseStatus {
        self.record.status()
    }

    /// True when the authority registered the key for approval rather than
    /// issuing it.
    #[must_use]
    pub fn awaiting_approval(&self) -> bool {
        let message = self.message().to_lowercase();
        REGISTRATION_MARKERS.iter().any(|m| message.contains(m))
    }
}

/// Runs the protocol against one authority and one store.
#[derive(Debug, Clone)]
pub struct LicenseVerifier {
    authority: AuthorityClient,
    store: LicenseStore,
}

impl LicenseVerifier {
    /// Creates a verifier.
    pub fn new(authority: AuthorityClient, store: LicenseStore) -> Self {
        Self { authority, store }
    }

    /// Creates a verifier for `config`.
    pub fn from_config(config: &LicenseClientConfig) -> LicenseResult<Self> {
        Ok(Self::new(
            AuthorityClient::new(config)?,
            LicenseStore::from_config(config),
        ))
    }

    /// The store this verifier writes to.
    pub fn store(&self) -> &LicenseStore {
        &self.store
    }

    /// The authority this verifier talks to.
    pub fn authority(&self) -> &AuthorityClient {
        &self.authority
    }

    /// Steps 1–5: fetch and prove the authority's payload without storing it.
    pub async fn fetch_verified(&self, license_key: &str, domain: &str) -> LicenseResult<SignedPayload> {
        let license_key = license_key.trim();
        if license_key.is_empty() {
            return Err(LicenseError::MissingLicenseKey);
        }

        let signed = self.authority.verify(license_key, domain).await?;
        let pem = self.authority.fetch_public_key_pem().await?;
        let key = parse_public_key(&pem)
            .map_err(|e| LicenseError::InvalidAuthorityKey(e.to_string()))?;

        if let Err(e) = signed.verify(&key) {
            warn!(domain, "Authority signature did not verify");
            return Err(e);
        }
        Ok(signed)
    }

    /// The full protocol: verify, then persist with a refreshed `fetched_at`.
    pub async fn verify_and_store(
        &self,
        license_key: &str,
        domain: &str,
        passphrase: Option<&str>,
    ) -> LicenseResult<LicenseVerification> {
        let signed = self.fetch_verified(license_key, domain).await?;

        let record = LicenseRecord {
            license_key: license_key.trim().to_string(),
            domain: domain.to_string(),
            data: LicenseData::from(signed.data),
            fetched_at: Some(Utc::now()),
            authority: Some(self.authority.base_url().to_string()),
        };
        let passphrase = passphrase.map(str::to_owned);
        let stored = record.clone();
        self.store
            .blocking(move |store| store.write(&stored, passphrase.as_deref()))
            .await?;

        info!(domain, valid = record.status().is_valid, "License verified and stored");
        Ok(LicenseVerification { record })
    }

    /// Re-runs the protocol for the record currently installed.
    pub async fn reverify(&self) -> LicenseResult<LicenseVerification> {
        let current = self
            .store
            .blocking(LicenseStore::read)
            .await?
            .ok_or(LicenseError::NotInstalled)?;
        self.verify_and_store(&current.license_key, &current.domain, None)
            .await
    }

    /// Decrypts and returns the stored record as last proven. No network,
    /// no signature check.
    pub fn show(&self, passphrase: Option<&str>) -> LicenseResult<String> {
        self.store.read_plaintext(passphrase)
    }
}
