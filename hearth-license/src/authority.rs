//! HTTP client for the license authority.
//!
//! Every call carries an explicit timeout; a timeout is reported like any
//! other failure of that step.

use crate::config::LicenseClientConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::keys::KeyIdentity;
use crate::signature::SignedPayload;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Body of the verify call.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyRequest<'a> {
    /// Key being verified.
    pub license_key: &'a str,
    /// Host the key is used on.
    pub domain: &'a str,
}

/// Body of a fraud alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertEnvelope {
    /// Canonical JSON of the alert.
    pub payload: String,
    /// Base64 RSA-SHA256 signature of `payload`, when a key was available.
    pub signature: Option<String>,
}

/// A single JWKS entry. Only RSA members are read.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type, normally `RSA`.
    #[serde(default)]
    pub kty: Option<String>,
    /// Key id.
    #[serde(default)]
    pub kid: Option<String>,
    /// base64url modulus.
    #[serde(default)]
    pub n: Option<String>,
    /// base64url exponent.
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

/// Outcome of a JWKS fetch. Never an error: absence of data is tolerated
/// by the callers, only a published set that omits a key is meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwksLookup {
    /// Unreachable, non-success, or not a `{keys: [...]}` document.
    Unavailable(String),
    /// The RSA keys the authority currently publishes.
    Published(Vec<KeyIdentity>),
}

impl JwksLookup {
    /// Parses a JWKS body. Entries without `n`/`e` are skipped.
    #[must_use]
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<JwksDocument>(body) {
            Ok(doc) => JwksLookup::Published(
                doc.keys
                    .into_iter()
                    .filter_map(|jwk| {
                        Some(KeyIdentity {
                            n: jwk.n?,
                            e: jwk.e?,
                        })
                    })
                    .collect(),
            ),
            Err(e) => JwksLookup::Unavailable(format!("malformed JWKS: {e}")),
        }
    }
}

/// Client for the authority endpoints of one configuration.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    client: Client,
    base_url: String,
    verify_url: String,
    pem_url: String,
    jwks_url: String,
    alert_url: String,
    timeout: Duration,
    alert_timeout: Duration,
}

impl AuthorityClient {
    /// Builds a client from configuration.
    pub fn new(config: &LicenseClientConfig) -> LicenseResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("hearth-license/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LicenseError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.authority_url.trim_end_matches('/').to_string(),
            verify_url: config.authority_endpoint(&config.verify_path),
            pem_url: config.authority_endpoint(&config.public_key_path),
            jwks_url: config.authority_endpoint(&config.jwks_path),
            alert_url: config.authority_endpoint(&config.alert_endpoint),
            timeout: config.remote_timeout(),
            alert_timeout: config.alert_timeout(),
        })
    }

    /// The authority base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POSTs `{license_key, domain}` and extracts the signed payload.
    ///
    /// The signature is not checked here.
    pub async fn verify(&self, license_key: &str, domain: &str) -> LicenseResult<SignedPayload> {
        debug!(url = %self.verify_url, domain, "Requesting license verification");
        let response = self
            .client
            .post(&self.verify_url)
            .timeout(self.timeout)
            .json(&VerifyRequest {
                license_key,
                domain,
            })
            .send()
            .await
            .map_err(|e| LicenseError::Network(format!("verify request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LicenseError::AuthorityRejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LicenseError::MalformedResponse(format!("body is not JSON: {e}")))?;
        SignedPayload::from_response(&body)
    }

    /// GETs the authority's PEM public key.
    pub async fn fetch_public_key_pem(&self) -> LicenseResult<String> {
        let response = self
            .client
            .get(&self.pem_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LicenseError::KeyFetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LicenseError::KeyFetchFailed(format!("HTTP {}", status.as_u16())));
        }
        response
            .text()
            .await
            .map_err(|e| LicenseError::KeyFetchFailed(e.to_string()))
    }

    /// GETs the published key set.
    pub async fn fetch_jwks(&self) -> JwksLookup {
        let response = match self.client.get(&self.jwks_url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => return JwksLookup::Unavailable(format!("unreachable: {e}")),
        };
        if !response.status().is_success() {
            return JwksLookup::Unavailable(format!("HTTP {}", response.status().as_u16()));
        }
        match response.text().await {
            Ok(body) => JwksLookup::from_body(&body),
            Err(e) => JwksLookup::Unavailable(format!("unreadable body: {e}")),
        }
    }

    /// POSTs a fraud alert. The response body is ignored.
    pub async fn send_alert(&self, envelope: &AlertEnvelope) -> LicenseResult<()> {
        let response = self
            .client
            .post(&self.alert_url)
            .timeout(self.alert_timeout)
            .json(envelope)
            .send()
            .await
            .map_err(|e| LicenseError::Network(format!("alert request failed: {e}")))?;
        debug!(status = response.status().as_u16(), "Fraud alert delivered");
        Ok(())
    }
}
