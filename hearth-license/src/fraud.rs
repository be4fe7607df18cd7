//! Best-effort fraud notification to the authority.
//!
//! `notify` never fails outward and never waits longer than the alert
//! timeout; the abort path that calls it must not depend on the authority
//! being reachable.

use crate::authority::{AlertEnvelope, AuthorityClient};
use crate::canonical::canonical_json;
use crate::keys::PrivateKeyHandle;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// What is reported. Field order is the signed order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FraudAlert {
    /// Host of the installation raising the alert.
    pub host: String,
    /// What failed.
    pub message: String,
    /// RFC 3339 time of detection.
    pub time: String,
}

impl FraudAlert {
    /// An alert stamped with the current time.
    pub fn new(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::at(host, message, Utc::now())
    }

    /// An alert stamped with `time`.
    pub fn at(host: impl Into<String>, message: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            host: host.into(),
            message: message.into(),
            time: time.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Builds the `{payload, signature}` envelope for `alert`.
///
/// The signature is omitted when there is no key or signing fails.
#[must_use]
pub fn seal_alert(private_key: Option<&PrivateKeyHandle>, alert: &FraudAlert) -> Option<AlertEnvelope> {
    let value = serde_json::to_value(alert).ok()?;
    let payload = canonical_json(&value).ok()?;
    let signature = private_key.and_then(|key| match key.sign_base64(&payload) {
        Ok(sig) => Some(sig),
        Err(e) => {
            warn!(error = %e, "Fraud alert will be sent unsigned");
            None
        }
    });
    Some(AlertEnvelope {
        // canonical_json only emits ASCII
        payload: String::from_utf8_lossy(&payload).into_owned(),
        signature,
    })
}

/// Sends signed fraud alerts to the authority.
#[derive(Debug, Clone)]
pub struct FraudReporter {
    authority: AuthorityClient,
}

impl FraudReporter {
    /// Creates a reporter for `authority`.
    pub fn new(authority: AuthorityClient) -> Self {
        Self { authority }
    }

    /// Signs and posts `alert`. All failures are logged and swallowed.
    pub async fn notify(&self, private_key: Option<&PrivateKeyHandle>, alert: &FraudAlert) {
        let Some(envelope) = seal_alert(private_key, alert) else {
            warn!("Fraud alert could not be encoded");
            return;
        };
        match self.authority.send_alert(&envelope).await {
            Ok(()) => info!(host = %alert.host, "Fraud alert sent to authority"),
            Err(e) => warn!(error = %e, "Fraud alert not delivered"),
        }
    }
}
