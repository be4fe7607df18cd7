//! Local license management: the operations behind the `/licente` pages.
//!
//! Every operation returns an explicit outcome with a user-facing message;
//! the presentation layer decides how to show it.

use crate::config::LicenseClientConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::protocol::{LicenseVerifier, VerificationStep};
use crate::record::{LicenseRecord, LicenseStatus};
use crate::store::LicenseStore;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Category of a failed management operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Refused because a valid license is installed.
    Guarded,
    /// Nothing installed.
    NotInstalled,
    /// Bad input from the caller.
    InvalidInput,
    /// The store exists but cannot be read.
    Corrupt,
    /// The authority protocol failed.
    Verification,
    /// Filesystem or configuration failure.
    Storage,
}

/// Result of a management operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ManagementOutcome {
    /// The operation took effect.
    Success {
        /// What happened.
        message: String,
    },
    /// Nothing changed.
    Failure {
        /// Why.
        kind: FailureKind,
        /// What to tell the user.
        message: String,
    },
}

impl ManagementOutcome {
    fn success(message: impl Into<String>) -> Self {
        Self::Success {
            message: message.into(),
        }
    }

    fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    /// True for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The failure kind, if any.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    /// The message, either way.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Success { message } | Self::Failure { message, .. } => message,
        }
    }
}

/// What the overview page shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LicenseOverview {
    /// The decrypted record, when readable.
    pub record: Option<LicenseRecord>,
    /// Its derived status.
    pub status: Option<LicenseStatus>,
    /// Why the record could not be shown.
    pub error: Option<String>,
}

/// Result of a dry-run verification.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    /// The key that was checked.
    pub license_key: Option<String>,
    /// The domain sent to the authority.
    pub domain: String,
    /// The authority URL used.
    pub authority: String,
    /// Where the protocol stopped; `None` when every step passed.
    pub failed_step: Option<VerificationStep>,
    /// Error text for the failed step.
    pub error: Option<String>,
    /// The verified payload when every step passed.
    pub data: Option<Map<String, Value>>,
}

impl DiagnosticReport {
    /// True when signature verification succeeded.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failed_step.is_none()
    }
}

/// The management operations for one installation.
#[derive(Debug, Clone)]
pub struct LicenseManager {
    verifier: LicenseVerifier,
    domain: String,
}

impl LicenseManager {
    /// Creates a manager over `verifier`, licensing `domain`.
    pub fn new(verifier: LicenseVerifier, domain: impl Into<String>) -> Self {
        Self {
            verifier,
            domain: domain.into(),
        }
    }

    /// Creates a manager for `config`.
    pub fn from_config(config: &LicenseClientConfig) -> LicenseResult<Self> {
        Ok(Self::new(
            LicenseVerifier::from_config(config)?,
            config.license_domain(),
        ))
    }

    fn store(&self) -> &LicenseStore {
        self.verifier.store()
    }

    /// The domain this installation licenses.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Reads the installed license. Never fails.
    pub async fn overview(&self) -> LicenseOverview {
        match self.store().blocking(LicenseStore::read).await {
            Ok(Some(record)) => LicenseOverview {
                status: Some(record.status()),
                record: Some(record),
                error: None,
            },
            Ok(None) => LicenseOverview::default(),
            Err(e) if e.is_corrupt() => LicenseOverview {
                error: Some("Fișierul de licență este corupt sau format neașteptat.".to_string()),
                ..LicenseOverview::default()
            },
            Err(e) => LicenseOverview {
                error: Some(format!("Eroare la citirea licenței: {e}")),
                ..LicenseOverview::default()
            },
        }
    }

    /// Installs a pasted key as a pending record.
    pub async fn upload(&self, license_key: &str) -> ManagementOutcome {
        let key = license_key.trim();
        if key.is_empty() {
            return ManagementOutcome::failure(
                FailureKind::InvalidInput,
                "Cheia de licență este obligatorie.",
            );
        }

        let record = LicenseRecord::manual_upload(key, &self.domain);
        let installed = self
            .store()
            .blocking(move |store| store.install(&record))
            .await;
        match installed {
            Ok(()) => {
                info!(domain = %self.domain, "License key uploaded; awaiting authority verification");
                ManagementOutcome::success("Licența a fost instalată local.")
            }
            Err(LicenseError::Guarded) => ManagementOutcome::failure(
                FailureKind::Guarded,
                "O licență validă este deja instalată și nu poate fi suprascrisă din interfață.",
            ),
            Err(e) => {
                warn!(error = %e, "License upload failed");
                ManagementOutcome::failure(FailureKind::Storage, format!("Eroare la instalare: {e}"))
            }
        }
    }

    /// Re-verifies the installed key with the authority and stores the result.
    pub async fn reverify(&self) -> ManagementOutcome {
        match self.verifier.reverify().await {
            Ok(verification) => {
                let message = match verification.message() {
                    "" => "Licența a fost verificată cu autoritatea.".to_string(),
                    message => message.to_string(),
                };
                ManagementOutcome::success(message)
            }
            Err(LicenseError::NotInstalled) => ManagementOutcome::failure(
                FailureKind::NotInstalled,
                "Nu există nicio licență instalată.",
            ),
            Err(e) if e.is_corrupt() => {
                ManagementOutcome::failure(FailureKind::Corrupt, "Fișierul de licență este corupt.")
            }
            Err(e) => {
                warn!(error = %e, step = ?VerificationStep::of(&e), "License re-verification failed");
                ManagementOutcome::failure(FailureKind::Verification, format!("Verificare eșuată: {e}"))
            }
        }
    }

    /// Deletes the installed license unless it is valid.
    pub async fn remove(&self) -> ManagementOutcome {
        match self.store().blocking(LicenseStore::delete).await {
            Ok(()) => ManagementOutcome::success("Fișierul de licență a fost șters."),
            Err(LicenseError::Guarded) => ManagementOutcome::failure(
                FailureKind::Guarded,
                "Licența este validă și nu poate fi ștearsă din interfață.",
            ),
            Err(LicenseError::NotInstalled) => ManagementOutcome::failure(
                FailureKind::NotInstalled,
                "Nu există fișier de licență de șters.",
            ),
            Err(e) => ManagementOutcome::failure(FailureKind::Storage, format!("Eroare la ștergere: {e}")),
        }
    }

    /// Runs the verification protocol without storing anything.
    ///
    /// Uses `license_key` when given, else the installed key.
    pub async fn diagnostic(&self, license_key: Option<&str>) -> DiagnosticReport {
        let (license_key, domain) = match license_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => (Some(key.to_string()), self.domain.clone()),
            None => match self.store().blocking(LicenseStore::read).await {
                Ok(Some(record)) if !record.domain.is_empty() => {
                    (Some(record.license_key), record.domain)
                }
                Ok(Some(record)) => (Some(record.license_key), self.domain.clone()),
                _ => (None, self.domain.clone()),
            },
        };

        let mut report = DiagnosticReport {
            license_key: license_key.clone(),
            domain,
            authority: self.verifier.authority().base_url().to_string(),
            failed_step: None,
            error: None,
            data: None,
        };

        let result = self
            .verifier
            .fetch_verified(license_key.as_deref().unwrap_or_default(), &report.domain)
            .await;
        match result {
            Ok(signed) => report.data = Some(signed.data),
            Err(e) => {
                report.failed_step = Some(VerificationStep::of(&e));
                report.error = Some(e.to_string());
            }
        }
        report
    }
}
