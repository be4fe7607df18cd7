//! Process start-up: resolve identity once, then hand out the gate.

use crate::config::LicenseClientConfig;
use crate::error::LicenseResult;
use crate::gate::EnforcementGate;
use crate::identity::{AuthorityIdentity, AuthorityIdentityResolver};
use crate::store::LicenseStore;
use tokio::sync::OnceCell;
use tracing::info;

static IDENTITY: OnceCell<AuthorityIdentity> = OnceCell::const_new();

/// What the host must do after boot.
#[derive(Debug, Clone)]
pub enum BootOutcome {
    /// This installation is the authority. Do not register enforcement.
    AuthorityExempt,
    /// Register this gate in the request pipeline.
    Enforced(EnforcementGate),
}

impl BootOutcome {
    /// The gate, for client installations.
    #[must_use]
    pub fn gate(&self) -> Option<&EnforcementGate> {
        match self {
            Self::AuthorityExempt => None,
            Self::Enforced(gate) => Some(gate),
        }
    }
}

/// Resolves the authority identity for this process, once.
///
/// Later calls reuse the first verdict. A failed resolution is not cached,
/// but the caller is expected to stop the process on `Err`.
pub async fn resolve_identity(config: &LicenseClientConfig) -> LicenseResult<AuthorityIdentity> {
    let identity = IDENTITY
        .get_or_try_init(|| async {
            AuthorityIdentityResolver::new(config.clone())?.resolve().await
        })
        .await?;
    Ok(*identity)
}

/// Validates `config`, resolves identity and returns what to enforce.
///
/// `Err(IntegrityMismatch)` means the host must not start.
pub async fn boot(config: &LicenseClientConfig) -> LicenseResult<BootOutcome> {
    config.validate()?;
    let identity = resolve_identity(config).await?;
    if identity.is_authority {
        return Ok(BootOutcome::AuthorityExempt);
    }
    info!(app_url = %config.app_url, "License enforcement active");
    Ok(BootOutcome::Enforced(EnforcementGate::new(
        config,
        LicenseStore::from_config(config),
    )))
}
