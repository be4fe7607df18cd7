//! Boot-time decision: is this installation the authority, or a client?
//!
//! Holding a private key makes an installation a candidate authority. The
//! claim then has to survive two independent cross-checks, the bundled
//! public key and the authority's published JWKS. Missing evidence is
//! tolerated; evidence that contradicts the key aborts boot. Without a
//! usable private key the weaker host-equality rule decides.
//!
//! The decision itself ([`decide`]) is a pure state machine over
//! [`IdentityEvidence`], so every path can be exercised without HTTP.

use crate::authority::{AuthorityClient, JwksLookup};
use crate::config::{host_of, LicenseClientConfig};
use crate::error::{LicenseError, LicenseResult};
use crate::fingerprint::KeyFingerprint;
use crate::fraud::{FraudAlert, FraudReporter};
use crate::keys::{parse_private_key, parse_public_key, KeyIdentity, PrivateKeyHandle, PublicKeyHandle};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// A proven contradiction between the held key and a trusted source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFailure {
    /// The bundled public key is a different key.
    BundledKeyMismatch,
    /// The authority publishes a key set that does not include this key.
    NotInPublishedKeys,
}

impl fmt::Display for IntegrityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BundledKeyMismatch => {
                f.write_str("private key does not match the bundled authority public key")
            }
            Self::NotInPublishedKeys => {
                f.write_str("private key is not in the authority's published key set")
            }
        }
    }
}

/// States of the resolution. `ClientEnforced`, `AuthorityExempt` and
/// `Aborted` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// Nothing decided yet.
    Unknown,
    /// A private key parsed; tentatively the authority.
    KeyHeld(KeyIdentity),
    /// The bundled key matched or was absent.
    BundledKeyCleared(KeyIdentity),
    /// No usable private key; decide by host equality.
    HostFallback,
    /// This installation must enforce a license.
    ClientEnforced,
    /// This installation is the authority and does not enforce.
    AuthorityExempt,
    /// Integrity proof failed; boot must stop.
    Aborted(IntegrityFailure),
}

impl IdentityState {
    /// True for the three verdict states.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ClientEnforced | Self::AuthorityExempt | Self::Aborted(_)
        )
    }
}

/// Everything the decision looks at, gathered before deciding.
#[derive(Debug, Clone)]
pub struct IdentityEvidence {
    /// Identity of the held private key, if one parsed.
    pub private_key: Option<KeyIdentity>,
    /// Identity of the bundled public key, if the file exists and parses.
    pub bundled_public_key: Option<KeyIdentity>,
    /// The authority's published keys.
    pub jwks: JwksLookup,
    /// Configured authority URL.
    pub authority_url: String,
    /// This application's URL.
    pub app_url: String,
}

/// One transition of the state machine.
#[must_use]
pub fn step(state: &IdentityState, evidence: &IdentityEvidence) -> IdentityState {
    match state {
        IdentityState::Unknown => match &evidence.private_key {
            Some(identity) => IdentityState::KeyHeld(identity.clone()),
            None => IdentityState::HostFallback,
        },
        IdentityState::KeyHeld(identity) => match &evidence.bundled_public_key {
            Some(bundled) if !bundled.matches(identity) => {
                IdentityState::Aborted(IntegrityFailure::BundledKeyMismatch)
            }
            _ => IdentityState::BundledKeyCleared(identity.clone()),
        },
        IdentityState::BundledKeyCleared(identity) => match &evidence.jwks {
            JwksLookup::Published(keys) if !keys.iter().any(|k| k.matches(identity)) => {
                IdentityState::Aborted(IntegrityFailure::NotInPublishedKeys)
            }
            _ => IdentityState::AuthorityExempt,
        },
        IdentityState::HostFallback => {
            match (host_of(&evidence.authority_url), host_of(&evidence.app_url)) {
                (Some(authority), Some(app)) if authority.eq_ignore_ascii_case(&app) => {
                    IdentityState::AuthorityExempt
                }
                _ => IdentityState::ClientEnforced,
            }
        }
        terminal => terminal.clone(),
    }
}

/// Runs the state machine to a terminal state.
#[must_use]
pub fn decide(evidence: &IdentityEvidence) -> IdentityState {
    let mut state = IdentityState::Unknown;
    while !state.is_terminal() {
        let next = step(&state, evidence);
        debug!(from = ?state, to = ?next, "Identity resolution step");
        state = next;
    }
    state
}

/// How an authority verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityBasis {
    /// A private key survived the cross-checks.
    PrivateKey,
    /// Host equality between authority URL and app URL.
    HostMatch,
    /// Client installation.
    Client,
}

/// The process's verdict after a successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityIdentity {
    /// Whether this installation is the authority.
    pub is_authority: bool,
    /// Why.
    pub basis: IdentityBasis,
}

/// Reads a key file, treating "absent" and "unusable" the same way.
fn load_key_file<T>(path: &Path, what: &str, parse: impl Fn(&str) -> LicenseResult<T>) -> Option<T> {
    let pem = match fs::read_to_string(path) {
        Ok(pem) => pem,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No {what} found");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read {what}");
            return None;
        }
    };
    match parse(&pem) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unusable {what}");
            None
        }
    }
}

/// Gathers evidence from disk and the authority, then decides.
#[derive(Debug, Clone)]
pub struct AuthorityIdentityResolver {
    config: LicenseClientConfig,
    authority: AuthorityClient,
}

impl AuthorityIdentityResolver {
    /// Creates a resolver for `config`.
    pub fn new(config: LicenseClientConfig) -> LicenseResult<Self> {
        let authority = AuthorityClient::new(&config)?;
        Ok(Self { config, authority })
    }

    fn load_private_key(&self) -> Option<PrivateKeyHandle> {
        load_key_file(
            &self.config.resolved_private_key_path(),
            "authority private key",
            parse_private_key,
        )
    }

    fn load_bundled_key(&self) -> Option<(String, PublicKeyHandle)> {
        load_key_file(
            &self.config.resolved_public_key_path(),
            "bundled authority public key",
            |pem| Ok((pem.to_string(), parse_public_key(pem)?)),
        )
    }

    /// Runs the full resolution once. On a proven mismatch the authority
    /// is alerted (best effort) and `IntegrityMismatch` is returned.
    pub async fn resolve(&self) -> LicenseResult<AuthorityIdentity> {
        let private_key = self.load_private_key();
        let bundled = self.load_bundled_key();

        // The key set only matters when there is a key to look for.
        let jwks = match &private_key {
            Some(_) => self.authority.fetch_jwks().await,
            None => JwksLookup::Unavailable("not consulted".to_string()),
        };
        if let JwksLookup::Unavailable(reason) = &jwks {
            if private_key.is_some() {
                warn!(reason = %reason, "Authority JWKS unavailable; skipping published-key check");
            }
        }

        let evidence = IdentityEvidence {
            private_key: private_key.as_ref().map(PrivateKeyHandle::identity),
            bundled_public_key: bundled.as_ref().map(|(_, key)| key.identity()),
            jwks,
            authority_url: self.config.authority_url.clone(),
            app_url: self.config.app_url.clone(),
        };

        match decide(&evidence) {
            IdentityState::Aborted(failure) => {
                error!(%failure, "Authority identity check failed; aborting boot");
                let alert = FraudAlert::new(self.config.license_domain(), failure.to_string());
                FraudReporter::new(self.authority.clone())
                    .notify(private_key.as_ref(), &alert)
                    .await;
                Err(LicenseError::IntegrityMismatch(failure.to_string()))
            }
            IdentityState::AuthorityExempt => {
                let basis = if let Some(key) = &private_key {
                    let pem = bundled.as_ref().map(|(pem, _)| pem.as_str());
                    let fingerprint = KeyFingerprint::issue(key, pem);
                    if let Err(e) = fingerprint.write_to(&self.config.fingerprint_path()) {
                        warn!(error = %e, "Could not write key fingerprint");
                    }
                    IdentityBasis::PrivateKey
                } else {
                    IdentityBasis::HostMatch
                };
                info!(?basis, "Running as the license authority; enforcement disabled");
                Ok(AuthorityIdentity {
                    is_authority: true,
                    basis,
                })
            }
            _ => {
                info!("Running as a client installation; enforcement enabled");
                Ok(AuthorityIdentity {
                    is_authority: false,
                    basis: IdentityBasis::Client,
                })
            }
        }
    }
}
