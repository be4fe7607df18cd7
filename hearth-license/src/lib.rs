//! License enforcement client for Hearth installations.
//!
//! This crate handles:
//! - Encrypted-at-rest storage of the single local license record
//! - Verification of authority-signed license data (RSA-SHA256)
//! - Deciding at boot whether this installation is the authority itself
//! - Best-effort fraud alerts and key fingerprint issuance
//! - The per-request enforcement gate for client installations
//!
//! # Design Principles
//!
//! - **Nothing unproven is trusted**: a record is only written after the
//!   authority's signature verifies over the exact bytes it signed
//! - **Valid records are locked**: the local interface cannot overwrite or
//!   delete a license the authority marked valid
//! - **Absent evidence is tolerated, contradicting evidence is fatal**:
//!   an unreachable JWKS is fine, a JWKS that omits our key aborts boot
//! - **Enforcement is wired in by the host**: [`boot`] returns a gate, it
//!   does not patch anything
//!
//! # Canonical JSON
//!
//! The authority signs `json_encode($data)` with PHP defaults: members in
//! received order, `/` escaped as `\/`, non-ASCII as lowercase `\uXXXX`.
//! See [`canonical_json`].

mod authority;
mod boot;
mod canonical;
mod config;
mod error;
mod fingerprint;
mod fraud;
mod gate;
mod identity;
mod keys;
mod manager;
mod messages;
mod protocol;
mod record;
mod signature;
mod store;

pub use authority::{AlertEnvelope, AuthorityClient, Jwk, JwksLookup, VerifyRequest};
pub use boot::{boot, resolve_identity, BootOutcome};
pub use canonical::canonical_json;
pub use config::{host_of, LicenseClientConfig, DEFAULT_AUTHORITY_URL};
pub use error::{LicenseError, LicenseResult};
pub use fingerprint::KeyFingerprint;
pub use fraud::{seal_alert, FraudAlert, FraudReporter};
pub use gate::{EnforcementGate, GateDecision};
pub use identity::{
    decide, step, AuthorityIdentity, AuthorityIdentityResolver, IdentityBasis, IdentityEvidence,
    IdentityState, IntegrityFailure,
};
pub use keys::{
    base64_url_fingerprint, parse_private_key, parse_public_key, KeyIdentity, PrivateKeyHandle,
    PublicKeyHandle, RsaParams,
};
pub use manager::{DiagnosticReport, FailureKind, LicenseManager, LicenseOverview, ManagementOutcome};
pub use messages::BlockReason;
pub use protocol::{LicenseVerification, LicenseVerifier, VerificationStep};
pub use record::{
    parse_timestamp, truthy, LicenseData, LicenseRecord, LicenseStatus, EXPIRY_KEYS,
    UPLOAD_PENDING_MESSAGE,
};
pub use signature::{verify_data, SignedPayload};
pub use store::{LicenseStore, StoredWrapper, STORE_VERSION};
