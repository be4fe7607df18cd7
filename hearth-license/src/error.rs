//! Error types for the licensing client.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Filesystem failure while touching the store or key files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store file is not a well-formed encrypted wrapper.
    #[error("license store is corrupt: {0}")]
    CorruptStore(String),

    /// The wrapper was well-formed but its payload did not decrypt or decode.
    #[error("failed to decrypt license store: {0}")]
    Decryption(String),

    /// Encrypting a record for storage failed.
    #[error("failed to encrypt license record: {0}")]
    Encryption(String),

    /// Authority unreachable or the call timed out.
    #[error("network error: {0}")]
    Network(String),

    /// The authority answered the verify call with a non-success status.
    #[error("authority rejected the request with HTTP {status}")]
    AuthorityRejected {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// The authority response lacks `data` or `signature`.
    #[error("malformed authority response: {0}")]
    MalformedResponse(String),

    /// The authority public key could not be fetched.
    #[error("failed to fetch authority public key: {0}")]
    KeyFetchFailed(String),

    /// PEM material did not parse as a key.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The key parsed but is not an RSA key.
    #[error("unsupported key type (only RSA keys are supported)")]
    UnsupportedKeyType,

    /// The authority served a public key that does not parse.
    #[error("authority public key is invalid: {0}")]
    InvalidAuthorityKey(String),

    /// The signature does not cover the payload under the authority key.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// Policy refusal: a valid license cannot be replaced or removed locally.
    #[error("a valid license is installed and cannot be modified from the local interface")]
    Guarded,

    /// Authority identity proof failed; boot must not continue.
    #[error("authority identity integrity check failed: {0}")]
    IntegrityMismatch(String),

    /// No license file is installed.
    #[error("no license is installed")]
    NotInstalled,

    /// No license key was supplied.
    #[error("no license key provided")]
    MissingLicenseKey,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// True when the store exists but cannot be trusted to hold a record.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptStore(_) | Self::Decryption(_))
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
