//! Fixed texts shown when a request is blocked.
//!
//! These are compiled in; configuration cannot replace them.

use serde::Serialize;

/// Why the gate blocked a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// No license installed.
    NotPresent,
    /// The store could not be read or decrypted.
    Invalid,
    /// Installed but neither valid nor expired.
    NotActive,
    /// Issued for another host.
    DomainMismatch,
    /// Past its expiry.
    Expired,
}

impl BlockReason {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::NotPresent => "not_present",
            Self::Invalid => "invalid",
            Self::NotActive => "not_active",
            Self::DomainMismatch => "domain_mismatch",
            Self::Expired => "expired",
        }
    }

    /// The user-facing text.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::NotPresent => {
                "A valid license is required to run this application. Please contact support."
            }
            Self::Invalid => {
                "The installed license appears to be invalid or corrupted. Please re-install your license."
            }
            Self::NotActive => {
                "Your license is not active. Please activate your license or contact support."
            }
            Self::DomainMismatch => "This license is not valid for this host.",
            Self::Expired => "Your license has expired. Please renew your license to continue.",
        }
    }

    /// Looks a reason up by code; unknown codes read as `Invalid`.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "not_present" => Self::NotPresent,
            "not_active" => Self::NotActive,
            "domain_mismatch" => Self::DomainMismatch,
            "expired" => Self::Expired,
            _ => Self::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for reason in [
            BlockReason::NotPresent,
            BlockReason::Invalid,
            BlockReason::NotActive,
            BlockReason::DomainMismatch,
            BlockReason::Expired,
        ] {
            assert_eq!(BlockReason::from_code(reason.code()), reason);
        }
    }

    #[test]
    fn unknown_code_falls_back_to_invalid() {
        assert_eq!(BlockReason::from_code("bogus"), BlockReason::Invalid);
    }
}
