//! The locally persisted license record and its derived status.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Expiry keys in the order they are consulted; the first parseable wins.
pub const EXPIRY_KEYS: [&str; 5] = ["expires_at", "valid_until", "expiry", "expires", "valid_until_at"];

/// Message stored with a manually uploaded key.
pub const UPLOAD_PENDING_MESSAGE: &str = "Licența așteaptă verificarea autorității.";

/// The single license record an installation holds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Opaque authority-issued identifier.
    #[serde(default)]
    pub license_key: String,
    /// Host this record was issued or verified for.
    #[serde(default)]
    pub domain: String,
    /// Authority-controlled payload.
    #[serde(default)]
    pub data: LicenseData,
    /// Last time this record was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    /// Authority URL the record was verified against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
}

impl LicenseRecord {
    /// A record created by pasting a key into the management interface.
    ///
    /// It is never valid: the authority has to confirm it first.
    #[must_use]
    pub fn manual_upload(license_key: &str, domain: &str) -> Self {
        let mut data = Map::new();
        data.insert("valid".into(), Value::Bool(false));
        data.insert("pending".into(), Value::Bool(true));
        data.insert("issued_by_manual_upload".into(), Value::Bool(true));
        data.insert("needs_server_verification".into(), Value::Bool(true));
        data.insert(
            "message".into(),
            Value::String(UPLOAD_PENDING_MESSAGE.into()),
        );

        Self {
            license_key: license_key.trim().to_string(),
            domain: domain.to_string(),
            data: LicenseData(data),
            fetched_at: Some(Utc::now()),
            authority: None,
        }
    }

    /// True when `data.valid` is truthy. Such a record is locked locally.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.data.valid() == Some(true)
    }

    /// Derives validity and expiry at the current time.
    #[must_use]
    pub fn status(&self) -> LicenseStatus {
        self.status_at(Utc::now())
    }

    /// Derives validity and expiry at `now`.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> LicenseStatus {
        let mut is_valid = self.data.valid().unwrap_or(false);
        let valid_until = self.data.expiry();
        if !is_valid {
            if let Some(until) = valid_until {
                is_valid = now < until;
            }
        }

        LicenseStatus {
            is_valid,
            valid_until,
            pending: self.data.flag("pending"),
        }
    }
}

/// Derived view of a record; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LicenseStatus {
    /// Whether the license currently grants use.
    pub is_valid: bool,
    /// The first parseable expiry, if any.
    pub valid_until: Option<DateTime<Utc>>,
    /// The authority has not decided on this key yet.
    pub pending: bool,
}

impl LicenseStatus {
    /// True when an expiry is known and already passed.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| until <= now)
    }
}

/// The authority payload. Unknown members are kept verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseData(pub Map<String, Value>);

impl LicenseData {
    /// `valid` under loose boolean rules, `None` when absent.
    #[must_use]
    pub fn valid(&self) -> Option<bool> {
        self.0.get("valid").map(truthy)
    }

    /// A boolean flag; absent means false.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(truthy)
    }

    /// The authority's human-readable message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(Value::as_str)
    }

    /// First non-empty, parseable expiry among [`EXPIRY_KEYS`].
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        EXPIRY_KEYS.iter().find_map(|key| {
            let raw = self.0.get(*key)?.as_str()?.trim();
            if raw.is_empty() {
                return None;
            }
            parse_timestamp(raw)
        })
    }

    /// Raw member access.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl From<Map<String, Value>> for LicenseData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Loose boolean conversion: `true`, non-zero numbers, non-empty strings
/// other than `"0"`, and non-empty collections are true.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Parses RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or `YYYY-MM-DD` (UTC midnight).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
