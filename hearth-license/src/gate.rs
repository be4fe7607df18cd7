//! Per-request license enforcement for client installations.

use crate::config::{host_of, LicenseClientConfig};
use crate::messages::BlockReason;
use crate::store::LicenseStore;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Result of checking one request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Let the request through.
    Allow,
    /// Refuse it.
    Block(BlockReason),
}

impl GateDecision {
    /// True for [`GateDecision::Allow`].
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// The enforcement check a host registers in its request pipeline.
///
/// Only [`boot`](crate::boot) hands these out, and only to client
/// installations.
#[derive(Debug, Clone)]
pub struct EnforcementGate {
    store: LicenseStore,
    app_host: Option<String>,
    whitelist: Vec<String>,
}

impl EnforcementGate {
    pub(crate) fn new(config: &LicenseClientConfig, store: LicenseStore) -> Self {
        Self {
            store,
            app_host: host_of(&config.app_url),
            whitelist: config.whitelist.clone(),
        }
    }

    /// Whether `path` bypasses enforcement.
    #[must_use]
    pub fn is_whitelisted(&self, path: &str) -> bool {
        self.whitelist.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'))
        })
    }

    /// Checks `path` against the installed license at the current time.
    ///
    /// The store read runs on the blocking pool.
    pub async fn check(&self, path: &str) -> GateDecision {
        if self.is_whitelisted(path) {
            return GateDecision::Allow;
        }
        let gate = self.clone();
        let path = path.to_owned();
        match tokio::task::spawn_blocking(move || gate.check_at(&path, Utc::now())).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "License check did not complete");
                GateDecision::Block(BlockReason::Invalid)
            }
        }
    }

    /// Checks `path` against the installed license at `now`. Blocks on the
    /// store read.
    #[must_use]
    pub fn check_at(&self, path: &str, now: DateTime<Utc>) -> GateDecision {
        if self.is_whitelisted(path) {
            return GateDecision::Allow;
        }

        let record = match self.store.read() {
            Ok(Some(record)) => record,
            Ok(None) => return GateDecision::Block(BlockReason::NotPresent),
            Err(e) => {
                warn!(error = %e, "Installed license unreadable");
                return GateDecision::Block(BlockReason::Invalid);
            }
        };

        if let Some(app_host) = &self.app_host {
            let domain = record.domain.trim();
            if !domain.is_empty() && !domain.eq_ignore_ascii_case(app_host) {
                debug!(domain, app_host = %app_host, "License issued for another host");
                return GateDecision::Block(BlockReason::DomainMismatch);
            }
        }

        let status = record.status_at(now);
        if status.is_valid {
            GateDecision::Allow
        } else if status.is_expired_at(now) {
            GateDecision::Block(BlockReason::Expired)
        } else {
            GateDecision::Block(BlockReason::NotActive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LicenseData, LicenseRecord};
    use chrono::TimeZone;
    use hearth_crypto::KdfParams;
    use serde_json::json;
    use tempfile::TempDir;

    fn gate(whitelist: &[&str]) -> EnforcementGate {
        EnforcementGate {
            store: LicenseStore::new("/nonexistent/hearth/license.json", None),
            app_host: None,
            whitelist: whitelist.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn installed(data: serde_json::Value, domain: &str) -> (TempDir, EnforcementGate) {
        let dir = tempfile::tempdir().unwrap();
        let store = LicenseStore::new(dir.path().join("license.json"), Some("k".into()))
            .with_kdf_params(KdfParams::fast());
        let serde_json::Value::Object(map) = data else {
            panic!("data must be an object");
        };
        let record = LicenseRecord {
            license_key: "K".into(),
            domain: domain.into(),
            data: LicenseData(map),
            ..LicenseRecord::default()
        };
        store.write(&record, None).unwrap();
        let config = LicenseClientConfig {
            app_url: "https://client.example".into(),
            whitelist: vec!["/licente".into()],
            ..LicenseClientConfig::default()
        };
        (dir, EnforcementGate::new(&config, store))
    }

    fn june() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn valid_license_allows() {
        let (_dir, g) = installed(json!({ "valid": true }), "client.example");
        assert!(g.check_at("/orders", june()).is_allowed());
    }

    #[test]
    fn domain_comparison_ignores_case() {
        let (_dir, g) = installed(json!({ "valid": true }), "Client.Example");
        assert!(g.check_at("/orders", june()).is_allowed());
    }

    #[test]
    fn empty_record_domain_is_not_a_mismatch() {
        let (_dir, g) = installed(json!({ "valid": true }), "");
        assert!(g.check_at("/orders", june()).is_allowed());
    }

    #[test]
    fn other_domain_blocks() {
        let (_dir, g) = installed(json!({ "valid": true }), "elsewhere.example");
        assert_eq!(
            g.check_at("/orders", june()),
            GateDecision::Block(BlockReason::DomainMismatch)
        );
    }

    #[test]
    fn past_expiry_blocks_expired() {
        let (_dir, g) = installed(json!({ "expires_at": "2026-01-01" }), "client.example");
        assert_eq!(
            g.check_at("/orders", june()),
            GateDecision::Block(BlockReason::Expired)
        );
    }

    #[test]
    fn pending_upload_blocks_not_active() {
        let (_dir, g) = installed(json!({ "valid": false, "pending": true }), "client.example");
        assert_eq!(
            g.check_at("/orders", june()),
            GateDecision::Block(BlockReason::NotActive)
        );
        assert!(g.check_at("/licente/upload", june()).is_allowed());
    }

    #[test]
    fn corrupt_store_blocks_invalid() {
        let (dir, g) = installed(json!({ "valid": true }), "client.example");
        std::fs::write(dir.path().join("license.json"), "{}").unwrap();
        assert_eq!(
            g.check_at("/orders", june()),
            GateDecision::Block(BlockReason::Invalid)
        );
    }

    #[test]
    fn whitelist_matches_segments_not_substrings() {
        let g = gate(&["/licente", "/health"]);
        assert!(g.is_whitelisted("/licente"));
        assert!(g.is_whitelisted("/licente/upload"));
        assert!(g.is_whitelisted("/health"));
        assert!(!g.is_whitelisted("/licentele"));
        assert!(!g.is_whitelisted("/orders"));
    }

    #[tokio::test]
    async fn missing_store_blocks_not_present() {
        assert_eq!(
            gate(&[]).check("/orders").await,
            GateDecision::Block(BlockReason::NotPresent)
        );
    }

    #[tokio::test]
    async fn whitelisted_path_skips_the_store() {
        assert!(gate(&["/health"]).check("/health").await.is_allowed());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn check_leaves_the_runtime_free() {
        let dir = tempfile::tempdir().unwrap();
        let store = LicenseStore::new(dir.path().join("license.json"), Some("k".into()));
        store
            .write(&LicenseRecord::manual_upload("K", "client.example"), None)
            .unwrap();
        let config = LicenseClientConfig {
            app_url: "https://client.example".into(),
            ..LicenseClientConfig::default()
        };
        let gate = EnforcementGate::new(&config, store);

        let check = tokio::spawn(async move { gate.check("/orders").await });
        let mut ticks = 0u32;
        while !check.is_finished() {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            ticks += 1;
        }
        assert_eq!(check.await.unwrap(), GateDecision::Block(BlockReason::NotActive));
        assert!(ticks >= 2, "timer only fired {ticks} time(s) during the check");
    }
}
