mod common;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{TimeZone, Utc};
use common::*;
use hearth_crypto::KdfParams;
use hearth_license::{LicenseData, LicenseError, LicenseRecord, LicenseStore, StoredWrapper};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn record(valid: bool) -> LicenseRecord {
    let mut data = Map::new();
    data.insert("valid".into(), Value::Bool(valid));
    data.insert("message".into(), json!("Licență activă / OK"));
    LicenseRecord {
        license_key: "ABC-123".into(),
        domain: "client.example".into(),
        data: LicenseData(data),
        fetched_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
        authority: Some("https://hearth.master-data.ro".into()),
    }
}

fn read_wrapper(store: &LicenseStore) -> StoredWrapper {
    serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap()
}

#[test]
fn missing_file_reads_as_absent() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    assert!(!store.exists());
    assert!(store.read().unwrap().is_none());
}

#[test]
fn write_then_read_round_trips() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    let rec = record(false);
    store.write(&rec, None).unwrap();
    assert_eq!(store.read().unwrap(), Some(rec));
}

#[test]
fn wrapper_is_pretty_and_versioned() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    store.write(&record(false), None).unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.starts_with("{\n    \"encrypted\": true,\n    \"version\": 1,\n    \"payload\": \""));
    let wrapper = read_wrapper(&store);
    assert!(wrapper.encrypted);
    assert!(!raw.contains("ABC-123"), "plaintext leaked into the store");
}

#[test]
fn explicit_passphrase_overrides_default() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    store.write(&record(false), Some("other-secret")).unwrap();

    assert!(store.read().unwrap_err().is_corrupt());
    assert_eq!(store.read_with(Some("other-secret")).unwrap(), Some(record(false)));
}

#[test]
fn no_passphrase_is_a_config_error() {
    let dir = temp_dir();
    let store = LicenseStore::new(dir.path().join("license.json"), None);
    assert!(matches!(store.write(&record(false), None), Err(LicenseError::Config(_))));
}

#[test]
fn non_json_wrapper_is_corrupt() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    std::fs::write(store.path(), "garbage").unwrap();
    assert!(matches!(store.read(), Err(LicenseError::CorruptStore(_))));
}

#[test]
fn empty_payload_is_corrupt() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    std::fs::write(store.path(), r#"{"encrypted":true,"version":1,"payload":""}"#).unwrap();
    assert!(matches!(store.read(), Err(LicenseError::CorruptStore(_))));
}

#[test]
fn show_requires_encrypted_flag() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    store.write(&record(false), None).unwrap();
    let mut wrapper = read_wrapper(&store);
    wrapper.encrypted = false;
    std::fs::write(store.path(), serde_json::to_vec(&wrapper).unwrap()).unwrap();

    assert!(matches!(store.read_plaintext(None), Err(LicenseError::CorruptStore(_))));
}

#[test]
fn plaintext_is_record_json() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    store.write(&record(true), None).unwrap();
    let plaintext = store.read_plaintext(None).unwrap();
    let value: Value = serde_json::from_str(&plaintext).unwrap();
    assert_eq!(value["license_key"], "ABC-123");
    assert_eq!(value["data"]["valid"], true);
}

#[test]
fn ui_shaped_payload_decodes_with_defaults() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    let payload = hearth_crypto::encrypt_string(
        PASSPHRASE,
        r#"{"license_key":"K","domain":"d.example","data":{"valid":"1"}}"#,
        &KdfParams::fast(),
    )
    .unwrap();
    let wrapper = json!({ "encrypted": true, "version": 1, "payload": payload });
    std::fs::write(store.path(), wrapper.to_string()).unwrap();

    let rec = store.read().unwrap().unwrap();
    assert_eq!(rec.license_key, "K");
    assert!(rec.fetched_at.is_none());
    assert!(rec.is_locked());
}

#[test]
fn delete_refuses_valid_record() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    store.write(&record(true), None).unwrap();
    assert!(matches!(store.delete(), Err(LicenseError::Guarded)));
    assert!(store.exists());
}

#[test]
fn delete_removes_invalid_record() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    store.write(&record(false), None).unwrap();
    store.delete().unwrap();
    assert!(!store.exists());
}

#[test]
fn delete_removes_corrupt_file() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    std::fs::write(store.path(), "{\"payload\": \"AAAA\"}").unwrap();
    store.delete().unwrap();
    assert!(!store.exists());
}

#[test]
fn delete_without_file_is_not_installed() {
    let dir = temp_dir();
    assert!(matches!(fast_store(dir.path()).delete(), Err(LicenseError::NotInstalled)));
}

#[test]
fn install_refuses_to_overwrite_valid_record() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    store.write(&record(true), None).unwrap();
    let before = std::fs::read(store.path()).unwrap();

    let upload = LicenseRecord::manual_upload("NEW-KEY", "client.example");
    assert!(matches!(store.install(&upload), Err(LicenseError::Guarded)));
    assert_eq!(std::fs::read(store.path()).unwrap(), before);
}

#[test]
fn install_replaces_corrupt_file() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    std::fs::write(store.path(), "not json at all").unwrap();
    store
        .install(&LicenseRecord::manual_upload("NEW-KEY", "client.example"))
        .unwrap();
    assert_eq!(store.read().unwrap().unwrap().license_key, "NEW-KEY");
}

#[test]
fn clones_share_the_same_file() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    let clone = store.clone();
    store.write(&record(false), None).unwrap();
    assert!(clone.read().unwrap().is_some());
}

#[test]
fn unchanged_payload_is_not_decrypted_again() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    store.write(&record(true), None).unwrap();
    assert_eq!(store.read().unwrap(), Some(record(true)));

    // Different KDF parameters cannot decrypt this payload; only the
    // shared cache can answer.
    let other_params = store.clone().with_kdf_params(KdfParams::default());
    assert_eq!(other_params.read().unwrap(), Some(record(true)));
}

#[test]
fn rewritten_file_is_decrypted_again() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    store.write(&record(false), None).unwrap();
    assert_eq!(store.read().unwrap(), Some(record(false)));

    // A writer that does not share the cache.
    fast_store(dir.path()).write(&record(true), None).unwrap();
    assert_eq!(store.read().unwrap(), Some(record(true)));
}

#[test]
fn explicit_passphrase_bypasses_cache() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    store.write(&record(false), None).unwrap();
    store.read().unwrap();
    assert!(store.read_with(Some("wrong")).unwrap_err().is_corrupt());
}

#[tokio::test]
async fn blocking_runs_on_the_pool() {
    let dir = temp_dir();
    let store = fast_store(dir.path());
    let rec = record(false);
    let written = rec.clone();
    store
        .blocking(move |s| s.write(&written, None))
        .await
        .unwrap();
    assert_eq!(store.blocking(LicenseStore::read).await.unwrap(), Some(rec));
    store.blocking(LicenseStore::delete).await.unwrap();
    assert!(!store.exists());
}

fn timestamp() -> impl Strategy<Value = chrono::DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1_000_000_000)
        .prop_map(|(secs, nanos)| Utc.timestamp_opt(secs, nanos).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn tampered_ciphertext_is_corrupt(pos in 0usize..4096, bit in 0u8..8) {
        let dir = temp_dir();
        let store = fast_store(dir.path());
        store.write(&record(true), None).unwrap();
        store.read().unwrap();

        let mut wrapper = read_wrapper(&store);
        let mut raw = STANDARD.decode(&wrapper.payload).unwrap();
        let idx = pos % raw.len();
        raw[idx] ^= 1 << bit;
        wrapper.payload = STANDARD.encode(raw);
        std::fs::write(store.path(), serde_json::to_vec(&wrapper).unwrap()).unwrap();

        let err = store.read().unwrap_err();
        prop_assert!(err.is_corrupt());
    }

    #[test]
    fn any_record_round_trips(
        key in "[A-Z0-9-]{1,24}",
        domain in "[a-z]{1,12}\\.example",
        message in "\\PC{0,40}",
        valid in any::<bool>(),
        fetched_at in proptest::option::of(timestamp()),
        authority in proptest::option::of("https://[a-z]{1,12}\\.example"),
    ) {
        let dir = temp_dir();
        let store = fast_store(dir.path());
        let mut data = Map::new();
        data.insert("valid".into(), Value::Bool(valid));
        data.insert("message".into(), Value::String(message));
        let rec = LicenseRecord {
            license_key: key,
            domain,
            data: LicenseData(data),
            fetched_at,
            authority,
        };
        store.write(&rec, None).unwrap();
        prop_assert_eq!(store.read().unwrap(), Some(rec));
    }
}
