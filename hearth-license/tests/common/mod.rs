//! Shared test helpers for license tests.

#![allow(dead_code)]

use hearth_crypto::KdfParams;
use hearth_license::{
    canonical_json, parse_private_key, LicenseClientConfig, LicenseStore, PrivateKeyHandle,
};
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

pub const AUTHORITY_PRIVATE_PEM: &str = include_str!("../fixtures/authority_private.pem");
pub const AUTHORITY_PRIVATE_PKCS1_PEM: &str = include_str!("../fixtures/authority_private_pkcs1.pem");
pub const AUTHORITY_PUBLIC_PEM: &str = include_str!("../fixtures/authority_public.pem");
pub const IMPOSTOR_PRIVATE_PEM: &str = include_str!("../fixtures/impostor_private.pem");
pub const IMPOSTOR_PUBLIC_PEM: &str = include_str!("../fixtures/impostor_public.pem");
pub const EC_PUBLIC_PEM: &str = include_str!("../fixtures/ec_public.pem");
pub const EC_PRIVATE_PEM: &str = include_str!("../fixtures/ec_private.pem");
pub const CANONICAL_VECTOR: &str = include_str!("../fixtures/canonical_vector.json");
pub const CANONICAL_VECTOR_SIG: &str = include_str!("../fixtures/canonical_vector.sig");

pub const PASSPHRASE: &str = "test-app-key";

/// The authority's private key.
pub fn authority_key() -> PrivateKeyHandle {
    parse_private_key(AUTHORITY_PRIVATE_PEM).unwrap()
}

/// A different RSA key.
pub fn impostor_key() -> PrivateKeyHandle {
    parse_private_key(IMPOSTOR_PRIVATE_PEM).unwrap()
}

/// A store in `dir` with cheap key derivation.
pub fn fast_store(dir: &Path) -> LicenseStore {
    LicenseStore::new(dir.join("license.json"), Some(PASSPHRASE.to_string()))
        .with_kdf_params(KdfParams::fast())
}

/// Configuration pointing at `authority_url`, storing under `dir`.
pub fn test_config(dir: &Path, authority_url: &str) -> LicenseClientConfig {
    LicenseClientConfig {
        authority_url: authority_url.to_string(),
        app_url: "https://client.example".to_string(),
        storage_dir: dir.to_path_buf(),
        passphrase: Some(PASSPHRASE.to_string()),
        remote_timeout_secs: 2,
        alert_timeout_secs: 1,
        ..LicenseClientConfig::default()
    }
}

/// A fresh temporary directory.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// `{data, signature}` as the authority would answer, signed by `key`.
pub fn signed_response(key: &PrivateKeyHandle, data: Value) -> Value {
    let message = canonical_json(&data).unwrap();
    json!({
        "data": data,
        "signature": key.sign_base64(&message).unwrap(),
    })
}

/// A JWKS document publishing the given keys.
pub fn jwks_for(keys: &[&PrivateKeyHandle]) -> Value {
    let entries: Vec<Value> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let id = key.identity();
            json!({ "kty": "RSA", "kid": format!("k{i}"), "use": "sig", "n": id.n, "e": id.e })
        })
        .collect();
    json!({ "keys": entries })
}

/// Writes a key file under `dir/keys/`.
pub fn install_key_file(dir: &Path, name: &str, pem: &str) {
    let keys = dir.join("keys");
    std::fs::create_dir_all(&keys).unwrap();
    std::fs::write(keys.join(name), pem).unwrap();
}
