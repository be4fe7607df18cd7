//! Shared helpers for host tests.

#![allow(dead_code)]

use hearth_crypto::KdfParams;
use hearth_license::{
    canonical_json, parse_private_key, AuthorityClient, LicenseClientConfig, LicenseManager,
    LicenseStore, LicenseVerifier,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const AUTHORITY_PRIVATE_PEM: &str =
    include_str!("../../../hearth-license/tests/fixtures/authority_private.pem");
pub const AUTHORITY_PUBLIC_PEM: &str =
    include_str!("../../../hearth-license/tests/fixtures/authority_public.pem");
pub const IMPOSTOR_PRIVATE_PEM: &str =
    include_str!("../../../hearth-license/tests/fixtures/impostor_private.pem");

pub const PASSPHRASE: &str = "host-test-key";

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

/// A manager whose store uses cheap key derivation.
pub fn fast_manager(dir: &Path, authority_url: &str) -> Arc<LicenseManager> {
    let config = test_config(dir, authority_url);
    let store = LicenseStore::new(config.license_path(), config.passphrase.clone())
        .with_kdf_params(KdfParams::fast());
    let verifier = LicenseVerifier::new(AuthorityClient::new(&config).unwrap(), store);
    Arc::new(LicenseManager::new(verifier, "client.example"))
}

/// `{data, signature}` signed with the PEM's key.
pub fn signed_response(private_pem: &str, data: Value) -> Value {
    let key = parse_private_key(private_pem).unwrap();
    let message = canonical_json(&data).unwrap();
    json!({ "data": data, "signature": key.sign_base64(&message).unwrap() })
}

/// A mock authority answering verify with `data` signed by `private_pem`.
pub async fn mock_authority(private_pem: &str, data: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(signed_response(private_pem, data)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/keys/pem"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AUTHORITY_PUBLIC_PEM))
        .mount(&server)
        .await;
    server
}

/// Serves `app` on an OS-assigned port, returning the base URL.
pub async fn spawn(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}
