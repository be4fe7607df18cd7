use hearth_crypto::{decrypt_string, derive_key, encrypt_string, CryptoError, KdfParams};

#[test]
fn wrong_passphrase_reads_as_decryption_failure() {
    let text = encrypt_string("store-secret", "{}", &KdfParams::fast()).unwrap();
    let err = decrypt_string("another-secret", &text, &KdfParams::fast()).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
    assert!(err.to_string().starts_with("decryption failed"));
}

#[test]
fn bad_cost_parameters_name_the_derivation_step() {
    let params = KdfParams {
        memory_cost: 1,
        ..KdfParams::fast()
    };
    let err = derive_key("pw", &[0; 16], &params).unwrap_err();
    assert!(err.to_string().starts_with("key derivation failed: "));
}

#[test]
fn empty_passphrase_message() {
    assert_eq!(
        CryptoError::EmptyPassphrase.to_string(),
        "passphrase must not be empty"
    );
}
