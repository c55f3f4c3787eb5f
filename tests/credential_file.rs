//! Credential files on disk: plaintext, dict envelope and raw bytes.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use librisync_auth::api::device::DeviceProfile;
use librisync_auth::api::identity::DeviceIdentity;
use librisync_auth::api::locale::Locale;
use librisync_auth::crypto::credential_cipher::{
    detect_file_encryption, remove_file_encryption, CipherOptions, CredentialCipher, FileEncryption,
};
use librisync_auth::crypto::ActivationBytes;

const PRIVATE_KEY: &str = include_str!("../test_fixtures/device_private_key.pem");

fn identity() -> DeviceIdentity {
    let mut cookies = BTreeMap::new();
    cookies.insert("session-id".to_string(), "139-0000000-0000000".to_string());
    cookies.insert("x-main".to_string(), "\"abc@def\"".to_string());

    DeviceIdentity::builder(Locale::de())
        .signing("{enc:fixture}{key:fixture}{iv:fixture}{name:QURQVG9rZW5FbmNyeXB0aW9uS2V5}{serial:Mg==}", PRIVATE_KEY)
        .unwrap()
        .bearer("Atna|access", Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap())
        .refresh_token("Atnr|refresh")
        .website_cookies(cookies)
        .device(DeviceProfile::with_serial("0123456789ABCDEF0123456789ABCDEF"))
        .activation_bytes(ActivationBytes::from_hex("1CEB00DA").unwrap())
        .build()
        .unwrap()
}

#[test]
fn test_plaintext_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.json");

    identity().to_file(&path, None).unwrap();
    assert_eq!(detect_file_encryption(&path).unwrap(), None);

    let loaded = DeviceIdentity::from_file(&path, None).unwrap();
    assert_eq!(loaded, identity());
    assert_eq!(loaded.activation_bytes().unwrap().to_hex(), "1CEB00DA");
}

#[test]
fn test_encrypted_file_modes() {
    let dir = tempfile::tempdir().unwrap();
    let cipher = CredentialCipher::with_password("correct horse").unwrap();

    for (name, encryption) in [("dict.json", FileEncryption::Json), ("raw.bin", FileEncryption::Bytes)] {
        let path = dir.path().join(name);
        identity().to_file(&path, Some((&cipher, encryption))).unwrap();

        assert_eq!(detect_file_encryption(&path).unwrap(), Some(encryption));
        let loaded = DeviceIdentity::from_file(&path, Some(&cipher)).unwrap();
        assert_eq!(loaded, identity());

        // encrypted files need the password
        assert!(DeviceIdentity::from_file(&path, None).is_err());
    }
}

#[test]
fn test_dict_envelope_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dict.json");
    let cipher = CredentialCipher::with_password("pw").unwrap();
    identity().to_file(&path, Some((&cipher, FileEncryption::Json))).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for field in ["salt", "iv", "ciphertext", "info"] {
        assert!(raw.get(field).is_some(), "missing {}", field);
    }
    assert!(!raw.to_string().contains("Atnr|refresh"));
}

#[test]
fn test_remove_file_encryption() {
    let dir = tempfile::tempdir().unwrap();
    let encrypted = dir.path().join("encrypted.bin");
    let decrypted = dir.path().join("decrypted.json");
    let cipher = CredentialCipher::with_password("s3cret").unwrap();
    identity().to_file(&encrypted, Some((&cipher, FileEncryption::Bytes))).unwrap();

    remove_file_encryption(&encrypted, &decrypted, "s3cret", CipherOptions::default()).unwrap();
    assert_eq!(detect_file_encryption(&decrypted).unwrap(), None);
    assert_eq!(DeviceIdentity::from_file(&decrypted, None).unwrap(), identity());

    // a plaintext source is rejected
    let again = dir.path().join("again.json");
    assert!(remove_file_encryption(&decrypted, &again, "s3cret", CipherOptions::default()).is_err());
    assert!(!again.exists());
}

#[test]
fn test_options_must_match_between_writer_and_reader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.json");
    let options = CipherOptions::default().key_size(16);
    let writer = CredentialCipher::new("pw", options.clone(), Default::default()).unwrap();
    writer.to_file("{\"hello\":\"world\"}", &path, FileEncryption::Json).unwrap();

    let reader = CredentialCipher::new("pw", options, Default::default()).unwrap();
    assert_eq!(reader.from_file(&path, None).unwrap(), "{\"hello\":\"world\"}");
}

#[test]
fn test_update_file_keeps_encryption_form() {
    let dir = tempfile::tempdir().unwrap();
    let cipher = CredentialCipher::with_password("pw").unwrap();

    let raw = dir.path().join("raw.bin");
    identity().to_file(&raw, Some((&cipher, FileEncryption::Bytes))).unwrap();
    identity().update_file(&raw, Some(&cipher)).unwrap();
    assert_eq!(detect_file_encryption(&raw).unwrap(), Some(FileEncryption::Bytes));
    assert_eq!(DeviceIdentity::from_file(&raw, Some(&cipher)).unwrap(), identity());

    let fresh = dir.path().join("fresh.json");
    identity().update_file(&fresh, Some(&cipher)).unwrap();
    assert_eq!(detect_file_encryption(&fresh).unwrap(), Some(FileEncryption::Json));
}
