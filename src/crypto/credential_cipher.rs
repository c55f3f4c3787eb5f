// LibriSync - Audible Library Sync for Mobile
// Copyright (C) 2025 Henning Berge
//
// This program is a Rust port of Libation (https://github.com/rmcrackan/Libation)
// Original work Copyright (C) Libation contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Password-based encryption of credential files
//!
//! # Format
//! The 16-byte packed salt doubles as a header carrying the KDF iteration count:
//!
//! ```text
//! +--------+----------------+--------+---------------------------+
//! | marker | iterations u16 | marker | random salt (fills to 16) |
//! +--------+----------------+--------+---------------------------+
//! ```
//!
//! The marker is 1-6 bytes (default `$`), the iteration count is big-endian.
//! The AES key is PBKDF2(password, packed salt, iterations). A random 16-byte
//! IV is used with AES-CBC and PKCS#7 padding.
//!
//! # Serializations
//! - **dict**: `{"salt", "iv", "ciphertext", "info"}` with base64 values
//! - **bytes**: `salt(16) || iv(16) || ciphertext`
//!
//! Salts written without the marker (older files) decrypt with the
//! configured default iteration count.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::primitives::{HashAlgorithm, Primitives};
use crate::error::{AuthError, Result};

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 1000;

/// Largest iteration count the 2-byte header field can hold
pub const MAX_ITERATIONS: u32 = 65535;

/// Size of the packed salt and of the IV
pub const BLOCK_SIZE: usize = 16;

/// `info` tag written into dict envelopes
pub const ENVELOPE_INFO: &str = "base64-encoded AES-CBC-256 of JSON object";

// ============================================================================
// Options
// ============================================================================

/// Tunables for the credential cipher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherOptions {
    /// AES key size in bytes (16, 24 or 32)
    pub key_size: usize,
    /// Bytes wrapping the iteration count in the packed salt (1-6 bytes)
    pub salt_marker: Vec<u8>,
    /// PBKDF2 iterations for new files and for legacy salts without a header
    pub kdf_iterations: u32,
    /// PBKDF2 PRF
    pub hash: HashAlgorithm,
}

impl Default for CipherOptions {
    fn default() -> Self {
        Self {
            key_size: 32,
            salt_marker: b"$".to_vec(),
            kdf_iterations: DEFAULT_ITERATIONS,
            hash: HashAlgorithm::Sha256,
        }
    }
}

impl CipherOptions {
    pub fn key_size(mut self, key_size: usize) -> Self {
        self.key_size = key_size;
        self
    }

    pub fn salt_marker(mut self, marker: impl Into<Vec<u8>>) -> Self {
        self.salt_marker = marker.into();
        self
    }

    pub fn kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    pub fn hash(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    /// Check every field against the format limits
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.key_size, 16 | 24 | 32) {
            return Err(AuthError::invalid_input(format!(
                "Key size must be 16, 24 or 32 bytes, got {}",
                self.key_size
            )));
        }
        if self.salt_marker.is_empty() || self.salt_marker.len() > 6 {
            return Err(AuthError::invalid_input(format!(
                "Salt marker must be 1-6 bytes, got {}",
                self.salt_marker.len()
            )));
        }
        if self.kdf_iterations == 0 || self.kdf_iterations > MAX_ITERATIONS {
            return Err(AuthError::invalid_input(format!(
                "KDF iterations must be between 1 and {}, got {}",
                MAX_ITERATIONS, self.kdf_iterations
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Envelope types
// ============================================================================

/// Dict form of an encrypted credential file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub salt: String,
    pub iv: String,
    pub ciphertext: String,
    #[serde(default = "default_info")]
    pub info: String,
}

fn default_info() -> String {
    ENVELOPE_INFO.to_string()
}

/// On-disk encryption flavour of a credential file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEncryption {
    /// Pretty-printed JSON dict envelope
    Json,
    /// Raw `salt || iv || ciphertext`
    Bytes,
}

impl std::str::FromStr for FileEncryption {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "bytes" => Ok(Self::Bytes),
            other => Err(AuthError::invalid_input(format!(
                "Unknown file encryption '{}', expected 'json' or 'bytes'",
                other
            ))),
        }
    }
}

/// Raw output of one encryption
struct Sealed {
    salt: Vec<u8>,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
}

// ============================================================================
// Cipher
// ============================================================================

/// Encrypts and decrypts credential payloads under a password
pub struct CredentialCipher {
    password: Zeroizing<String>,
    options: CipherOptions,
    primitives: Primitives,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Create a cipher with explicit options and primitives
    pub fn new(password: impl Into<String>, options: CipherOptions, primitives: Primitives) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            password: Zeroizing::new(password.into()),
            options,
            primitives,
        })
    }

    /// Create a cipher with default options and backends
    pub fn with_password(password: impl Into<String>) -> Result<Self> {
        Self::new(password, CipherOptions::default(), Primitives::default())
    }

    pub fn options(&self) -> &CipherOptions {
        &self.options
    }

    /// Header bytes followed by random salt, exactly one AES block
    fn pack_salt(&self) -> Vec<u8> {
        let marker = &self.options.salt_marker;
        let mut salt = Vec::with_capacity(BLOCK_SIZE);
        salt.extend_from_slice(marker);
        salt.extend_from_slice(&(self.options.kdf_iterations as u16).to_be_bytes());
        salt.extend_from_slice(marker);
        let fill = BLOCK_SIZE - salt.len();
        salt.extend(self.primitives.random.bytes(fill));
        salt
    }

    fn header_len(&self) -> usize {
        self.options.salt_marker.len() * 2 + 2
    }

    /// KDF salt and iteration count of a stored salt
    ///
    /// A packed salt yields the random tail and its embedded count. A legacy
    /// salt is used whole with the configured count.
    fn unpack_salt<'s>(&self, salt: &'s [u8]) -> (&'s [u8], u32) {
        let marker = self.options.salt_marker.as_slice();
        let header_len = self.header_len();
        if salt.len() >= header_len
            && salt.starts_with(marker)
            && &salt[marker.len() + 2..header_len] == marker
        {
            let at = marker.len();
            let iterations = u16::from_be_bytes([salt[at], salt[at + 1]]) as u32;
            (&salt[header_len..], iterations)
        } else {
            tracing::debug!("salt has no iteration header, using default iteration count");
            (salt, self.options.kdf_iterations)
        }
    }

    fn derive_key(&self, salt: &[u8], iterations: u32) -> Result<Zeroizing<Vec<u8>>> {
        self.primitives
            .kdf
            .pbkdf2(
                self.password.as_bytes(),
                salt,
                iterations,
                self.options.key_size,
                self.options.hash,
            )
            .map(Zeroizing::new)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Sealed> {
        let salt = self.pack_salt();
        let iv = self.primitives.random.bytes(BLOCK_SIZE);
        let key = self.derive_key(&salt[self.header_len()..], self.options.kdf_iterations)?;
        let ciphertext = self.primitives.aes.encrypt(&key, &iv, plaintext)?;
        Ok(Sealed { salt, iv, ciphertext })
    }

    fn open(&self, salt: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<String> {
        if iv.len() != BLOCK_SIZE {
            return Err(AuthError::crypto(format!("IV must be {} bytes, got {}", BLOCK_SIZE, iv.len())));
        }
        let (kdf_salt, iterations) = self.unpack_salt(salt);
        let key = self.derive_key(kdf_salt, iterations)?;
        let plaintext = self.primitives.aes.decrypt(&key, iv, ciphertext)?;
        Ok(String::from_utf8(plaintext)?)
    }

    /// Encrypt into the dict form
    pub fn to_dict(&self, plaintext: &str) -> Result<EncryptedEnvelope> {
        let sealed = self.seal(plaintext.as_bytes())?;
        Ok(EncryptedEnvelope {
            salt: general_purpose::STANDARD.encode(&sealed.salt),
            iv: general_purpose::STANDARD.encode(&sealed.iv),
            ciphertext: general_purpose::STANDARD.encode(&sealed.ciphertext),
            info: ENVELOPE_INFO.to_string(),
        })
    }

    /// Decrypt the dict form
    pub fn from_dict(&self, envelope: &EncryptedEnvelope) -> Result<String> {
        let salt = general_purpose::STANDARD.decode(&envelope.salt)?;
        let iv = general_purpose::STANDARD.decode(&envelope.iv)?;
        let ciphertext = general_purpose::STANDARD.decode(&envelope.ciphertext)?;
        self.open(&salt, &iv, &ciphertext)
    }

    /// Encrypt into the bytes form
    pub fn to_bytes(&self, plaintext: &str) -> Result<Vec<u8>> {
        let sealed = self.seal(plaintext.as_bytes())?;
        let mut out = Vec::with_capacity(BLOCK_SIZE * 2 + sealed.ciphertext.len());
        out.extend_from_slice(&sealed.salt);
        out.extend_from_slice(&sealed.iv);
        out.extend_from_slice(&sealed.ciphertext);
        Ok(out)
    }

    /// Decrypt the bytes form
    pub fn from_bytes(&self, data: &[u8]) -> Result<String> {
        if data.len() < BLOCK_SIZE * 3 {
            return Err(AuthError::crypto(format!(
                "Encrypted payload too short: {} bytes",
                data.len()
            )));
        }
        let (salt, rest) = data.split_at(BLOCK_SIZE);
        let (iv, ciphertext) = rest.split_at(BLOCK_SIZE);
        self.open(salt, iv, ciphertext)
    }

    /// Encrypt `plaintext` and write it to `path`
    pub fn to_file(&self, plaintext: &str, path: impl AsRef<Path>, encryption: FileEncryption) -> Result<()> {
        let path = path.as_ref();
        match encryption {
            FileEncryption::Json => {
                let envelope = self.to_dict(plaintext)?;
                fs::write(path, serde_json::to_string_pretty(&envelope)?)?;
            }
            FileEncryption::Bytes => fs::write(path, self.to_bytes(plaintext)?)?,
        }
        tracing::debug!(path = %path.display(), ?encryption, "wrote encrypted credential file");
        Ok(())
    }

    /// Read and decrypt `path`
    ///
    /// With `encryption = None` the flavour is detected from the content.
    pub fn from_file(&self, path: impl AsRef<Path>, encryption: Option<FileEncryption>) -> Result<String> {
        let path = path.as_ref();
        let encryption = match encryption {
            Some(e) => e,
            None => detect_file_encryption(path)?.ok_or_else(|| {
                AuthError::invalid_input(format!("{} is not encrypted", path.display()))
            })?,
        };
        let data = fs::read(path)?;
        match encryption {
            FileEncryption::Json => {
                let envelope: EncryptedEnvelope = serde_json::from_slice(&data)?;
                self.from_dict(&envelope)
            }
            FileEncryption::Bytes => self.from_bytes(&data),
        }
    }
}

// ============================================================================
// File helpers
// ============================================================================

/// Detect how a credential file is stored
///
/// Returns `Some(Json)` for a dict envelope, `Some(Bytes)` for content that
/// is not JSON at all, and `None` for a plaintext credential file.
pub fn detect_file_encryption(path: impl AsRef<Path>) -> Result<Option<FileEncryption>> {
    let data = fs::read(path.as_ref())?;
    let Ok(text) = std::str::from_utf8(&data) else {
        return Ok(Some(FileEncryption::Bytes));
    };
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => {
            if map.contains_key("ciphertext") {
                Ok(Some(FileEncryption::Json))
            } else {
                Ok(None)
            }
        }
        Ok(_) => Ok(None),
        Err(_) => Ok(Some(FileEncryption::Bytes)),
    }
}

/// Decrypt `source` and write the plaintext JSON to `target`
pub fn remove_file_encryption(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
    password: &str,
    options: CipherOptions,
) -> Result<()> {
    let source = source.as_ref();
    let encryption = detect_file_encryption(source)?
        .ok_or_else(|| AuthError::invalid_input(format!("{} is not encrypted", source.display())))?;

    let cipher = CredentialCipher::new(password, options, Primitives::default())?;
    let plaintext = cipher.from_file(source, Some(encryption))?;

    let output = match serde_json::from_str::<serde_json::Value>(&plaintext) {
        Ok(value) => serde_json::to_string_pretty(&value)?,
        Err(_) => plaintext,
    };
    fs::write(target.as_ref(), output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::primitives::RandomSource;
    use std::sync::{Arc, Mutex};

    /// Hands out a fixed byte script, then zeros
    struct ScriptedRandom(Mutex<Vec<u8>>);

    impl ScriptedRandom {
        fn new(script: Vec<u8>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(script)))
        }
    }

    impl RandomSource for ScriptedRandom {
        fn fill(&self, buf: &mut [u8]) {
            let mut script = self.0.lock().unwrap();
            for b in buf.iter_mut() {
                *b = if script.is_empty() { 0 } else { script.remove(0) };
            }
        }
    }

    fn fixed_cipher() -> CredentialCipher {
        let mut script: Vec<u8> = (0u8..12).collect();
        script.extend(0x10u8..0x20);
        let primitives = Primitives::default().with_random(ScriptedRandom::new(script));
        CredentialCipher::new("pw", CipherOptions::default(), primitives).unwrap()
    }

    #[test]
    fn test_bytes_form_known_answer() {
        let out = fixed_cipher().to_bytes("hello").unwrap();
        assert_eq!(
            general_purpose::STANDARD.encode(&out),
            "JAPoJAABAgMEBQYHCAkKCxAREhMUFRYXGBkaGxwdHh/HepPlMUlLvcUMtbMxwcBk"
        );
    }

    #[test]
    fn test_dict_form_known_answer() {
        let env = fixed_cipher().to_dict("hello").unwrap();
        assert_eq!(env.salt, "JAPoJAABAgMEBQYHCAkKCw==");
        assert_eq!(env.iv, "EBESExQVFhcYGRobHB0eHw==");
        assert_eq!(env.ciphertext, "x3qT5TFJS73FDLWzMcHAZA==");
        assert_eq!(env.info, ENVELOPE_INFO);
    }

    #[test]
    fn test_packed_salt_layout() {
        let cipher = CredentialCipher::with_password("pw").unwrap();
        let out = cipher.to_bytes("hello").unwrap();
        let salt = &out[..16];
        assert_eq!(salt[0], b'$');
        assert_eq!(u16::from_be_bytes([salt[1], salt[2]]), 1000);
        assert_eq!(salt[3], b'$');
        assert_eq!(cipher.from_bytes(&out).unwrap(), "hello");
    }

    #[test]
    fn test_decrypts_packed_layout_with_stripped_kdf_salt() {
        // "$" 2000 "$" + "0123456789ab", key = PBKDF2("pw", "0123456789ab", 2000)
        let data = general_purpose::STANDARD
            .decode("JAfQJDAxMjM0NTY3ODlhYmZlZGNiYTk4NzY1NDMyMTCQYP3TjKQTGk0voJ+TCLrpe3N4LHy0SMF0Casoz6lZcw==")
            .unwrap();
        let cipher = CredentialCipher::with_password("pw").unwrap();
        assert_eq!(cipher.from_bytes(&data).unwrap(), r#"{"adp_token":"x"}"#);

        let envelope = EncryptedEnvelope {
            salt: general_purpose::STANDARD.encode(&data[..16]),
            iv: general_purpose::STANDARD.encode(&data[16..32]),
            ciphertext: general_purpose::STANDARD.encode(&data[32..]),
            info: ENVELOPE_INFO.to_string(),
        };
        assert_eq!(cipher.from_dict(&envelope).unwrap(), r#"{"adp_token":"x"}"#);
    }

    #[test]
    fn test_legacy_salt_uses_default_iterations() {
        let cipher = CredentialCipher::with_password("pw").unwrap();
        let data = general_purpose::STANDARD
            .decode("ZGVmZ2hpamtsbW5vcHFycxAREhMUFRYXGBkaGxwdHh/z4fePJ/I0KScWREhdg3Xh")
            .unwrap();
        assert_eq!(cipher.from_bytes(&data).unwrap(), "hello");
    }

    #[test]
    fn test_round_trip_key_sizes_and_markers() {
        let message = r#"{"adp_token":"{enc:x}","expires":1700000000.0}"#;
        for key_size in [16usize, 24, 32] {
            for marker_len in 1..=6usize {
                let marker: Vec<u8> = (0..marker_len).map(|i| b'#' + i as u8).collect();
                let options = CipherOptions::default()
                    .key_size(key_size)
                    .salt_marker(marker)
                    .kdf_iterations(10);
                let cipher = CredentialCipher::new("correct horse", options, Primitives::default()).unwrap();

                let env = cipher.to_dict(message).unwrap();
                assert_eq!(cipher.from_dict(&env).unwrap(), message);

                let raw = cipher.to_bytes(message).unwrap();
                assert_eq!(cipher.from_bytes(&raw).unwrap(), message);
            }
        }
    }

    #[test]
    fn test_iterations_are_read_from_header() {
        let writer = CredentialCipher::new(
            "pw",
            CipherOptions::default().kdf_iterations(2048),
            Primitives::default(),
        )
        .unwrap();
        let raw = writer.to_bytes("payload").unwrap();

        // A reader configured with another default still follows the header.
        let reader = CredentialCipher::with_password("pw").unwrap();
        assert_eq!(reader.from_bytes(&raw).unwrap(), "payload");
    }

    #[test]
    fn test_options_validation() {
        assert!(CipherOptions::default().kdf_iterations(65536).validate().is_err());
        assert!(CipherOptions::default().kdf_iterations(65535).validate().is_ok());
        assert!(CipherOptions::default().salt_marker(Vec::new()).validate().is_err());
        assert!(CipherOptions::default().salt_marker(b"1234567".to_vec()).validate().is_err());
        assert!(CipherOptions::default().key_size(20).validate().is_err());
    }

    #[test]
    fn test_wrong_password_fails() {
        let raw = CredentialCipher::with_password("right").unwrap().to_bytes("secret data").unwrap();
        let wrong = CredentialCipher::with_password("wrong").unwrap();
        match wrong.from_bytes(&raw) {
            Err(e) => assert!(e.is_crypto_error()),
            Ok(text) => assert_ne!(text, "secret data"),
        }
    }

    #[test]
    fn test_short_payload_is_rejected() {
        let cipher = CredentialCipher::with_password("pw").unwrap();
        assert!(cipher.from_bytes(&[0u8; 40]).unwrap_err().is_crypto_error());
    }
}
