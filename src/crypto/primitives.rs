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

//! Cryptographic capability ports
//!
//! The credential cipher, the login flow and the request signer never call a
//! crypto crate directly. They receive a [`Primitives`] bundle at construction
//! time and go through these traits, so tests can swap in fixed clocks and
//! deterministic random sources.
//!
//! # Default backends
//! - AES-CBC: `aes` + `cbc` with PKCS#7 padding
//! - PBKDF2: `ring::pbkdf2`
//! - RSA PKCS#1 v1.5 / SHA-256: `rsa` + `sha2`
//! - SHA-256: `sha2`, SHA-1: `ring::digest`
//! - Random: `rand::rngs::OsRng`
//! - Clock: `chrono::Utc::now`

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;

use crate::error::{AuthError, Result};

// ============================================================================
// Port traits
// ============================================================================

/// AES in CBC mode with PKCS#7 padding
///
/// Key length selects the variant: 16 → AES-128, 24 → AES-192, 32 → AES-256.
pub trait AesCbc: Send + Sync {
    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Hash function used as the PBKDF2 PRF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Parse a hash name as written in config files ("sha256", "SHA-256", ...)
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            other => Err(AuthError::invalid_input(format!("Unsupported hash algorithm: {}", other))),
        }
    }

    fn ring_algorithm(self) -> ring::pbkdf2::Algorithm {
        match self {
            Self::Sha1 => ring::pbkdf2::PBKDF2_HMAC_SHA1,
            Self::Sha256 => ring::pbkdf2::PBKDF2_HMAC_SHA256,
            Self::Sha384 => ring::pbkdf2::PBKDF2_HMAC_SHA384,
            Self::Sha512 => ring::pbkdf2::PBKDF2_HMAC_SHA512,
        }
    }
}

/// Password-based key derivation
pub trait KeyDerivation: Send + Sync {
    fn pbkdf2(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        key_size: usize,
        hash: HashAlgorithm,
    ) -> Result<Vec<u8>>;
}

/// A parsed RSA private key able to produce PKCS#1 v1.5 signatures
pub trait PrivateKey: Send + Sync {
    /// Sign `data` (hashed internally with SHA-256)
    fn sign_sha256(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Loads RSA private keys from PEM text
pub trait RsaSigner: Send + Sync {
    fn load_private_key(&self, pem: &str) -> Result<Arc<dyn PrivateKey>>;
}

/// Message digests
pub trait Digest: Send + Sync {
    fn sha256(&self, data: &[u8]) -> [u8; 32];
    fn sha1(&self, data: &[u8]) -> [u8; 20];
}

/// Source of random bytes
pub trait RandomSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);

    fn bytes(&self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf);
        buf
    }
}

/// Wall clock
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// ============================================================================
// Default implementations
// ============================================================================

/// `aes` + `cbc` backend
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoAes;

macro_rules! cbc_encrypt {
    ($cipher:ty, $key:expr, $iv:expr, $data:expr) => {
        cbc::Encryptor::<$cipher>::new_from_slices($key, $iv)
            .map_err(|e| AuthError::crypto(format!("Invalid AES key/IV length: {}", e)))?
            .encrypt_padded_vec_mut::<Pkcs7>($data)
    };
}

macro_rules! cbc_decrypt {
    ($cipher:ty, $key:expr, $iv:expr, $data:expr) => {
        cbc::Decryptor::<$cipher>::new_from_slices($key, $iv)
            .map_err(|e| AuthError::crypto(format!("Invalid AES key/IV length: {}", e)))?
            .decrypt_padded_vec_mut::<Pkcs7>($data)
            .map_err(|_| AuthError::crypto("Invalid padding after AES-CBC decryption"))?
    };
}

impl AesCbc for RustCryptoAes {
    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(match key.len() {
            16 => cbc_encrypt!(aes::Aes128, key, iv, plaintext),
            24 => cbc_encrypt!(aes::Aes192, key, iv, plaintext),
            32 => cbc_encrypt!(aes::Aes256, key, iv, plaintext),
            n => return Err(AuthError::crypto(format!("Unsupported AES key size: {} bytes", n))),
        })
    }

    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(AuthError::crypto(format!(
                "Ciphertext length {} is not a positive multiple of the AES block size",
                ciphertext.len()
            )));
        }
        Ok(match key.len() {
            16 => cbc_decrypt!(aes::Aes128, key, iv, ciphertext),
            24 => cbc_decrypt!(aes::Aes192, key, iv, ciphertext),
            32 => cbc_decrypt!(aes::Aes256, key, iv, ciphertext),
            n => return Err(AuthError::crypto(format!("Unsupported AES key size: {} bytes", n))),
        })
    }
}

/// `ring::pbkdf2` backend
#[derive(Debug, Default, Clone, Copy)]
pub struct RingPbkdf2;

impl KeyDerivation for RingPbkdf2 {
    fn pbkdf2(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        key_size: usize,
        hash: HashAlgorithm,
    ) -> Result<Vec<u8>> {
        let iterations = NonZeroU32::new(iterations)
            .ok_or_else(|| AuthError::invalid_input("PBKDF2 iterations must be non-zero"))?;
        let mut key = vec![0u8; key_size];
        ring::pbkdf2::derive(hash.ring_algorithm(), iterations, salt, password, &mut key);
        Ok(key)
    }
}

/// RSA private key backed by the `rsa` crate
struct RustCryptoPrivateKey {
    signing_key: SigningKey<Sha256>,
}

impl PrivateKey for RustCryptoPrivateKey {
    fn sign_sha256(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .signing_key
            .try_sign(data)
            .map_err(|e| AuthError::crypto(format!("RSA signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }
}

/// `rsa` crate backend
///
/// Accepts PKCS#1 (`BEGIN RSA PRIVATE KEY`) first, PKCS#8 (`BEGIN PRIVATE KEY`) second.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoRsa;

impl RsaSigner for RustCryptoRsa {
    fn load_private_key(&self, pem: &str) -> Result<Arc<dyn PrivateKey>> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| AuthError::crypto(format!("Invalid RSA private key: {}", e)))?;
        Ok(Arc::new(RustCryptoPrivateKey {
            signing_key: SigningKey::<Sha256>::new(key),
        }))
    }
}

/// `sha2` / `ring::digest` backend
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDigest;

impl Digest for DefaultDigest {
    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        use sha2::Digest as _;
        Sha256::digest(data).into()
    }

    fn sha1(&self, data: &[u8]) -> [u8; 20] {
        let digest = ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, data);
        let mut out = [0u8; 20];
        out.copy_from_slice(digest.as_ref());
        out
    }
}

/// Operating-system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(buf);
    }
}

/// System UTC clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// The set of primitive implementations handed to every component
///
/// Cloning is cheap (all members are `Arc`s). Use [`Primitives::default`]
/// for the production backends and the `with_*` methods to replace single
/// capabilities.
#[derive(Clone)]
pub struct Primitives {
    pub aes: Arc<dyn AesCbc>,
    pub kdf: Arc<dyn KeyDerivation>,
    pub rsa: Arc<dyn RsaSigner>,
    pub digest: Arc<dyn Digest>,
    pub random: Arc<dyn RandomSource>,
    pub clock: Arc<dyn Clock>,
}

impl Default for Primitives {
    fn default() -> Self {
        Self {
            aes: Arc::new(RustCryptoAes),
            kdf: Arc::new(RingPbkdf2),
            rsa: Arc::new(RustCryptoRsa),
            digest: Arc::new(DefaultDigest),
            random: Arc::new(OsRandom),
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for Primitives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitives").finish_non_exhaustive()
    }
}

impl Primitives {
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rsa(mut self, rsa: Arc<dyn RsaSigner>) -> Self {
        self.rsa = rsa;
        self
    }
}
