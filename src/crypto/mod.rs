// RN Audible - React Native Audible Client
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


//! Cryptography for the device credential lifecycle
//!
//! - `primitives` - capability ports (AES, PBKDF2, RSA, digests, randomness, clock)
//! - `credential_cipher` - password encryption of credential files
//! - `metadata` - obfuscation of the login fingerprint field
//! - `activation` - activation bytes value type

pub mod activation;
pub mod credential_cipher;
pub mod metadata;
pub mod primitives;

pub use activation::{format_activation_bytes, parse_activation_bytes, ActivationBytes};
pub use credential_cipher::{
    detect_file_encryption, remove_file_encryption, CipherOptions, CredentialCipher,
    EncryptedEnvelope, FileEncryption,
};
pub use metadata::{deobfuscate, obfuscate};
pub use primitives::{HashAlgorithm, Primitives};
