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


//! Activation bytes value type
//!
//! Activation bytes are the 4-byte account key stored next to the device
//! identity in the credential file (`activation_bytes`). They are written as
//! 8 hex characters, e.g. `1CEB00DA`.
//!
//! # Sources
//! - The `/license/token` blob returned by the Audible web site, see
//!   [`ActivationBytes::from_license_blob`]
//! - A value typed in by the user or read back from a credential file

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AuthError, Result};

/// Size of the activation record at the end of a `/license/token` blob
pub const ACTIVATION_BLOB_SIZE: usize = 0x238;

/// Newtype wrapper around activation bytes
///
/// Serializes as a lowercase 8-character hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationBytes([u8; 4]);

impl ActivationBytes {
    /// Create ActivationBytes from a 4-byte array
    pub fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Parse activation bytes from hex string
    ///
    /// # Errors
    /// - InvalidInput if the string is not 8 hex characters
    pub fn from_hex(hex: &str) -> Result<Self> {
        parse_activation_bytes(hex).map(Self)
    }

    /// Extract activation bytes from a device license blob
    ///
    /// The record starts `ACTIVATION_BLOB_SIZE` bytes before the end of the
    /// blob; its first four bytes are a little-endian `u32` whose hex form is
    /// the activation key.
    pub fn from_license_blob(blob: &[u8]) -> Result<Self> {
        if blob.len() < ACTIVATION_BLOB_SIZE {
            return Err(AuthError::InvalidApiResponse {
                message: format!("Unexpected activation response size: {} bytes", blob.len()),
                response_body: None,
            });
        }
        let offset = blob.len() - ACTIVATION_BLOB_SIZE;
        let value = u32::from_le_bytes([blob[offset], blob[offset + 1], blob[offset + 2], blob[offset + 3]]);
        Ok(Self(value.to_be_bytes()))
    }

    /// Format activation bytes as uppercase hex string
    pub fn to_hex(&self) -> String {
        format_activation_bytes(&self.0)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl std::fmt::Display for ActivationBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex().to_ascii_lowercase())
    }
}

impl Serialize for ActivationBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ActivationBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Parse hex string to 4-byte array
///
/// # Format Rules
/// - Must be exactly 8 characters (4 bytes)
/// - Only valid hex digits (0-9, A-F, a-f)
/// - Whitespace is trimmed
///
/// # Example
/// ```
/// use librisync_auth::crypto::activation::parse_activation_bytes;
///
/// let bytes = parse_activation_bytes("1ceb00da").unwrap();
/// assert_eq!(bytes, [0x1C, 0xEB, 0x00, 0xDA]);
/// ```
pub fn parse_activation_bytes(hex: &str) -> Result<[u8; 4]> {
    let hex = hex.trim();

    if hex.len() != 8 {
        return Err(AuthError::invalid_input(format!(
            "Expected 8 hex characters for activation bytes, got {}",
            hex.len()
        )));
    }

    let decoded = hex::decode(hex).map_err(|_| {
        AuthError::invalid_input(format!("Invalid hex characters in activation bytes '{}'", hex))
    })?;

    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&decoded);
    Ok(bytes)
}

/// Format 4-byte array as uppercase hex string
pub fn format_activation_bytes(bytes: &[u8; 4]) -> String {
    hex::encode_upper(bytes)
}
