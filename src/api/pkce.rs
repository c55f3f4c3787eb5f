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

//! PKCE code verifier and challenge pair
//!
//! Reference: RFC 7636 - https://tools.ietf.org/html/rfc7636

use base64::{engine::general_purpose, Engine as _};

use crate::crypto::primitives::Primitives;
use crate::error::{AuthError, Result};

/// PKCE pair bound to a single login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// Code verifier, kept secret and sent during registration
    pub verifier: String,

    /// base64url(SHA-256(verifier)), sent in the authorization URL
    pub challenge: String,

    /// Challenge method, always "S256"
    pub method: String,
}

impl PkceChallenge {
    /// Generate a new pair from 32 random bytes
    ///
    /// The verifier is the unpadded base64url encoding of the bytes (43 chars).
    pub fn generate(primitives: &Primitives) -> Self {
        let verifier = general_purpose::URL_SAFE_NO_PAD.encode(primitives.random.bytes(32));
        Self::derive(primitives, verifier)
    }

    /// Build the pair for an existing verifier
    ///
    /// # Errors
    /// InvalidInput if the verifier is not 43-128 characters of the
    /// unreserved URL alphabet.
    pub fn from_verifier(primitives: &Primitives, verifier: &str) -> Result<Self> {
        let valid_len = (43..=128).contains(&verifier.len());
        let valid_chars = verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'));
        if !valid_len || !valid_chars {
            return Err(AuthError::invalid_input(
                "PKCE verifier must be 43-128 characters of [A-Za-z0-9-._~]",
            ));
        }
        Ok(Self::derive(primitives, verifier.to_string()))
    }

    fn derive(primitives: &Primitives, verifier: String) -> Self {
        let challenge = general_purpose::URL_SAFE_NO_PAD.encode(primitives.digest.sha256(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
            method: "S256".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_challenge() {
        let pkce = PkceChallenge::from_verifier(
            &Primitives::default(),
            "dBjftJeZ4CVP-mJ92IGvszFn3KGaPa8J3e4nLz4I0YE",
        )
        .unwrap();
        assert_eq!(pkce.challenge, "YmurmP9xG1UT4AzQYnDZbAUoqSLfi8rfYCBSoQ87IHA");
        assert_eq!(pkce.method, "S256");
    }

    #[test]
    fn test_generate_shape() {
        let primitives = Primitives::default();
        let a = PkceChallenge::generate(&primitives);
        let b = PkceChallenge::generate(&primitives);
        assert_eq!(a.verifier.len(), 43);
        assert_eq!(a.challenge.len(), 43);
        assert!(!a.verifier.contains('='));
        assert!(!a.verifier.contains('+') && !a.verifier.contains('/'));
        assert_ne!(a.verifier, b.verifier);
    }

    #[test]
    fn test_rejects_short_verifier() {
        assert!(PkceChallenge::from_verifier(&Primitives::default(), "short").is_err());
    }
}
