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

//! Activation bytes retrieval
//!
//! The Audible web site hands out a device license blob for a registered
//! player. The activation bytes sit at a fixed distance from its end, see
//! [`ActivationBytes::from_license_blob`].

use url::Url;

use crate::api::http::HttpRequest;
use crate::api::locale::Locale;
use crate::api::signing::Authenticator;
use crate::crypto::activation::ActivationBytes;
use crate::error::Result;

/// License endpoint for `locale`
pub fn license_token_url(locale: &Locale) -> Result<Url> {
    Ok(Url::parse(&format!(
        "https://www.{}/license/token?action=register&player_manuf=Audible,iPhone&player_model=iPhone",
        locale.audible_domain()
    ))?)
}

/// Fetch the activation bytes of the authenticated account
///
/// Does not store them; call [`Authenticator::set_activation_bytes`] to keep
/// them with the identity.
pub async fn fetch_activation_bytes(authenticator: &Authenticator, locale: &Locale) -> Result<ActivationBytes> {
    let request = authenticator
        .authenticate(HttpRequest::get(license_token_url(locale)?))
        .await?;
    let response = authenticator
        .session()
        .execute(request)
        .await?
        .error_for_status("/license/token")?;

    let bytes = ActivationBytes::from_license_blob(&response.body)?;
    tracing::info!(locale = %locale.country_code, "activation bytes retrieved");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http::{HttpResponse, HttpSession};
    use crate::api::identity::DeviceIdentity;
    use crate::crypto::activation::ACTIVATION_BLOB_SIZE;
    use crate::error::AuthError;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::{Arc, Mutex};

    struct LicenseServer {
        status: u16,
        blob: Vec<u8>,
        seen: Mutex<Option<HttpRequest>>,
    }

    #[async_trait]
    impl HttpSession for LicenseServer {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            let url = request.url.clone();
            *self.seen.lock().unwrap() = Some(request);
            Ok(HttpResponse {
                status: self.status,
                url,
                history: Vec::new(),
                body: self.blob.clone(),
            })
        }

        fn set_cookie(&self, _domain: &str, _name: &str, _value: &str) {}
    }

    fn blob() -> Vec<u8> {
        let mut blob = vec![0u8; 100];
        blob.extend_from_slice(&0x1CEB00DAu32.to_le_bytes());
        blob.resize(100 + ACTIVATION_BLOB_SIZE, 0xAA);
        blob
    }

    fn authenticator(server: Arc<LicenseServer>) -> Authenticator {
        let identity = DeviceIdentity::builder(Locale::de())
            .bearer("Atna|tok", Utc::now() + Duration::hours(1))
            .build()
            .unwrap();
        Authenticator::new(server, identity)
    }

    #[test]
    fn test_license_url() {
        let url = license_token_url(&Locale::uk()).unwrap();
        assert_eq!(url.host_str(), Some("www.audible.co.uk"));
        assert_eq!(url.path(), "/license/token");
        assert!(url.query().unwrap().contains("player_manuf=Audible,iPhone"));
    }

    #[tokio::test]
    async fn test_fetch_activation_bytes() {
        let server = Arc::new(LicenseServer {
            status: 200,
            blob: blob(),
            seen: Mutex::new(None),
        });
        let auth = authenticator(server.clone());
        let bytes = fetch_activation_bytes(&auth, &Locale::de()).await.unwrap();
        assert_eq!(bytes.to_hex(), "1CEB00DA");

        let seen = server.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.header_value("authorization"), Some("Bearer Atna|tok"));
        assert_eq!(seen.url.host_str(), Some("www.audible.de"));
    }

    #[tokio::test]
    async fn test_fetch_activation_bytes_errors() {
        let server = Arc::new(LicenseServer {
            status: 403,
            blob: b"forbidden".to_vec(),
            seen: Mutex::new(None),
        });
        let err = fetch_activation_bytes(&authenticator(server), &Locale::de()).await.unwrap_err();
        assert!(matches!(err, AuthError::Remote { status: 403, .. }));

        let server = Arc::new(LicenseServer {
            status: 200,
            blob: vec![0u8; 16],
            seen: Mutex::new(None),
        });
        let err = fetch_activation_bytes(&authenticator(server), &Locale::de()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidApiResponse { .. }));
    }
}
