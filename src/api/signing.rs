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

//! Request authentication
//!
//! # Strategies
//! An identity authenticates requests with the first capability it has:
//!
//! 1. **Signing** (ADP token + RSA key): `x-adp-token`, `x-adp-alg` and
//!    `x-adp-signature` headers over the canonical string
//!    `"{METHOD}\n{PATH_AND_QUERY}\n{TIMESTAMP}\n{BODY}\n{ADP_TOKEN}"`
//! 2. **Bearer**: `Authorization: Bearer ...` and `client-id: 0`, refreshing
//!    the access token first when it has expired
//! 3. **Cookies**: the website cookie jar as a `Cookie` header
//!
//! Signatures are never cached; the timestamp is part of the signed data.
//!
//! # Concurrency
//! [`Authenticator`] hands out `Arc` snapshots of the identity. Replacing the
//! identity swaps the `Arc` under a write lock, so readers never observe a
//! half-updated token. Refreshes are single-flight: a task that sees an
//! expired token waits on the refresh gate, then re-reads the identity and
//! only calls the server if nobody refreshed it in the meantime.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::api::http::{HttpRequest, HttpSession};
use crate::api::identity::{AuthCapability, DeviceIdentity};
use crate::api::registration;
use crate::crypto::activation::ActivationBytes;
use crate::crypto::primitives::{PrivateKey, Primitives};
use crate::error::{AuthError, Result};

/// Value of the `x-adp-alg` header
pub const ADP_ALGORITHM: &str = "SHA256withRSA:1.0";

// ============================================================================
// Headers
// ============================================================================

/// Authentication headers for one request, in emission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthHeaders(Vec<(String, String)>);

impl AuthHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Value of `name` (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add every header to `request`
    pub fn apply(self, request: HttpRequest) -> HttpRequest {
        self.0
            .into_iter()
            .fold(request, |request, (name, value)| request.header(name, value))
    }
}

// ============================================================================
// Signing
// ============================================================================

/// Timestamp format embedded in signatures: `2025-03-01T12:00:00.000000Z`
pub fn signing_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// The string that gets signed
///
/// The body line is present but empty when there is no body.
pub fn canonical_string(method: &str, path_and_query: &str, timestamp: &str, body: &str, adp_token: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        path_and_query,
        timestamp,
        body,
        adp_token
    )
}

/// Path plus query of `url`, as it appears in the canonical string
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Sign a request with an already parsed key
pub fn sign_with_key(
    key: &dyn PrivateKey,
    method: &str,
    path_and_query: &str,
    body: Option<&[u8]>,
    adp_token: &str,
    now: DateTime<Utc>,
) -> Result<AuthHeaders> {
    let timestamp = signing_timestamp(now);
    let body = body.map(String::from_utf8_lossy).unwrap_or_default();
    let data = canonical_string(method, path_and_query, &timestamp, &body, adp_token);
    let signature = general_purpose::STANDARD.encode(key.sign_sha256(data.as_bytes())?);

    let mut headers = AuthHeaders::new();
    headers.insert("x-adp-token", adp_token);
    headers.insert("x-adp-alg", ADP_ALGORITHM);
    headers.insert("x-adp-signature", format!("{}:{}", signature, timestamp));
    Ok(headers)
}

/// Sign a request with a PEM private key
///
/// Parses the key on every call; [`Authenticator`] keeps a parsed key around
/// instead.
pub fn sign(
    primitives: &Primitives,
    method: &str,
    path_and_query: &str,
    body: Option<&[u8]>,
    adp_token: &str,
    private_key_pem: &str,
) -> Result<AuthHeaders> {
    let key = primitives.rsa.load_private_key(private_key_pem)?;
    sign_with_key(
        key.as_ref(),
        method,
        path_and_query,
        body,
        adp_token,
        primitives.clock.now(),
    )
}

/// Bearer headers for an access token
pub fn bearer_headers(access_token: &str) -> AuthHeaders {
    let mut headers = AuthHeaders::new();
    headers.insert("Authorization", format!("Bearer {}", access_token));
    headers.insert("client-id", "0");
    headers
}

/// `Cookie` header for a website cookie jar
pub fn cookie_headers(cookies: &BTreeMap<String, String>) -> AuthHeaders {
    let value = cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ");
    let mut headers = AuthHeaders::new();
    headers.insert("Cookie", value);
    headers
}

// ============================================================================
// Authenticator
// ============================================================================

/// Shared owner of a device identity
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Authenticator {
    identity: RwLock<Option<Arc<DeviceIdentity>>>,
    refresh_gate: Mutex<()>,
    key_cache: StdMutex<Option<(String, Arc<dyn PrivateKey>)>>,
    session: Arc<dyn HttpSession>,
    primitives: Primitives,
    with_username: bool,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("with_username", &self.with_username)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(session: Arc<dyn HttpSession>, identity: DeviceIdentity) -> Self {
        Self::with_slot(session, Some(Arc::new(identity)))
    }

    /// Authenticator without an identity; every request fails until one is set
    pub fn empty(session: Arc<dyn HttpSession>) -> Self {
        Self::with_slot(session, None)
    }

    fn with_slot(session: Arc<dyn HttpSession>, identity: Option<Arc<DeviceIdentity>>) -> Self {
        Self {
            identity: RwLock::new(identity),
            refresh_gate: Mutex::new(()),
            key_cache: StdMutex::new(None),
            session,
            primitives: Primitives::default(),
            with_username: false,
        }
    }

    pub fn with_primitives(mut self, primitives: Primitives) -> Self {
        self.primitives = primitives;
        self
    }

    /// Use the Audible auth hosts for refresh and deregistration
    pub fn with_username(mut self, with_username: bool) -> Self {
        self.with_username = with_username;
        self
    }

    pub fn session(&self) -> &Arc<dyn HttpSession> {
        &self.session
    }

    /// Current identity, if any
    pub async fn snapshot(&self) -> Option<Arc<DeviceIdentity>> {
        self.identity.read().await.clone()
    }

    /// Current identity
    ///
    /// # Errors
    /// AuthFlow when no identity is loaded.
    pub async fn identity(&self) -> Result<Arc<DeviceIdentity>> {
        self.snapshot()
            .await
            .ok_or_else(|| AuthError::AuthFlow("no device identity loaded".to_string()))
    }

    /// Swap in a new identity and drop the cached key
    pub async fn replace_identity(&self, identity: DeviceIdentity) {
        let mut slot = self.identity.write().await;
        *slot = Some(Arc::new(identity));
        self.clear_key_cache();
    }

    /// Forget the identity
    pub async fn clear(&self) {
        let mut slot = self.identity.write().await;
        *slot = None;
        self.clear_key_cache();
    }

    /// Headers authenticating a request with the best available capability
    pub async fn auth_headers(&self, method: &Method, url: &Url, body: Option<&[u8]>) -> Result<AuthHeaders> {
        let identity = self.identity().await?;

        match identity.capabilities().first() {
            Some(AuthCapability::Signing) => {
                let (Some(adp_token), Some(pem)) = (identity.adp_token(), identity.device_private_key()) else {
                    return Err(AuthError::AuthFlow("signing capability without key material".to_string()));
                };
                let key = self.signing_key(pem)?;
                tracing::debug!(strategy = "signing", %method, path = url.path(), "authenticating request");
                sign_with_key(
                    key.as_ref(),
                    method.as_str(),
                    &path_and_query(url),
                    body,
                    adp_token,
                    self.primitives.clock.now(),
                )
            }
            Some(AuthCapability::Bearer) => {
                let identity = self.ensure_fresh_access_token().await?;
                let token = identity.access_token().ok_or(AuthError::RefreshUnavailable)?;
                tracing::debug!(strategy = "bearer", %method, path = url.path(), "authenticating request");
                Ok(bearer_headers(token))
            }
            Some(AuthCapability::Cookies) => {
                let cookies = identity
                    .website_cookies()
                    .ok_or_else(|| AuthError::AuthFlow("cookie capability without cookies".to_string()))?;
                tracing::debug!(strategy = "cookies", %method, path = url.path(), "authenticating request");
                Ok(cookie_headers(cookies))
            }
            None => Err(AuthError::AuthFlow(
                "identity has no signing key, access token or website cookies".to_string(),
            )),
        }
    }

    /// Add authentication headers to `request`
    pub async fn authenticate(&self, request: HttpRequest) -> Result<HttpRequest> {
        let headers = self
            .auth_headers(&request.method, &request.url, request.body.as_deref())
            .await?;
        Ok(headers.apply(request))
    }

    /// Identity with a valid access token, refreshing once if expired
    pub async fn ensure_fresh_access_token(&self) -> Result<Arc<DeviceIdentity>> {
        let observed = self.identity().await?;
        if !observed.access_token_expired(self.primitives.clock.now()) {
            return Ok(observed);
        }
        self.refresh_from(observed, false).await
    }

    /// Refresh the access token even if it is still valid
    pub async fn force_refresh(&self) -> Result<Arc<DeviceIdentity>> {
        let observed = self.identity().await?;
        self.refresh_from(observed, true).await
    }

    async fn refresh_from(&self, observed: Arc<DeviceIdentity>, force: bool) -> Result<Arc<DeviceIdentity>> {
        let _gate = self.refresh_gate.lock().await;

        let current = self.identity().await?;
        let now = self.primitives.clock.now();
        if current.access_token() != observed.access_token() && !current.access_token_expired(now) {
            tracing::debug!("access token refreshed by another task, reusing it");
            return Ok(current);
        }
        if !force && !current.access_token_expired(now) {
            return Ok(current);
        }

        let refresh_token = current.refresh_token().ok_or(AuthError::RefreshUnavailable)?;
        let refreshed = registration::refresh_access_token(
            self.session.as_ref(),
            refresh_token,
            current.locale(),
            self.with_username,
            now,
        )
        .await?;

        let mut next = DeviceIdentity::clone(&current);
        next.apply_refresh(refreshed)?;
        let next = self.publish(&current, next).await;
        tracing::info!(identity = %next.masked_log_entry(), "access token refreshed");
        Ok(next)
    }

    /// Fetch website cookies for `.amazon.{cookies_domain}` and store them
    pub async fn refresh_website_cookies(&self, cookies_domain: &str) -> Result<Arc<DeviceIdentity>> {
        let _gate = self.refresh_gate.lock().await;

        let current = self.identity().await?;
        let refresh_token = current.refresh_token().ok_or(AuthError::RefreshUnavailable)?;
        let cookies = registration::refresh_website_cookies(
            self.session.as_ref(),
            refresh_token,
            current.locale(),
            cookies_domain,
        )
        .await?;

        let mut next = DeviceIdentity::clone(&current);
        next.apply_website_cookies(cookies)?;
        Ok(self.publish(&current, next).await)
    }

    /// Record activation bytes on the identity
    pub async fn set_activation_bytes(&self, bytes: ActivationBytes) -> Result<Arc<DeviceIdentity>> {
        let _gate = self.refresh_gate.lock().await;
        let current = self.identity().await?;
        let mut next = DeviceIdentity::clone(&current);
        next.set_activation_bytes(bytes);
        Ok(self.publish(&current, next).await)
    }

    /// Deregister this device (or all devices) and forget the identity
    pub async fn deregister(&self, deregister_all: bool) -> Result<Value> {
        let identity = self.ensure_fresh_access_token().await?;
        let token = identity.access_token().ok_or(AuthError::RefreshUnavailable)?;
        let response = registration::deregister(
            self.session.as_ref(),
            token,
            identity.locale(),
            deregister_all,
            self.with_username,
        )
        .await?;
        self.clear().await;
        Ok(response)
    }

    /// Store `next` unless the identity was replaced while it was computed
    async fn publish(&self, base: &Arc<DeviceIdentity>, next: DeviceIdentity) -> Arc<DeviceIdentity> {
        let mut slot = self.identity.write().await;
        match slot.as_ref() {
            Some(current) if Arc::ptr_eq(current, base) => {
                let next = Arc::new(next);
                if next.device_private_key() != base.device_private_key() {
                    self.clear_key_cache();
                }
                *slot = Some(next.clone());
                next
            }
            Some(current) => {
                tracing::warn!("identity replaced during update, keeping the replacement");
                current.clone()
            }
            None => {
                tracing::warn!("identity cleared during update, discarding result");
                Arc::new(next)
            }
        }
    }

    fn signing_key(&self, pem: &str) -> Result<Arc<dyn PrivateKey>> {
        let mut cache = self
            .key_cache
            .lock()
            .map_err(|_| AuthError::InternalError("signing key cache poisoned".to_string()))?;
        if let Some((cached_pem, key)) = cache.as_ref() {
            if cached_pem == pem {
                return Ok(key.clone());
            }
        }
        let key = self.primitives.rsa.load_private_key(pem)?;
        *cache = Some((pem.to_string(), key.clone()));
        Ok(key)
    }

    fn clear_key_cache(&self) {
        if let Ok(mut cache) = self.key_cache.lock() {
            *cache = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http::HttpResponse;
    use crate::api::locale::Locale;
    use crate::crypto::primitives::{Clock, RsaSigner, RustCryptoRsa};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::signature::Verifier;
    use sha2::Sha256;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEST_KEY_PEM: &str = include_str!("../../test_fixtures/device_private_key.pem");
    const ADP: &str = "{enc:ZW5j}{key:a2V5}{iv:aXY=}{name:bmFtZQ==}{serial:Mg==}";

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn verify(headers: &AuthHeaders, method: &str, path: &str, body: &str) -> bool {
        let (sig, timestamp) = headers.get("x-adp-signature").unwrap().split_once(':').unwrap();
        let data = canonical_string(method, path, timestamp, body, headers.get("x-adp-token").unwrap());
        let public = rsa::RsaPrivateKey::from_pkcs1_pem(TEST_KEY_PEM).unwrap().to_public_key();
        let signature = Signature::try_from(general_purpose::STANDARD.decode(sig).unwrap().as_slice()).unwrap();
        VerifyingKey::<Sha256>::new(public)
            .verify(data.as_bytes(), &signature)
            .is_ok()
    }

    /// Key wrapper counting how often keys are parsed
    struct CountingRsa(AtomicUsize);

    impl RsaSigner for CountingRsa {
        fn load_private_key(&self, pem: &str) -> Result<Arc<dyn PrivateKey>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            RustCryptoRsa.load_private_key(pem)
        }
    }

    /// Token endpoint that counts calls and answers slowly
    struct TokenServer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpSession for TokenServer {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(HttpResponse {
                status: 200,
                url: request.url,
                history: Vec::new(),
                body: format!(r#"{{"access_token":"Atna|fresh{}","expires_in":3600}}"#, n).into_bytes(),
            })
        }

        fn set_cookie(&self, _domain: &str, _name: &str, _value: &str) {}
    }

    fn server() -> Arc<TokenServer> {
        Arc::new(TokenServer {
            calls: AtomicUsize::new(0),
        })
    }

    fn bearer_identity(expires: DateTime<Utc>, refresh: Option<&str>) -> DeviceIdentity {
        let mut builder = DeviceIdentity::builder(Locale::us()).bearer("Atna|old", expires);
        if let Some(refresh) = refresh {
            builder = builder.refresh_token(refresh);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_canonical_string_layout() {
        assert_eq!(
            canonical_string("get", "/1.0/library?num_results=1", "2025-03-01T12:00:00.000000Z", "", "ADP"),
            "GET\n/1.0/library?num_results=1\n2025-03-01T12:00:00.000000Z\n\nADP"
        );
        assert_eq!(signing_timestamp(t0()), "2025-03-01T12:00:00.000000Z");
    }

    #[test]
    fn test_path_and_query() {
        let url = Url::parse("https://api.audible.com/1.0/library?num_results=1&page=2").unwrap();
        assert_eq!(path_and_query(&url), "/1.0/library?num_results=1&page=2");
        assert_eq!(path_and_query(&Url::parse("https://api.audible.com/x").unwrap()), "/x");
    }

    #[test]
    fn test_signature_headers_verify() {
        let primitives = Primitives::default().with_clock(Arc::new(FixedClock(t0())));
        let headers = sign(&primitives, "POST", "/1.0/wishlist", Some(b"{\"asin\":\"B0\"}"), ADP, TEST_KEY_PEM).unwrap();

        assert_eq!(headers.get("x-adp-token"), Some(ADP));
        assert_eq!(headers.get("x-adp-alg"), Some("SHA256withRSA:1.0"));
        assert!(headers.get("x-adp-signature").unwrap().ends_with(":2025-03-01T12:00:00.000000Z"));
        assert!(verify(&headers, "POST", "/1.0/wishlist", "{\"asin\":\"B0\"}"));
        assert!(!verify(&headers, "POST", "/1.0/wishlist", "{}"));
    }

    #[test]
    fn test_signatures_differ_by_timestamp_only() {
        let key = RustCryptoRsa.load_private_key(TEST_KEY_PEM).unwrap();
        let a = sign_with_key(key.as_ref(), "GET", "/1.0/library", None, ADP, t0()).unwrap();
        let b = sign_with_key(key.as_ref(), "GET", "/1.0/library", None, ADP, t0() + Duration::seconds(2)).unwrap();

        assert_ne!(a.get("x-adp-signature"), b.get("x-adp-signature"));
        assert_eq!(a.get("x-adp-token"), b.get("x-adp-token"));
        assert!(verify(&a, "GET", "/1.0/library", ""));
        assert!(verify(&b, "GET", "/1.0/library", ""));
    }

    #[tokio::test]
    async fn test_signing_preferred_and_key_cached() {
        let rsa = Arc::new(CountingRsa(AtomicUsize::new(0)));
        let identity = DeviceIdentity::builder(Locale::us())
            .signing(ADP, TEST_KEY_PEM)
            .unwrap()
            .bearer("Atna|tok", t0() + Duration::hours(1))
            .build()
            .unwrap();
        let auth = Authenticator::new(server(), identity)
            .with_primitives(Primitives::default().with_rsa(rsa.clone()).with_clock(Arc::new(FixedClock(t0()))));

        let url = Url::parse("https://api.audible.com/1.0/library").unwrap();
        let first = auth.auth_headers(&Method::GET, &url, None).await.unwrap();
        auth.auth_headers(&Method::GET, &url, None).await.unwrap();
        assert!(first.get("x-adp-signature").is_some());
        assert!(first.get("authorization").is_none());
        assert_eq!(rsa.0.load(Ordering::SeqCst), 1);

        let replacement = DeviceIdentity::builder(Locale::us())
            .signing(ADP, TEST_KEY_PEM)
            .unwrap()
            .build()
            .unwrap();
        auth.replace_identity(replacement).await;
        auth.auth_headers(&Method::GET, &url, None).await.unwrap();
        assert_eq!(rsa.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bearer_valid_token_not_refreshed() {
        let server = server();
        let auth = Authenticator::new(server.clone(), bearer_identity(t0() + Duration::hours(1), Some("Atnr|r")))
            .with_primitives(Primitives::default().with_clock(Arc::new(FixedClock(t0()))));
        let url = Url::parse("https://api.audible.com/1.0/library").unwrap();
        let headers = auth.auth_headers(&Method::GET, &url, None).await.unwrap();
        assert_eq!(headers.get("authorization"), Some("Bearer Atna|old"));
        assert_eq!(headers.get("client-id"), Some("0"));
        assert_eq!(server.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_expired_requests_refresh_once() {
        let server = server();
        let auth = Arc::new(
            Authenticator::new(server.clone(), bearer_identity(t0() - Duration::seconds(1), Some("Atnr|r")))
                .with_primitives(Primitives::default().with_clock(Arc::new(FixedClock(t0())))),
        );
        let url = Url::parse("https://api.audible.com/1.0/library").unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let auth = auth.clone();
                let url = url.clone();
                tokio::spawn(async move { auth.auth_headers(&Method::GET, &url, None).await })
            })
            .collect();
        for task in tasks {
            let headers = task.await.unwrap().unwrap();
            assert_eq!(headers.get("authorization"), Some("Bearer Atna|fresh1"));
        }
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);

        let identity = auth.identity().await.unwrap();
        assert_eq!(identity.access_token(), Some("Atna|fresh1"));
        assert_eq!(identity.expires(), Some(t0() + Duration::seconds(3600)));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let auth = Authenticator::new(server(), bearer_identity(t0() - Duration::seconds(1), None))
            .with_primitives(Primitives::default().with_clock(Arc::new(FixedClock(t0()))));
        let url = Url::parse("https://api.audible.com/1.0/library").unwrap();
        let err = auth.auth_headers(&Method::GET, &url, None).await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshUnavailable));
    }

    #[tokio::test]
    async fn test_cookie_strategy() {
        let cookies: BTreeMap<String, String> =
            [("session-id".to_string(), "1".to_string()), ("ubid-main".to_string(), "2".to_string())].into();
        let identity = DeviceIdentity::builder(Locale::us()).website_cookies(cookies).build().unwrap();
        let auth = Authenticator::new(server(), identity);
        let request = HttpRequest::get(Url::parse("https://www.audible.com/x").unwrap());
        let request = auth.authenticate(request).await.unwrap();
        assert_eq!(request.header_value("cookie"), Some("session-id=1; ubid-main=2"));
    }

    #[tokio::test]
    async fn test_no_identity_or_capability_is_auth_flow_error() {
        let url = Url::parse("https://api.audible.com/1.0/library").unwrap();

        let auth = Authenticator::empty(server());
        let err = auth.auth_headers(&Method::GET, &url, None).await.unwrap_err();
        assert!(matches!(err, AuthError::AuthFlow(_)));

        let bare = DeviceIdentity::builder(Locale::us()).build().unwrap();
        let auth = Authenticator::new(server(), bare);
        let err = auth.auth_headers(&Method::GET, &url, None).await.unwrap_err();
        assert!(matches!(err, AuthError::AuthFlow(_)));
    }
}
