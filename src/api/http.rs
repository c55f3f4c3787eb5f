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

//! HTTP session used by login, registration and token refresh
//!
//! Everything that talks to Amazon goes through the [`HttpSession`] trait so
//! the login state machine can be driven by scripted responses in tests.
//! [`ReqwestSession`] is the production implementation: a `reqwest` client
//! with a shared cookie jar that follows redirects itself, because the
//! authorization code is only visible in the redirect chain.
//!
//! # Example
//! ```rust,no_run
//! use librisync_auth::api::http::{ReqwestSession, SessionConfig};
//!
//! # fn example() -> librisync_auth::error::Result<()> {
//! let config = SessionConfig::builder()
//!     .accept_language("de-DE")
//!     .build();
//! let session = ReqwestSession::new(config)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::device::DeviceProfile;
use crate::api::html::FormFields;
use crate::error::{AuthError, Result};

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default redirect limit per request
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

// ============================================================================
// Request / response
// ============================================================================

/// An outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST with an urlencoded form body
    pub fn post_form(url: Url, fields: &FormFields) -> Self {
        Self::new(Method::POST, url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(fields.to_urlencoded().into_bytes())
    }

    /// POST with a JSON body
    pub fn post_json(url: Url, value: &serde_json::Value) -> Result<Self> {
        Ok(Self::new(Method::POST, url)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(value)?))
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Value of the first header called `name` (case-insensitive)
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as text, empty when there is none
    pub fn body_text(&self) -> String {
        self.body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

/// A received response after all redirects were followed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// URL of the final response
    pub url: Url,
    /// URLs of the redirect responses that led here, oldest first
    pub history: Vec<Url>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| AuthError::InvalidApiResponse {
            message: format!("Failed to parse response from {}: {}", self.url, e),
            response_body: Some(self.text()),
        })
    }

    /// Final URL followed by the redirect chain, newest first
    pub fn all_urls(&self) -> impl Iterator<Item = &Url> {
        std::iter::once(&self.url).chain(self.history.iter().rev())
    }

    /// Error unless the status is 2xx; `endpoint` names the call in the error
    pub fn error_for_status(self, endpoint: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AuthError::remote(self.status, endpoint, self.text()))
        }
    }
}

// ============================================================================
// Session trait
// ============================================================================

/// Cookie-keeping HTTP session
///
/// Implementations must follow redirects and record them in
/// [`HttpResponse::history`].
#[async_trait]
pub trait HttpSession: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Store a cookie for `domain` (e.g. `.amazon.com`)
    fn set_cookie(&self, domain: &str, name: &str, value: &str);
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for [`ReqwestSession`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: DeviceProfile::default().user_agent,
            accept_language: "en-US".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Config using the user agent of a device profile
    pub fn for_device(device: &DeviceProfile) -> Self {
        Self {
            user_agent: device.user_agent.clone(),
            ..Self::default()
        }
    }
}

/// Builder for SessionConfig
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn accept_language<S: Into<String>>(mut self, language: S) -> Self {
        self.config.accept_language = language.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

// ============================================================================
// reqwest implementation
// ============================================================================

/// [`HttpSession`] backed by `reqwest`
#[derive(Clone)]
pub struct ReqwestSession {
    client: Client,
    jar: Arc<Jar>,
    max_redirects: usize,
}

impl std::fmt::Debug for ReqwestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestSession")
            .field("max_redirects", &self.max_redirects)
            .finish_non_exhaustive()
    }
}

impl ReqwestSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| AuthError::invalid_input(format!("Invalid user agent: {}", e)))?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| AuthError::invalid_input(format!("Invalid Accept-Language: {}", e)))?,
        );

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .cookie_provider(jar.clone())
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            jar,
            max_redirects: config.max_redirects,
        })
    }

    fn build_request(&self, method: &Method, url: &Url, request: &HttpRequest, with_body: bool) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method.clone(), url.clone());
        for (name, value) in &request.headers {
            if !with_body && HeaderName::from_bytes(name.as_bytes()).ok() == Some(CONTENT_TYPE) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if with_body {
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }
        }
        builder
    }
}

#[async_trait]
impl HttpSession for ReqwestSession {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut method = request.method.clone();
        let mut url = request.url.clone();
        let mut with_body = true;
        let mut history = Vec::new();

        loop {
            tracing::debug!(%method, host = url.host_str().unwrap_or(""), path = url.path(), "http request");
            let response = self.build_request(&method, &url, &request, with_body).send().await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if let Some(location) = location {
                    if history.len() >= self.max_redirects {
                        return Err(AuthError::network_error(
                            format!("Too many redirects (>{}) starting at {}", self.max_redirects, request.url),
                            false,
                        ));
                    }
                    let next = url.join(&location)?;
                    history.push(url);
                    url = next;
                    let downgrade = status.as_u16() == 303
                        || (matches!(status.as_u16(), 301 | 302) && method == Method::POST);
                    if downgrade {
                        method = Method::GET;
                        with_body = false;
                    }
                    continue;
                }
            }

            let body = response.bytes().await?.to_vec();
            return Ok(HttpResponse {
                status: status.as_u16(),
                url,
                history,
                body,
            });
        }
    }

    fn set_cookie(&self, domain: &str, name: &str, value: &str) {
        let host = domain.trim_start_matches('.');
        match Url::parse(&format!("https://{}/", host)) {
            Ok(url) => {
                let cookie = format!("{}={}; Domain={}; Path=/; Secure", name, value, domain);
                self.jar.add_cookie_str(&cookie, &url);
            }
            Err(e) => tracing::warn!(domain, error = %e, "cannot set cookie for invalid domain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_form_encodes_fields() {
        let mut fields = FormFields::new();
        fields.set("email", "user@example.com");
        fields.set("password", "p&ss word");
        let request = HttpRequest::post_form(Url::parse("https://www.amazon.com/ap/signin").unwrap(), &fields);
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.header_value("content-type"), Some("application/x-www-form-urlencoded"));
        assert_eq!(request.body_text(), "email=user%40example.com&password=p%26ss+word");
    }

    #[test]
    fn test_response_urls_newest_first() {
        let response = HttpResponse {
            status: 200,
            url: Url::parse("https://c.example/").unwrap(),
            history: vec![
                Url::parse("https://a.example/").unwrap(),
                Url::parse("https://b.example/").unwrap(),
            ],
            body: Vec::new(),
        };
        let hosts: Vec<_> = response.all_urls().map(|u| u.host_str().unwrap().to_string()).collect();
        assert_eq!(hosts, vec!["c.example", "b.example", "a.example"]);
    }

    #[test]
    fn test_error_for_status_carries_body() {
        let response = HttpResponse {
            status: 403,
            url: Url::parse("https://api.amazon.com/auth/register").unwrap(),
            history: Vec::new(),
            body: b"{\"error\":\"denied\"}".to_vec(),
        };
        match response.error_for_status("/auth/register").unwrap_err() {
            AuthError::Remote { status, body, .. } => {
                assert_eq!(status, 403);
                assert!(body.contains("denied"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::builder()
            .user_agent("TestAgent/1.0")
            .timeout(Duration::from_secs(5))
            .max_redirects(3)
            .build();
        assert_eq!(config.user_agent, "TestAgent/1.0");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_redirects, 3);
        assert_eq!(config.accept_language, "en-US");
    }

    #[test]
    fn test_reqwest_session_builds() {
        assert!(ReqwestSession::new(SessionConfig::default()).is_ok());
        let bad = SessionConfig::builder().user_agent("bad\nagent").build();
        assert!(ReqwestSession::new(bad).is_err());
    }
}
