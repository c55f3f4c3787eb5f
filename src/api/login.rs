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

//! Browser-emulated Amazon sign-in
//!
//! # Flow
//! 1. Generate a PKCE pair and build the OAuth URL (client id derived from
//!    the device serial and type)
//! 2. Seed the session with the anti-bot cookies (`frc`, `map-md`,
//!    `amzn-app-id`); without them the first page is a CAPTCHA
//! 3. Fetch the sign-in page and post its form with `email`, `password` and
//!    the obfuscated fingerprint in `metadata1`
//! 4. Hand the response to the [`ChallengeResolver`]
//! 5. Pick `openid.oa2.authorization_code` out of the final URL or any URL
//!    of the redirect chain
//!
//! The result is a [`LoginResult`]; nothing is registered yet. Pass it to
//! [`crate::api::registration::register`] to obtain a device identity.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use librisync_auth::api::http::{ReqwestSession, SessionConfig};
//! use librisync_auth::api::locale::Locale;
//! use librisync_auth::api::login::{LoginConfig, LoginOrchestrator};
//!
//! # async fn example() -> librisync_auth::error::Result<()> {
//! let config = LoginConfig::builder(Locale::us()).build()?;
//! let session = Arc::new(ReqwestSession::new(SessionConfig::for_device(&config.device))?);
//! let login = LoginOrchestrator::new(session, config);
//! let result = login.login("user@example.com", "password").await?;
//! println!("serial: {}", result.device_serial);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use url::Url;

use crate::api::challenge::{form_request, ChallengeHandlers, ChallengeResolver, ResolverConfig};
use crate::api::device::DeviceProfile;
use crate::api::html::{FormSelector, LoginPage};
use crate::api::http::{HttpRequest, HttpResponse, HttpSession};
use crate::api::locale::Locale;
use crate::api::pkce::PkceChallenge;
use crate::crypto::metadata;
use crate::crypto::primitives::Primitives;
use crate::error::{AuthError, Result};

/// Query parameter carrying the authorization code on the landing URL
pub const AUTHORIZATION_CODE_PARAM: &str = "openid.oa2.authorization_code";

/// Length of the random `frc` cookie in bytes
const FRC_LENGTH: usize = 313;

// ============================================================================
// Configuration
// ============================================================================

/// Everything a login needs besides the credentials
#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub locale: Locale,
    pub device: DeviceProfile,
    /// Sign in with an Audible username instead of an Amazon account
    pub with_username: bool,
    pub resolver: ResolverConfig,
}

impl LoginConfig {
    pub fn builder(locale: Locale) -> LoginConfigBuilder {
        LoginConfigBuilder::new(locale)
    }

    /// Host family the sign-in pages live on
    pub fn base_domain(&self) -> String {
        if self.with_username {
            self.locale.audible_domain()
        } else {
            self.locale.amazon_domain()
        }
    }
}

/// Builder for LoginConfig
#[derive(Debug, Clone)]
pub struct LoginConfigBuilder {
    config: LoginConfig,
}

impl LoginConfigBuilder {
    pub fn new(locale: Locale) -> Self {
        Self {
            config: LoginConfig {
                locale,
                device: DeviceProfile::default(),
                with_username: false,
                resolver: ResolverConfig::default(),
            },
        }
    }

    pub fn device(mut self, device: DeviceProfile) -> Self {
        self.config.device = device;
        self
    }

    pub fn with_username(mut self, with_username: bool) -> Self {
        self.config.with_username = with_username;
        self
    }

    pub fn approval_poll_interval(mut self, interval: Duration) -> Self {
        self.config.resolver.approval_poll_interval = interval;
        self
    }

    pub fn approval_max_polls(mut self, max_polls: u32) -> Self {
        self.config.resolver.approval_max_polls = max_polls;
        self
    }

    pub fn max_challenge_rounds(mut self, max_rounds: u32) -> Self {
        self.config.resolver.max_rounds = max_rounds;
        self
    }

    /// Validate and build
    ///
    /// # Errors
    /// InvalidInput if the username flow is requested for a marketplace
    /// other than `de`, `com` or `co.uk`, or a limit is zero.
    pub fn build(self) -> Result<LoginConfig> {
        let config = self.config;
        if config.with_username && !config.locale.supports_username_login() {
            return Err(AuthError::invalid_input(format!(
                "Login with username is only supported for de, com and co.uk marketplaces, not {}",
                config.locale.domain
            )));
        }
        if config.resolver.approval_max_polls == 0 || config.resolver.max_rounds == 0 {
            return Err(AuthError::invalid_input("Challenge limits must be greater than zero"));
        }
        Ok(config)
    }
}

/// Outcome of a successful sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub authorization_code: String,
    /// PKCE verifier matching the challenge of the OAuth URL
    pub code_verifier: String,
    pub device_serial: String,
    pub device: DeviceProfile,
}

// ============================================================================
// Request building
// ============================================================================

/// Sign-in URL for a PKCE pair
pub fn build_oauth_url(config: &LoginConfig, pkce: &PkceChallenge) -> Result<Url> {
    let locale = &config.locale;
    let base_domain = config.base_domain();
    let (assoc_handle, page_id) = if config.with_username {
        (
            format!("amzn_audible_ios_lap_{}", locale.country_code),
            "amzn_audible_ios_privatepool",
        )
    } else {
        (format!("amzn_audible_ios_{}", locale.country_code), "amzn_audible_ios")
    };

    let mut url = Url::parse(&format!("https://www.{}/ap/signin", base_domain))?;
    url.query_pairs_mut()
        .append_pair("openid.oa2.response_type", "code")
        .append_pair("openid.oa2.code_challenge_method", &pkce.method)
        .append_pair("openid.oa2.code_challenge", &pkce.challenge)
        .append_pair("openid.return_to", &format!("https://www.{}/ap/maplanding", base_domain))
        .append_pair("openid.assoc_handle", &assoc_handle)
        .append_pair("openid.identity", "http://specs.openid.net/auth/2.0/identifier_select")
        .append_pair("pageId", page_id)
        .append_pair("accountStatusPolicy", "P1")
        .append_pair("openid.claimed_id", "http://specs.openid.net/auth/2.0/identifier_select")
        .append_pair("openid.mode", "checkid_setup")
        .append_pair("openid.ns.oa2", "http://www.amazon.com/ap/ext/oauth/2")
        .append_pair("openid.oa2.client_id", &format!("device:{}", config.device.client_id()))
        .append_pair("openid.ns.pape", "http://specs.openid.net/extensions/pape/1.0")
        .append_pair("marketPlaceId", &locale.market_place_id)
        .append_pair("openid.oa2.scope", "device_auth_access")
        .append_pair("forceMobileLayout", "true")
        .append_pair("openid.ns", "http://specs.openid.net/auth/2.0")
        .append_pair("openid.pape.max_auth_age", "0");
    Ok(url)
}

/// Cookies that must be present before the first request
pub fn build_init_cookies(device: &DeviceProfile, primitives: &Primitives) -> Vec<(String, String)> {
    let frc = general_purpose::URL_SAFE_NO_PAD.encode(primitives.random.bytes(FRC_LENGTH));

    let map_md = serde_json::json!({
        "device_user_dictionary": [],
        "device_registration_data": {
            "software_version": device.software_version,
        },
        "app_identifier": {
            "app_version": device.app_version,
            "bundle_id": device.app_name,
        },
    });
    let map_md = general_purpose::STANDARD_NO_PAD.encode(map_md.to_string());

    vec![
        ("frc".to_string(), frc),
        ("map-md".to_string(), map_md),
        ("amzn-app-id".to_string(), device.app_id.clone()),
    ]
}

/// Browser fingerprint posted (obfuscated) as `metadata1`
pub fn build_fingerprint(device: &DeviceProfile, oauth_url: &Url, now_millis: i64) -> String {
    serde_json::json!({
        "start": now_millis,
        "interaction": {
            "keys": 0,
            "keyPressTimeIntervals": [],
            "copies": 0,
            "cuts": 0,
            "pastes": 0,
            "clicks": 0,
            "touches": 0,
            "mouseClickPositions": [],
            "keyCycles": [],
            "mouseCycles": [],
            "touchCycles": [],
        },
        "version": "3.0.0",
        "lsUbid": "X39-6721012-8795219:1549849158",
        "timeZone": -6,
        "scrollPosition": {"xOffset": 0, "yOffset": 0},
        "plugins": "unknown||320-568-548-32-*-*-*",
        "dupedPlugins": "unknown||320-568-548-32-*-*-*",
        "screenInfo": "320-568-548-32-*-*-*",
        "capabilities": {
            "js": {
                "audio": true,
                "geolocation": true,
                "localStorage": "supported",
                "touch": true,
                "video": true,
                "webWorker": true,
            },
            "css": {
                "textShadow": 1,
                "textStroke": 1,
                "boxShadow": 1,
                "borderRadius": 1,
                "borderImage": 1,
                "opacity": 1,
                "transform": 1,
                "transition": 1,
            },
            "elapsed": 1,
        },
        "referrer": "",
        "userAgent": device.user_agent,
        "location": oauth_url.as_str(),
        "webDriver": null,
        "history": {"length": 1},
        "gpu": {
            "vendor": "Apple Inc.",
            "model": "Apple A9 GPU",
            "extensions": [],
        },
        "math": {
            "tan": "-1.4214488238747243",
            "sin": "0.8178819121159085",
            "cos": "-0.5753861119575491",
        },
        "performance": {
            "timing": {
                "navigationStart": now_millis,
                "fetchStart": now_millis,
                "domComplete": now_millis,
                "loadEventEnd": now_millis,
            },
        },
        "end": now_millis,
        "timeToSubmit": 108873,
        "form": {
            "email": {
                "keys": 0,
                "keyPressTimeIntervals": [],
                "copies": 0,
                "cuts": 0,
                "pastes": 0,
                "clicks": 0,
                "touches": 0,
                "width": 290,
                "height": 43,
                "totalFocusTime": 0,
                "checksum": "",
                "autocomplete": false,
                "prefilled": false,
            },
            "password": {
                "keys": 0,
                "keyPressTimeIntervals": [],
                "copies": 0,
                "cuts": 0,
                "pastes": 0,
                "clicks": 0,
                "touches": 0,
                "width": 290,
                "height": 43,
                "totalFocusTime": 0,
                "autocomplete": false,
                "prefilled": false,
            },
        },
        "canvas": {
            "hash": -373378155,
            "emailHash": -1447130560,
            "histogramBins": [],
        },
        "token": null,
        "errors": [],
        "metrics": [
            {"n": "fp2", "t": 0},
            {"n": "browser", "t": 0},
            {"n": "capabilities", "t": 1},
            {"n": "gpu", "t": 0},
            {"n": "dnt", "t": 0},
            {"n": "math", "t": 0},
            {"n": "tz", "t": 0},
            {"n": "history", "t": 0},
            {"n": "location", "t": 0},
            {"n": "screen", "t": 0},
            {"n": "pageInfo", "t": 0},
            {"n": "canvas", "t": 0},
            {"n": "form", "t": 0},
        ],
    })
    .to_string()
}

/// Authorization code from the final URL or the redirect chain
pub fn extract_authorization_code(response: &HttpResponse) -> Option<String> {
    response.all_urls().find_map(|url| {
        url.query_pairs()
            .find(|(name, _)| name == AUTHORIZATION_CODE_PARAM)
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty())
    })
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs the sign-in conversation for one account
pub struct LoginOrchestrator {
    session: Arc<dyn HttpSession>,
    config: LoginConfig,
    handlers: ChallengeHandlers,
    primitives: Primitives,
}

impl std::fmt::Debug for LoginOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginOrchestrator")
            .field("config", &self.config)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl LoginOrchestrator {
    pub fn new(session: Arc<dyn HttpSession>, config: LoginConfig) -> Self {
        Self {
            session,
            config,
            handlers: ChallengeHandlers::default(),
            primitives: Primitives::default(),
        }
    }

    pub fn with_handlers(mut self, handlers: ChallengeHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_primitives(mut self, primitives: Primitives) -> Self {
        self.primitives = primitives;
        self
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// Sign in and return the authorization code with its PKCE verifier
    ///
    /// # Errors
    /// - `Protocol` when a page lacks the expected form
    /// - `ChallengeUnresolved` / `ChallengeTimeout` from the challenge loop
    /// - `LoginFailed` when no authorization code was issued
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResult> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::invalid_input("Username and password must not be empty"));
        }

        let pkce = PkceChallenge::generate(&self.primitives);
        let oauth_url = build_oauth_url(&self.config, &pkce)?;
        let device = &self.config.device;

        let cookie_domain = format!(".{}", self.config.base_domain());
        for (name, value) in build_init_cookies(device, &self.primitives) {
            self.session.set_cookie(&cookie_domain, &name, &value);
        }

        tracing::info!(
            locale = %self.config.locale.country_code,
            with_username = self.config.with_username,
            serial = %crate::api::identity::mask(&device.device_serial),
            "starting sign-in"
        );

        let sign_in = self
            .session
            .execute(HttpRequest::get(oauth_url.clone()))
            .await?
            .error_for_status("/ap/signin")?;
        let page = LoginPage::new(sign_in.url.clone(), sign_in.text());

        let now_millis = self.primitives.clock.now().timestamp_millis();
        let fingerprint = build_fingerprint(device, &oauth_url, now_millis);

        let mut fields = page.find_hidden_inputs(&FormSelector::SignIn)?;
        fields.set("email", username);
        fields.set("password", password);
        fields.set("metadata1", metadata::obfuscate(&fingerprint));

        let action = page.find_form_action(&FormSelector::SignIn)?;
        let response = self.session.execute(form_request(action, &fields)).await?;

        let resolver = ChallengeResolver::new(
            self.session.as_ref(),
            &self.handlers,
            &self.config.resolver,
            username,
            password,
        );
        let response = resolver.resolve(response).await?;

        match extract_authorization_code(&response) {
            Some(authorization_code) => {
                tracing::info!("sign-in completed, authorization code received");
                Ok(LoginResult {
                    authorization_code,
                    code_verifier: pkce.verifier,
                    device_serial: device.device_serial.clone(),
                    device: device.clone(),
                })
            }
            None => {
                let page = LoginPage::new(response.url.clone(), response.text());
                let reason = match page.find_error_message()? {
                    Some(message) => format!("no authorization code received: {}", message),
                    None => format!("no authorization code received (status {})", response.status),
                };
                tracing::warn!(status = response.status, "sign-in ended without authorization code");
                Err(AuthError::LoginFailed(reason))
            }
        }
    }
}
