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

//! Sign-in challenge resolution
//!
//! After the credentials are posted, Amazon may interpose any number of
//! verification pages before redirecting to the authorization code:
//!
//! | Challenge       | Detected by                                         | Answer                         |
//! |-----------------|-----------------------------------------------------|--------------------------------|
//! | CAPTCHA         | `img` whose alt contains "CAPTCHA"                  | [`CaptchaSolver`]              |
//! | MFA device pick | `form#auth-select-device-form`                      | TOTP option, else the first    |
//! | OTP             | form id containing `auth-mfa-form`                  | [`OtpProvider`]                |
//! | CVF             | `div#cvf-page-content`                              | [`CvfProvider`] (two steps)    |
//! | Approval alert  | `resend-approval-alert` div / approval word-break   | [`ApprovalWaiter`], then poll  |
//!
//! [`ChallengeResolver::resolve`] re-detects every kind after each response
//! and only returns once no challenge matches the current page. Challenges
//! may repeat (a CAPTCHA after a wrong OTP), so the loop is bounded by
//! [`ResolverConfig::max_rounds`] rather than by challenge kind.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use url::Url;

use crate::api::html::{FormAction, FormFields, FormSelector, LoginPage};
use crate::api::http::{HttpRequest, HttpResponse, HttpSession};
use crate::error::{AuthError, Result};

// ============================================================================
// Challenge model
// ============================================================================

/// Kinds of sign-in challenges, in detection order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    Captcha,
    MfaChoice,
    Otp,
    Cvf,
    ApprovalAlert,
}

impl ChallengeKind {
    pub const ALL: [ChallengeKind; 5] = [
        ChallengeKind::Captcha,
        ChallengeKind::MfaChoice,
        ChallengeKind::Otp,
        ChallengeKind::Cvf,
        ChallengeKind::ApprovalAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Captcha => "captcha",
            ChallengeKind::MfaChoice => "mfa_choice",
            ChallengeKind::Otp => "otp",
            ChallengeKind::Cvf => "cvf",
            ChallengeKind::ApprovalAlert => "approval_alert",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable MFA delivery option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaOption {
    /// Input name (usually `otpDeviceContext`)
    pub name: String,
    pub value: String,
    /// Whether this is the authenticator app option
    pub is_totp: bool,
    /// Visible label
    pub label: String,
}

/// What the current page asks for; created per step and never stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeContext {
    Captcha { image_url: Url },
    MfaChoice { options: Vec<MfaOption> },
    Otp { hint: Option<String> },
    Cvf { method: Option<String> },
    ApprovalAlert { message: Option<String> },
}

impl ChallengeContext {
    pub fn kind(&self) -> ChallengeKind {
        match self {
            ChallengeContext::Captcha { .. } => ChallengeKind::Captcha,
            ChallengeContext::MfaChoice { .. } => ChallengeKind::MfaChoice,
            ChallengeContext::Otp { .. } => ChallengeKind::Otp,
            ChallengeContext::Cvf { .. } => ChallengeKind::Cvf,
            ChallengeContext::ApprovalAlert { .. } => ChallengeKind::ApprovalAlert,
        }
    }
}

/// First challenge shown on `page`, if any
pub fn detect_challenge(page: &LoginPage) -> Result<Option<ChallengeContext>> {
    for kind in ChallengeKind::ALL {
        if let Some(context) = page.find_challenge_marker(kind)? {
            return Ok(Some(context));
        }
    }
    Ok(None)
}

// ============================================================================
// Strategies
// ============================================================================

/// Answers CAPTCHA images
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, image_url: &Url) -> Result<String>;
}

/// Supplies one-time passwords from an authenticator app or SMS
#[async_trait]
pub trait OtpProvider: Send + Sync {
    async fn one_time_code(&self, hint: Option<&str>) -> Result<String>;
}

/// Supplies the code of a customer verification flow
#[async_trait]
pub trait CvfProvider: Send + Sync {
    async fn verification_code(&self, method: Option<&str>) -> Result<String>;
}

/// Tells the user to approve the sign-in on another device
#[async_trait]
pub trait ApprovalWaiter: Send + Sync {
    async fn notify(&self, message: Option<&str>) -> Result<()>;
}

/// Strategies available to the resolver; missing ones fail their challenge
#[derive(Clone, Default)]
pub struct ChallengeHandlers {
    pub captcha: Option<Arc<dyn CaptchaSolver>>,
    pub otp: Option<Arc<dyn OtpProvider>>,
    pub cvf: Option<Arc<dyn CvfProvider>>,
    pub approval: Option<Arc<dyn ApprovalWaiter>>,
}

impl fmt::Debug for ChallengeHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeHandlers")
            .field("captcha", &self.captcha.is_some())
            .field("otp", &self.otp.is_some())
            .field("cvf", &self.cvf.is_some())
            .field("approval", &self.approval.is_some())
            .finish()
    }
}

impl ChallengeHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captcha(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
        self.captcha = Some(solver);
        self
    }

    pub fn otp(mut self, provider: Arc<dyn OtpProvider>) -> Self {
        self.otp = Some(provider);
        self
    }

    pub fn cvf(mut self, provider: Arc<dyn CvfProvider>) -> Self {
        self.cvf = Some(provider);
        self
    }

    pub fn approval(mut self, waiter: Arc<dyn ApprovalWaiter>) -> Self {
        self.approval = Some(waiter);
        self
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Default delay between approval polls
pub const DEFAULT_APPROVAL_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Default number of approval polls (5 minutes at the default interval)
pub const DEFAULT_APPROVAL_MAX_POLLS: u32 = 75;

/// Default bound on challenge pages per login
pub const DEFAULT_MAX_CHALLENGE_ROUNDS: u32 = 20;

/// Limits of the resolution loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub approval_poll_interval: Duration,
    pub approval_max_polls: u32,
    pub max_rounds: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            approval_poll_interval: DEFAULT_APPROVAL_POLL_INTERVAL,
            approval_max_polls: DEFAULT_APPROVAL_MAX_POLLS,
            max_rounds: DEFAULT_MAX_CHALLENGE_ROUNDS,
        }
    }
}

/// Drives a sign-in conversation through its challenges
pub struct ChallengeResolver<'a> {
    session: &'a dyn HttpSession,
    handlers: &'a ChallengeHandlers,
    config: &'a ResolverConfig,
    email: &'a str,
    password: &'a str,
}

impl<'a> ChallengeResolver<'a> {
    pub fn new(
        session: &'a dyn HttpSession,
        handlers: &'a ChallengeHandlers,
        config: &'a ResolverConfig,
        email: &'a str,
        password: &'a str,
    ) -> Self {
        Self {
            session,
            handlers,
            config,
            email,
            password,
        }
    }

    /// Resolve challenges until the current page shows none
    ///
    /// Returns the last response, whose URL or redirect chain should carry
    /// the authorization code.
    pub async fn resolve(&self, mut response: HttpResponse) -> Result<HttpResponse> {
        for round in 0..self.config.max_rounds {
            let page = LoginPage::new(response.url.clone(), response.text());
            let Some(context) = detect_challenge(&page)? else {
                tracing::debug!(rounds = round, "no challenge on page");
                return Ok(response);
            };

            let kind = context.kind();
            tracing::info!(challenge = %kind, round, "sign-in challenge detected");
            response = self.resolve_one(&page, context).await?;
            tracing::debug!(challenge = %kind, status = response.status, "challenge answered");
        }

        Err(AuthError::unresolved(
            "login",
            format!("still challenged after {} rounds", self.config.max_rounds),
        ))
    }

    async fn resolve_one(&self, page: &LoginPage, context: ChallengeContext) -> Result<HttpResponse> {
        match context {
            ChallengeContext::Captcha { image_url } => self.resolve_captcha(page, &image_url).await,
            ChallengeContext::MfaChoice { options } => self.resolve_mfa_choice(page, &options).await,
            ChallengeContext::Otp { hint } => self.resolve_otp(page, hint.as_deref()).await,
            ChallengeContext::Cvf { method } => self.resolve_cvf(page, method.as_deref()).await,
            ChallengeContext::ApprovalAlert { message } => self.resolve_approval(page, message.as_deref()).await,
        }
    }

    async fn resolve_captcha(&self, page: &LoginPage, image_url: &Url) -> Result<HttpResponse> {
        let solver = self
            .handlers
            .captcha
            .as_ref()
            .ok_or_else(|| AuthError::unresolved("captcha", "no CAPTCHA solver configured"))?;
        let guess = non_empty(solver.solve(image_url).await?, "captcha")?;

        let mut fields = page.find_hidden_inputs(&FormSelector::SignIn)?;
        fields.set("guess", guess);
        fields.set("use_image_captcha", "true");
        fields.set("use_audio_captcha", "false");
        fields.set("showPasswordChecked", "false");
        fields.set("email", self.email);
        fields.set("password", self.password);

        let action = page.find_form_action(&FormSelector::SignIn)?;
        self.submit(action, &fields).await
    }

    async fn resolve_mfa_choice(&self, page: &LoginPage, options: &[MfaOption]) -> Result<HttpResponse> {
        let form = FormSelector::Exact("form#auth-select-device-form".to_string());
        let mut fields = page.find_hidden_inputs(&form)?;

        match options.iter().find(|o| o.is_totp).or_else(|| options.first()) {
            Some(option) => {
                tracing::debug!(totp = option.is_totp, "selecting MFA device");
                fields.set(option.name.clone(), option.value.clone());
            }
            None => tracing::warn!("MFA device form without options, submitting as is"),
        }

        let action = page.find_form_action(&form)?;
        self.submit(action, &fields).await
    }

    async fn resolve_otp(&self, page: &LoginPage, hint: Option<&str>) -> Result<HttpResponse> {
        let provider = self
            .handlers
            .otp
            .as_ref()
            .ok_or_else(|| AuthError::unresolved("otp", "no OTP provider configured"))?;
        let code = non_empty(provider.one_time_code(hint).await?, "otp")?;

        let form = FormSelector::Exact("form[id*=\"auth-mfa-form\"]".to_string());
        let mut fields = page.find_hidden_inputs(&form)?;
        fields.set("otpCode", code);
        fields.set("mfaSubmit", "Submit");
        fields.set("rememberDevice", "false");

        let action = page.find_form_action(&form)?;
        self.submit(action, &fields).await
    }

    async fn resolve_cvf(&self, page: &LoginPage, method: Option<&str>) -> Result<HttpResponse> {
        let provider = self
            .handlers
            .cvf
            .as_ref()
            .ok_or_else(|| AuthError::unresolved("cvf", "no verification code provider configured"))?;

        // Step 1: confirm the preselected delivery method so a code is sent.
        let form = FormSelector::css("div#cvf-page-content form");
        let fields = page.find_hidden_inputs(&form)?;
        let action = page.find_form_action(&form)?;
        let sent = self.submit(action, &fields).await?;

        // Step 2: enter the code on the page that follows.
        let code_page = LoginPage::new(sent.url.clone(), sent.text());
        let code = non_empty(provider.verification_code(method).await?, "cvf")?;
        let mut fields = code_page.find_hidden_inputs(&form)?;
        fields.set("action", "code");
        fields.set("code", code);
        let action = code_page.find_form_action(&form)?;
        self.submit(action, &fields).await
    }

    async fn resolve_approval(&self, page: &LoginPage, message: Option<&str>) -> Result<HttpResponse> {
        match &self.handlers.approval {
            Some(waiter) => waiter.notify(message).await?,
            None => tracing::warn!("approval alert shown but no approval waiter configured"),
        }

        let poll_url = page.url().clone();
        for attempt in 1..=self.config.approval_max_polls {
            tokio::time::sleep(self.config.approval_poll_interval).await;
            let response = self.session.execute(HttpRequest::get(poll_url.clone())).await?;
            let polled = LoginPage::new(response.url.clone(), response.text());
            if polled.find_challenge_marker(ChallengeKind::ApprovalAlert)?.is_none() {
                tracing::info!(attempt, "sign-in approved");
                return Ok(response);
            }
            tracing::debug!(attempt, max = self.config.approval_max_polls, "approval still pending");
        }

        Err(AuthError::ChallengeTimeout {
            challenge: ChallengeKind::ApprovalAlert.to_string(),
            attempts: self.config.approval_max_polls,
        })
    }

    async fn submit(&self, action: FormAction, fields: &FormFields) -> Result<HttpResponse> {
        self.session.execute(form_request(action, fields)).await
    }
}

/// Request submitting `fields` the way the form would
pub fn form_request(action: FormAction, fields: &FormFields) -> HttpRequest {
    if action.method == Method::GET {
        let mut url = action.url;
        url.query_pairs_mut().extend_pairs(fields.iter());
        HttpRequest::get(url)
    } else {
        let mut request = HttpRequest::post_form(action.url, fields);
        request.method = action.method;
        request
    }
}

fn non_empty(answer: String, challenge: &str) -> Result<String> {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        Err(AuthError::unresolved(challenge, "callback returned an empty answer"))
    } else {
        Ok(trimmed.to_string())
    }
}
