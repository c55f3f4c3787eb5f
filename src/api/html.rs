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

//! Queries over Amazon sign-in pages
//!
//! [`LoginPage`] keeps the page URL and raw HTML. Each query parses the
//! document again with `scraper`; the parsed tree is not `Send` and must not
//! live across an await point, so it never leaves a method.

use reqwest::Method;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::api::challenge::{ChallengeContext, ChallengeKind, MfaOption};
use crate::error::{AuthError, Result};

/// Which form of the page a query targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormSelector {
    /// `form[name=signIn]`, falling back to the first form
    SignIn,
    /// First form matching a CSS selector, falling back to the first form
    Css(String),
    /// First form matching a CSS selector, no fallback
    Exact(String),
}

impl FormSelector {
    pub fn css(css: impl Into<String>) -> Self {
        Self::Css(css.into())
    }
}

/// Ordered form fields, as they will be URL-encoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing an existing value in place
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// `application/x-www-form-urlencoded` body
    pub fn to_urlencoded(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

/// Where and how a form submits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormAction {
    pub method: Method,
    pub url: Url,
}

/// A fetched sign-in page
#[derive(Debug, Clone)]
pub struct LoginPage {
    url: Url,
    html: String,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AuthError::InternalError(format!("Invalid selector '{}': {:?}", css, e)))
}

impl LoginPage {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self { url, html: html.into() }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    fn exists(&self, css: &str) -> Result<bool> {
        let sel = selector(css)?;
        Ok(self.document().select(&sel).next().is_some())
    }

    fn find_form<'a>(&self, doc: &'a Html, form: &FormSelector) -> Result<ElementRef<'a>> {
        let first_form = selector("form")?;
        let found = match form {
            FormSelector::SignIn => {
                let named = selector("form[name=\"signIn\"]")?;
                doc.select(&named).next().or_else(|| doc.select(&first_form).next())
            }
            FormSelector::Css(css) => {
                let sel = selector(css)?;
                doc.select(&sel).next().or_else(|| doc.select(&first_form).next())
            }
            FormSelector::Exact(css) => {
                let sel = selector(css)?;
                doc.select(&sel).next()
            }
        };
        found.ok_or_else(|| AuthError::protocol(format!("No form matching {:?}", form), Some(&self.url)))
    }

    /// Named inputs of a form; only hidden inputs keep their value
    pub fn find_hidden_inputs(&self, form: &FormSelector) -> Result<FormFields> {
        let doc = self.document();
        let form_el = self.find_form(&doc, form)?;
        let input = selector("input")?;

        let mut fields = FormFields::new();
        for el in form_el.select(&input) {
            let Some(name) = el.value().attr("name") else {
                continue;
            };
            let hidden = el
                .value()
                .attr("type")
                .is_some_and(|t| t.eq_ignore_ascii_case("hidden"));
            let value = if hidden { el.value().attr("value").unwrap_or("") } else { "" };
            fields.set(name, value);
        }
        Ok(fields)
    }

    /// Method and absolute URL a form submits to
    pub fn find_form_action(&self, form: &FormSelector) -> Result<FormAction> {
        let doc = self.document();
        let form_el = self.find_form(&doc, form)?;

        let method = match form_el.value().attr("method") {
            Some(m) => Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| AuthError::protocol(format!("Invalid form method '{}'", m), Some(&self.url)))?,
            None => Method::GET,
        };

        let action = form_el
            .value()
            .attr("action")
            .ok_or_else(|| AuthError::protocol("Form has no action attribute", Some(&self.url)))?;
        let url = self
            .url
            .join(action.trim())
            .map_err(|e| AuthError::protocol(format!("Invalid form action '{}': {}", action, e), Some(&self.url)))?;

        Ok(FormAction { method, url })
    }

    /// Detect one challenge kind on this page
    ///
    /// Returns the context the matching strategy needs, or `None` when the
    /// page does not show that challenge.
    pub fn find_challenge_marker(&self, kind: ChallengeKind) -> Result<Option<ChallengeContext>> {
        match kind {
            ChallengeKind::Captcha => self.captcha_marker(),
            ChallengeKind::MfaChoice => self.mfa_choice_marker(),
            ChallengeKind::Otp => self.otp_marker(),
            ChallengeKind::Cvf => self.cvf_marker(),
            ChallengeKind::ApprovalAlert => self.approval_marker(),
        }
    }

    fn captcha_marker(&self) -> Result<Option<ChallengeContext>> {
        let doc = self.document();
        let img = selector("img[alt*=\"CAPTCHA\"]")?;
        let Some(el) = doc.select(&img).next() else {
            return Ok(None);
        };
        let src = el
            .value()
            .attr("src")
            .ok_or_else(|| AuthError::protocol("CAPTCHA image has no src", Some(&self.url)))?;
        let image_url = self
            .url
            .join(src)
            .map_err(|e| AuthError::protocol(format!("Invalid CAPTCHA image URL: {}", e), Some(&self.url)))?;
        Ok(Some(ChallengeContext::Captcha { image_url }))
    }

    fn mfa_choice_marker(&self) -> Result<Option<ChallengeContext>> {
        let doc = self.document();
        let form = selector("form#auth-select-device-form")?;
        if doc.select(&form).next().is_none() {
            return Ok(None);
        }

        let option_sel = selector("div[data-a-input-name=\"otpDeviceContext\"]")?;
        let input = selector("input")?;
        let mut options = Vec::new();
        for node in doc.select(&option_sel) {
            let Some(input_el) = node.select(&input).next() else {
                continue;
            };
            let (Some(name), Some(value)) = (input_el.value().attr("name"), input_el.value().attr("value")) else {
                continue;
            };
            options.push(MfaOption {
                name: name.to_string(),
                value: value.to_string(),
                is_totp: node.value().classes().any(|c| c.contains("auth-TOTP")),
                label: collapse_whitespace(&node.text().collect::<String>()),
            });
        }
        Ok(Some(ChallengeContext::MfaChoice { options }))
    }

    fn otp_marker(&self) -> Result<Option<ChallengeContext>> {
        let doc = self.document();
        let form = selector("form[id*=\"auth-mfa-form\"]")?;
        let Some(form_el) = doc.select(&form).next() else {
            return Ok(None);
        };
        let p = selector("p")?;
        let hint = form_el
            .select(&p)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|text| !text.is_empty());
        Ok(Some(ChallengeContext::Otp { hint }))
    }

    fn cvf_marker(&self) -> Result<Option<ChallengeContext>> {
        if !self.exists("div#cvf-page-content")? {
            return Ok(None);
        }
        let doc = self.document();
        let checked = selector("div#cvf-page-content input[name=\"option\"][checked]")?;
        let method = doc
            .select(&checked)
            .next()
            .and_then(|el| el.value().attr("value"))
            .map(str::to_string);
        Ok(Some(ChallengeContext::Cvf { method }))
    }

    fn approval_marker(&self) -> Result<Option<ChallengeContext>> {
        let doc = self.document();
        let alert = selector("div[id*=\"resend-approval-alert\"]")?;
        let word_break = selector("span.transaction-approval-word-break")?;

        let found = doc.select(&alert).next().is_some();
        let message = doc
            .select(&word_break)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()));
        if !found && message.is_none() {
            return Ok(None);
        }
        Ok(Some(ChallengeContext::ApprovalAlert { message }))
    }

    /// Text of the sign-in error or warning box, if the page shows one
    pub fn find_error_message(&self) -> Result<Option<String>> {
        let doc = self.document();
        let boxes = selector("div#auth-error-message-box, div#auth-warning-message-box")?;
        Ok(doc
            .select(&boxes)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|text| !text.is_empty()))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> LoginPage {
        LoginPage::new(Url::parse("https://www.amazon.com/ap/signin?x=1").unwrap(), html)
    }

    const SIGN_IN: &str = r#"
        <html><body>
          <form name="other" action="/other"><input type="hidden" name="o" value="1"></form>
          <form name="signIn" method="post" action="/ap/signin">
            <input type="hidden" name="appActionToken" value="tok">
            <input type="hidden" name="workflowState" value="wf">
            <input type="email" name="email" value="prefilled">
            <input type="password" name="password">
            <input type="submit">
          </form>
        </body></html>"#;

    #[test]
    fn test_sign_in_form_inputs() {
        let fields = page(SIGN_IN).find_hidden_inputs(&FormSelector::SignIn).unwrap();
        let pairs: Vec<_> = fields.iter().collect();
        assert_eq!(
            pairs,
            vec![("appActionToken", "tok"), ("workflowState", "wf"), ("email", ""), ("password", "")]
        );
    }

    #[test]
    fn test_form_action_resolves_relative_url() {
        let action = page(SIGN_IN).find_form_action(&FormSelector::SignIn).unwrap();
        assert_eq!(action.method, Method::POST);
        assert_eq!(action.url.as_str(), "https://www.amazon.com/ap/signin");
    }

    #[test]
    fn test_form_method_defaults_to_get() {
        let action = page(SIGN_IN)
            .find_form_action(&FormSelector::css("form[name=\"other\"]"))
            .unwrap();
        assert_eq!(action.method, Method::GET);
        assert_eq!(action.url.as_str(), "https://www.amazon.com/other");
    }

    #[test]
    fn test_missing_form_is_protocol_error() {
        let err = page("<p>nothing</p>").find_hidden_inputs(&FormSelector::SignIn).unwrap_err();
        assert!(matches!(err, AuthError::Protocol { page_url: Some(_), .. }));
        assert!(page(SIGN_IN)
            .find_hidden_inputs(&FormSelector::Exact("form#missing".into()))
            .is_err());
    }

    #[test]
    fn test_captcha_marker() {
        let html = r#"<form name="signIn" action="/ap/signin"></form>
            <img alt="Visual CAPTCHA image, continue down for an audio option." src="https://opfcaptcha.amazon.com/abc.jpg">"#;
        match page(html).find_challenge_marker(ChallengeKind::Captcha).unwrap() {
            Some(ChallengeContext::Captcha { image_url }) => {
                assert_eq!(image_url.as_str(), "https://opfcaptcha.amazon.com/abc.jpg")
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(page(SIGN_IN).find_challenge_marker(ChallengeKind::Captcha).unwrap().is_none());
    }

    #[test]
    fn test_mfa_choice_marker_lists_options() {
        let html = r#"<form id="auth-select-device-form" method="post" action="/ap/cvf/verify">
            <div data-a-input-name="otpDeviceContext" class="a-radio auth-SMS"><input type="radio" name="otpDeviceContext" value="sms-ctx"> Text me</div>
            <div data-a-input-name="otpDeviceContext" class="a-radio auth-TOTP"><input type="radio" name="otpDeviceContext" value="totp-ctx"> Authenticator   app</div>
        </form>"#;
        match page(html).find_challenge_marker(ChallengeKind::MfaChoice).unwrap() {
            Some(ChallengeContext::MfaChoice { options }) => {
                assert_eq!(options.len(), 2);
                assert!(!options[0].is_totp);
                assert!(options[1].is_totp);
                assert_eq!(options[1].value, "totp-ctx");
                assert_eq!(options[1].label, "Authenticator app");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_otp_and_cvf_markers() {
        let otp = r#"<form id="auth-mfa-form" action="/ap/signin"><p> Enter the code from your app </p></form>"#;
        assert_eq!(
            page(otp).find_challenge_marker(ChallengeKind::Otp).unwrap(),
            Some(ChallengeContext::Otp { hint: Some("Enter the code from your app".into()) })
        );

        let cvf = r#"<div id="cvf-page-content"><form action="/ap/cvf/verify">
            <input type="radio" name="option" value="email" checked></form></div>"#;
        assert_eq!(
            page(cvf).find_challenge_marker(ChallengeKind::Cvf).unwrap(),
            Some(ChallengeContext::Cvf { method: Some("email".into()) })
        );
    }

    #[test]
    fn test_approval_marker() {
        let html = r#"<div id="resend-approval-alert-box"></div>
            <span class="a-size-base transaction-approval-word-break"> Approve the notification </span>"#;
        assert_eq!(
            page(html).find_challenge_marker(ChallengeKind::ApprovalAlert).unwrap(),
            Some(ChallengeContext::ApprovalAlert { message: Some("Approve the notification".into()) })
        );
    }

    #[test]
    fn test_error_message_box() {
        let html = r#"<div id="auth-error-message-box"><h4>There was a problem</h4><span> Your password is incorrect </span></div>"#;
        assert_eq!(
            page(html).find_error_message().unwrap().as_deref(),
            Some("There was a problem Your password is incorrect")
        );
    }

    #[test]
    fn test_form_fields_set_replaces_in_place() {
        let mut fields = FormFields::new();
        fields.set("a", "1");
        fields.set("b", "2");
        fields.set("a", "3");
        assert_eq!(fields.iter().collect::<Vec<_>>(), vec![("a", "3"), ("b", "2")]);
        assert_eq!(fields.to_urlencoded(), "a=3&b=2");
    }
}
