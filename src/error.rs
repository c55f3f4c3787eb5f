//! Error types for LibriSync device authentication
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by where they come from in the credential lifecycle
//! (login pages, challenges, registration endpoints, local crypto) so callers can
//! decide whether to prompt the user again, re-authenticate, or give up.
//!
//! ## Categories
//!
//! ### Login / challenge errors
//! - Malformed or unexpected HTML → `Protocol`
//! - A challenge callback gave no usable answer → `ChallengeUnresolved`
//! - Approval polling ran out of attempts → `ChallengeTimeout`
//! - No authorization code after the challenge loop → `LoginFailed`
//!
//! ### Request authentication
//! - No capability of the device identity can authenticate a request → `AuthFlow`
//! - Bearer refresh needed but no refresh token stored → `RefreshUnavailable`
//! - Identity field failed validation → `InvalidIdentity`
//!
//! ### Remote errors
//! - Non-2xx from identity/registration endpoints → `Remote` (carries the body)
//! - Unparseable success body → `InvalidApiResponse`
//! - Transport failures → `Network`, `ReqwestError`
//!
//! ### Crypto
//! - Bad salt marker, checksum mismatch, bad padding, bad key encoding → `CryptoFormat`

use thiserror::Error;

/// Result type alias using our AuthError type
pub type Result<T> = std::result::Result<T, AuthError>;

/// Main error type for device authentication
///
/// Every fallible operation in the crate returns this type. Variants carry
/// enough context (page URL, endpoint, response body) to diagnose a failed
/// login without re-running it.
#[derive(Error, Debug)]
pub enum AuthError {
    // ===== Login / challenge errors =====

    /// Login page did not have the expected structure (missing form, field, attribute)
    #[error("Login protocol error: {message}")]
    Protocol {
        message: String,
        /// URL of the page being processed, if known
        page_url: Option<String>,
    },

    /// A challenge callback returned no usable answer, or no handler was configured
    #[error("Challenge '{challenge}' could not be resolved: {reason}")]
    ChallengeUnresolved {
        challenge: String,
        reason: String,
    },

    /// Polling a challenge (approval alert) exceeded its attempt budget
    #[error("Challenge '{challenge}' still pending after {attempts} attempts")]
    ChallengeTimeout {
        challenge: String,
        attempts: u32,
    },

    /// Challenge loop finished but no authorization code was found
    #[error("Login failed: {0}")]
    LoginFailed(String),

    // ===== Request authentication errors =====

    /// No auth flow is available for the current device identity
    #[error("No usable authentication flow: {0}")]
    AuthFlow(String),

    /// Access token expired and there is no refresh token to renew it
    #[error("Access token expired and no refresh token is available")]
    RefreshUnavailable,

    /// A device identity field failed validation
    #[error("Invalid device identity field '{field}': {message}")]
    InvalidIdentity {
        field: String,
        message: String,
    },

    // ===== Remote errors =====

    /// Identity or registration endpoint answered with a non-success status
    #[error("Remote error from {endpoint} (status {status}): {body}")]
    Remote {
        status: u16,
        endpoint: String,
        /// Raw response body as returned by the server
        body: String,
    },

    /// Endpoint answered with success but the body had an unexpected shape
    #[error("Invalid API response: {message}")]
    InvalidApiResponse {
        message: String,
        /// Response body snippet for debugging
        response_body: Option<String>,
    },

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    // ===== Crypto errors =====

    /// Malformed ciphertext, envelope, key encoding, or checksum mismatch
    #[error("Crypto format error: {0}")]
    CryptoFormat(String),

    // ===== General errors =====

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<std::string::FromUtf8Error> for AuthError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        AuthError::CryptoFormat(format!("UTF-8 conversion error: {}", err))
    }
}

impl From<base64::DecodeError> for AuthError {
    fn from(err: base64::DecodeError) -> Self {
        AuthError::CryptoFormat(format!("Invalid base64: {}", err))
    }
}

// Helper methods for creating common errors
impl AuthError {
    /// Create a Protocol error for a page
    pub fn protocol<S: Into<String>>(message: S, page_url: Option<&url::Url>) -> Self {
        AuthError::Protocol {
            message: message.into(),
            page_url: page_url.map(|u| u.to_string()),
        }
    }

    /// Create a ChallengeUnresolved error
    pub fn unresolved<C: Into<String>, R: Into<String>>(challenge: C, reason: R) -> Self {
        AuthError::ChallengeUnresolved {
            challenge: challenge.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidIdentity error
    pub fn invalid_identity<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        AuthError::InvalidIdentity {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a Remote error
    pub fn remote<E: Into<String>, B: Into<String>>(status: u16, endpoint: E, body: B) -> Self {
        AuthError::Remote {
            status,
            endpoint: endpoint.into(),
            body: body.into(),
        }
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        AuthError::InvalidInput(message.into())
    }

    /// Create a CryptoFormat error with a message
    pub fn crypto<S: Into<String>>(message: S) -> Self {
        AuthError::CryptoFormat(message.into())
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        AuthError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Check if error is retryable by the caller
    ///
    /// Nothing in this crate retries on its own; this only tells a caller
    /// implementing its own backoff whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthError::NetworkError { is_transient, .. } => *is_transient,
            AuthError::Remote { status, .. } => (500..=599).contains(status) || *status == 429,
            AuthError::ReqwestError(e) => e.is_timeout() || e.is_connect(),
            AuthError::ChallengeTimeout { .. } => true,
            _ => false,
        }
    }

    /// Check if error means the user has to log in (again)
    pub fn is_auth_error(&self) -> bool {
        match self {
            AuthError::LoginFailed(_)
            | AuthError::AuthFlow(_)
            | AuthError::RefreshUnavailable
            | AuthError::ChallengeUnresolved { .. } => true,
            AuthError::Remote { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// Check if error comes from local crypto or an encoded format
    pub fn is_crypto_error(&self) -> bool {
        matches!(self, AuthError::CryptoFormat(_))
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            AuthError::ChallengeUnresolved { challenge, .. } => {
                format!("The {} step was not completed. Please try logging in again.", challenge)
            }
            AuthError::ChallengeTimeout { .. } => {
                "The sign-in approval was not confirmed in time. Please approve the notification and try again.".to_string()
            }
            AuthError::LoginFailed(_) => {
                "Login failed. Please check your credentials and try again.".to_string()
            }
            AuthError::RefreshUnavailable => {
                "Your session has expired. Please log in again.".to_string()
            }
            AuthError::CryptoFormat(_) => {
                "The credential file could not be decrypted. Check the password or the file.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display_contains_body() {
        let err = AuthError::remote(400, "/auth/register", r#"{"error":"bad"}"#);
        let text = err.to_string();
        assert!(text.contains("400"));
        assert!(text.contains("/auth/register"));
        assert!(text.contains("bad"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AuthError::remote(503, "/auth/token", "").is_retryable());
        assert!(!AuthError::remote(400, "/auth/token", "").is_retryable());
        assert!(AuthError::network_error("timeout", true).is_retryable());
        assert!(!AuthError::crypto("bad padding").is_retryable());
    }

    #[test]
    fn test_auth_error_classification() {
        assert!(AuthError::RefreshUnavailable.is_auth_error());
        assert!(AuthError::remote(401, "/x", "").is_auth_error());
        assert!(!AuthError::crypto("x").is_auth_error());
        assert!(AuthError::crypto("x").is_crypto_error());
    }

    #[test]
    fn test_protocol_error_keeps_page_url() {
        let url = url::Url::parse("https://www.amazon.com/ap/signin").unwrap();
        match AuthError::protocol("no form", Some(&url)) {
            AuthError::Protocol { page_url, .. } => {
                assert_eq!(page_url.as_deref(), Some("https://www.amazon.com/ap/signin"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_user_message_hides_details() {
        let err = AuthError::unresolved("otp", "callback returned empty code");
        assert!(!err.user_message().contains("callback"));
    }
}
