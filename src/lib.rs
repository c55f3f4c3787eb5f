//! Audible device authentication
//!
//! Signs in through Amazon's browser login (with CAPTCHA, MFA, OTP, CVF and
//! approval challenges), registers a device, authenticates API requests with
//! the resulting identity and stores that identity encrypted at rest.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use librisync_auth::api::http::{HttpSession, ReqwestSession, SessionConfig};
//! use librisync_auth::api::locale::Locale;
//! use librisync_auth::api::login::{LoginConfig, LoginOrchestrator};
//! use librisync_auth::api::registration::{register, RegistrationRequest};
//! use librisync_auth::api::signing::Authenticator;
//!
//! # async fn example() -> librisync_auth::error::Result<()> {
//! let locale = Locale::us();
//! let config = LoginConfig::builder(locale.clone()).build()?;
//! let session: Arc<dyn HttpSession> = Arc::new(ReqwestSession::new(SessionConfig::for_device(&config.device))?);
//!
//! let login = LoginOrchestrator::new(session.clone(), config)
//!     .login("user@example.com", "password")
//!     .await?;
//! let registration = register(
//!     session.as_ref(),
//!     &RegistrationRequest::from_login(&login, locale, false),
//!     chrono::Utc::now(),
//! )
//! .await?;
//!
//! let auth = Authenticator::new(session, registration.identity);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod crypto;
pub mod error;

pub use api::identity::DeviceIdentity;
pub use api::signing::Authenticator;
pub use error::{AuthError, Result};
