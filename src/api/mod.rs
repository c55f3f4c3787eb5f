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


//! Audible device authentication protocol
//!
//! Login, registration and request authentication against Amazon's identity
//! service.
//!
//! # Layers
//! - `locale`, `device` - marketplace and device presets
//! - `http`, `html` - session port and sign-in page queries
//! - `pkce`, `challenge`, `login` - sign-in up to the authorization code
//! - `registration` - device registration, deregistration, token refresh
//! - `identity` - the registered device identity and its credential file
//! - `signing` - request signing and the shared [`signing::Authenticator`]
//! - `license` - activation bytes

pub mod challenge;
pub mod device;
pub mod html;
pub mod http;
pub mod identity;
pub mod license;
pub mod locale;
pub mod login;
pub mod pkce;
pub mod registration;
pub mod signing;

// Re-export commonly used types
pub use challenge::{
    ApprovalWaiter, CaptchaSolver, ChallengeContext, ChallengeHandlers, ChallengeKind, CvfProvider, OtpProvider,
};
pub use device::DeviceProfile;
pub use http::{HttpSession, ReqwestSession, SessionConfig};
pub use identity::{AuthCapability, DeviceIdentity, RefreshedToken};
pub use locale::Locale;
pub use login::{LoginConfig, LoginOrchestrator, LoginResult};
pub use registration::{RegistrationRequest, RegistrationResult};
pub use signing::{AuthHeaders, Authenticator};
