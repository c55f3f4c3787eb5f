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

//! Audible marketplaces
//!
//! Every URL the credential lifecycle touches is derived from the
//! marketplace's top-level domain (`com`, `co.uk`, ...) and marketplace id.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Audible market/region descriptor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Locale {
    /// Country code used in assoc handles and credential files ("us", "uk", ...)
    pub country_code: String,

    /// Top-level domain shared by amazon.* and audible.* hosts ("com", "co.uk", ...)
    pub domain: String,

    /// Amazon marketplace id
    pub market_place_id: String,

    /// Human-readable name
    pub name: String,
}

macro_rules! locale_preset {
    ($(#[$doc:meta])* $fn_name:ident, $code:expr, $domain:expr, $market:expr, $name:expr) => {
        $(#[$doc])*
        pub fn $fn_name() -> Self {
            Self {
                country_code: $code.to_string(),
                domain: $domain.to_string(),
                market_place_id: $market.to_string(),
                name: $name.to_string(),
            }
        }
    };
}

impl Locale {
    /// Create a custom locale
    pub fn new(country_code: &str, domain: &str, market_place_id: &str, name: &str) -> Self {
        Self {
            country_code: country_code.to_string(),
            domain: domain.to_string(),
            market_place_id: market_place_id.to_string(),
            name: name.to_string(),
        }
    }

    locale_preset!(
        /// United States (audible.com)
        us, "us", "com", "AF2M0KC94RCEA", "United States"
    );
    locale_preset!(
        /// United Kingdom (audible.co.uk)
        uk, "uk", "co.uk", "A2I9A3Q2GNFNGQ", "United Kingdom"
    );
    locale_preset!(de, "de", "de", "AN7V1F1VY261K", "Germany");
    locale_preset!(fr, "fr", "fr", "A2728XDNODOQ8T", "France");
    locale_preset!(ca, "ca", "ca", "A2CQZ5RBY40XE", "Canada");
    locale_preset!(au, "au", "com.au", "AN7EY7DTAW63G", "Australia");
    locale_preset!(it, "it", "it", "A2N7FU2W2BU2ZC", "Italy");
    locale_preset!(es, "es", "es", "ALMIKO4SZCSAR", "Spain");
    locale_preset!(in_, "in", "in", "AJO3FBRUE6J4S", "India");
    locale_preset!(jp, "jp", "co.jp", "A1QAP3MOU4173J", "Japan");
    locale_preset!(br, "br", "com.br", "A10J1VAYUDTYRN", "Brazil");

    /// Get all supported locales
    pub fn all() -> Vec<Self> {
        vec![
            Self::us(),
            Self::uk(),
            Self::de(),
            Self::fr(),
            Self::ca(),
            Self::au(),
            Self::it(),
            Self::es(),
            Self::in_(),
            Self::jp(),
            Self::br(),
        ]
    }

    /// Find a locale by country code
    pub fn from_country_code(code: &str) -> Result<Self> {
        Self::all()
            .into_iter()
            .find(|l| l.country_code.eq_ignore_ascii_case(code))
            .ok_or_else(|| AuthError::invalid_input(format!("Unknown marketplace country code: {}", code)))
    }

    /// `amazon.{tld}`
    pub fn amazon_domain(&self) -> String {
        format!("amazon.{}", self.domain)
    }

    /// `audible.{tld}`
    pub fn audible_domain(&self) -> String {
        format!("audible.{}", self.domain)
    }

    /// Whether the marketplace supports signing in with an Audible username
    /// instead of an Amazon account
    pub fn supports_username_login(&self) -> bool {
        matches!(self.domain.as_str(), "de" | "com" | "co.uk")
    }

    /// Base URL of the auth API (`/auth/register`, `/auth/token`, ...)
    pub fn auth_api_url(&self, with_username: bool) -> String {
        let host = if with_username { self.audible_domain() } else { self.amazon_domain() };
        format!("https://api.{}", host)
    }

    /// Base URL of the Audible API for signed requests
    pub fn api_url(&self) -> String {
        format!("https://api.{}", self.audible_domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_country_code() {
        let uk = Locale::from_country_code("UK").unwrap();
        assert_eq!(uk.domain, "co.uk");
        assert_eq!(uk.market_place_id, "A2I9A3Q2GNFNGQ");
        assert!(Locale::from_country_code("xx").is_err());
    }

    #[test]
    fn test_hosts() {
        let us = Locale::us();
        assert_eq!(us.amazon_domain(), "amazon.com");
        assert_eq!(us.auth_api_url(false), "https://api.amazon.com");
        assert_eq!(us.auth_api_url(true), "https://api.audible.com");
        assert_eq!(Locale::jp().api_url(), "https://api.audible.co.jp");
    }

    #[test]
    fn test_username_login_support() {
        assert!(Locale::us().supports_username_login());
        assert!(Locale::uk().supports_username_login());
        assert!(Locale::de().supports_username_login());
        assert!(!Locale::fr().supports_username_login());
        assert!(!Locale::jp().supports_username_login());
    }

    #[test]
    fn test_country_codes_unique() {
        let all = Locale::all();
        let mut codes: Vec<_> = all.iter().map(|l| l.country_code.clone()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_market_place_ids_unique() {
        let all = Locale::all();
        let mut ids: Vec<_> = all.iter().map(|l| l.market_place_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), all.len());
        assert_eq!(Locale::de().market_place_id, "AN7V1F1VY261K");
    }
}
