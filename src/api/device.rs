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

//! Device profile presented to Amazon during login and registration
//!
//! The default profile is the Android emulator build the Audible app
//! registers as (device type `A10KISP2GWF0E4`). The serial is generated per
//! profile and must stay stable between login and registration, since the
//! OAuth client id is derived from it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Device type of the Audible Android app
pub const DEFAULT_DEVICE_TYPE: &str = "A10KISP2GWF0E4";

/// Identity of the emulated device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Amazon device type id
    pub device_type: String,
    /// Device serial, uppercase hex without dashes
    pub device_serial: String,
    /// Browser user agent for the login pages
    pub user_agent: String,
    /// Value of the `amzn-app-id` login cookie
    pub app_id: String,
    /// Bundle id / package name of the app
    pub app_name: String,
    pub app_version: String,
    pub software_version: String,
    pub os_family: String,
    pub os_version: String,
    /// Short OS version sent in `device_metadata`
    pub os_version_short: String,
    pub device_model: String,
    pub manufacturer: String,
    /// Device name template expanded server side
    pub device_name: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            device_serial: new_serial(),
            user_agent: "Mozilla/5.0 (Linux; Android 14; sdk_phone64_x86_64 Build/UE1A.230829.036.A1; wv) \
                         AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/113.0.5672.136 Mobile Safari/537.36"
                .to_string(),
            app_id: "MAPiOSLib/6.0/ToHideRetailLink".to_string(),
            app_name: "com.audible.application".to_string(),
            app_version: "177102".to_string(),
            software_version: "130050002".to_string(),
            os_family: "android".to_string(),
            os_version: "Android/sdk_phone64_x86_64/emu64x:14/UE1A.230829.036.A1/11228894:userdebug/test-keys"
                .to_string(),
            os_version_short: "34".to_string(),
            device_model: "Android SDK built for x86_64".to_string(),
            manufacturer: "unknown".to_string(),
            device_name: "%FIRST_NAME%%FIRST_NAME_POSSESSIVE_STRING%%DUPE_STRATEGY_1ST%Android".to_string(),
        }
    }
}

impl DeviceProfile {
    /// Default profile with a caller-supplied serial
    pub fn with_serial(serial: impl Into<String>) -> Self {
        Self {
            device_serial: serial.into(),
            ..Self::default()
        }
    }

    /// OAuth client id: lowercase hex of `"{serial}#{device_type}"`
    pub fn client_id(&self) -> String {
        hex::encode(format!("{}#{}", self.device_serial, self.device_type))
    }

    /// `registration_data` block of the register request
    pub fn registration_data(&self) -> serde_json::Value {
        serde_json::json!({
            "domain": "DeviceLegacy",
            "device_type": self.device_type,
            "device_serial": self.device_serial,
            "app_name": self.app_name,
            "app_version": self.app_version,
            "device_name": self.device_name,
            "os_version": self.os_version,
            "software_version": self.software_version,
            "device_model": self.device_model,
        })
    }

    /// `device_metadata` block of the register request
    pub fn device_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "device_os_family": self.os_family,
            "device_type": self.device_type,
            "device_serial": self.device_serial,
            "manufacturer": self.manufacturer,
            "model": self.device_model,
            "os_version": self.os_version_short,
            "product": self.os_version_short,
        })
    }
}

/// Fresh random device serial
pub fn new_serial() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}
