//! Saved bench configurations
//!
//! A profile is the persistent half of a session: connection settings plus
//! the periodic message and response rule lists. It round-trips through YAML
//! so callers can store it wherever they like.

use serde::{Deserialize, Serialize};

use crate::types::{PeriodicMessage, ResponseRule};
use crate::{BusError, Result};

/// Document version written by [`Profile::to_yaml`].
pub const PROFILE_VERSION: &str = "1.0";

/// Endpoint the profile was captured against.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileSettings {
    #[serde(default)]
    pub channel: String,
    /// Bits per second; 0 when captured while disconnected
    #[serde(default)]
    pub bitrate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub version: String,
    #[serde(default)]
    pub settings: ProfileSettings,
    #[serde(default)]
    pub periodic_messages: Vec<PeriodicMessage>,
    #[serde(default)]
    pub response_rules: Vec<ResponseRule>,
}

impl Default for Profile {
    fn default() -> Self {
        Self::new(ProfileSettings::default(), Vec::new(), Vec::new())
    }
}

impl Profile {
    pub fn new(
        settings: ProfileSettings,
        periodic_messages: Vec<PeriodicMessage>,
        response_rules: Vec<ResponseRule>,
    ) -> Self {
        Self { version: PROFILE_VERSION.to_string(), settings, periodic_messages, response_rules }
    }

    /// Parse and validate a YAML profile.
    ///
    /// ```rust
    /// use canbench::Profile;
    ///
    /// let yaml = r#"
    /// version: "1.0"
    /// settings:
    ///   channel: PCAN_USBBUS1
    ///   bitrate: 500000
    /// response_rules:
    ///   - trigger_id: 0x7E0
    ///     response_id: 0x7E8
    ///     response_data: [2, 80, 1]
    ///     is_extended: false
    ///     increment_byte: -1
    /// "#;
    /// let profile = Profile::from_yaml(yaml).unwrap();
    /// assert_eq!(profile.response_rules[0].increment_byte, None);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let profile: Profile = serde_yaml_ng::from_str(yaml)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Check the version and every record.
    pub fn validate(&self) -> Result<()> {
        let major = PROFILE_VERSION.split('.').next().unwrap_or_default();
        if self.version.split('.').next() != Some(major) {
            return Err(BusError::profile(format!(
                "unsupported profile version {:?}, expected {PROFILE_VERSION}",
                self.version
            )));
        }

        for (index, message) in self.periodic_messages.iter().enumerate() {
            message.clone().validated().map_err(|err| {
                BusError::profile(format!("periodic message {}: {err}", index + 1))
            })?;
        }
        for (index, rule) in self.response_rules.iter().enumerate() {
            rule.clone()
                .validated()
                .map_err(|err| BusError::profile(format!("response rule {}: {err}", index + 1)))?;
        }
        Ok(())
    }
}
