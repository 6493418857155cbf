use std::path::Path;

use serde::Deserialize;

use crate::session::TokenPolicy;
use crate::types::{Credentials, Region, TemperatureSource, Variant};
use crate::{Error, Result};

pub const DEFAULT_NAME: &str = "Klarstein AC";
pub const DEFAULT_MANUFACTURER: &str = "Klarstein";

/// Accessory settings as they appear in the host's config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessoryConfig {
    #[serde(default)]
    pub name: String,
    #[serde(alias = "deviceId")]
    pub device_id: String,
    #[serde(alias = "clientId")]
    pub client_id: String,
    #[serde(alias = "clientSecret")]
    pub client_secret: String,
    #[serde(default)]
    pub region: Region,
    #[serde(default, alias = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub variant: Variant,
    #[serde(default, alias = "currentTemperature")]
    pub current_temperature: Option<TemperatureSource>,
    #[serde(default, alias = "tokenPolicy")]
    pub token_policy: TokenPolicy,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl AccessoryConfig {
    pub fn new(
        device_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            device_id: device_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            region: Region::default(),
            base_url: None,
            variant: Variant::default(),
            current_temperature: None,
            token_policy: TokenPolicy::default(),
            manufacturer: None,
            model: None,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: AccessoryConfig =
            toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        if config.name.trim().is_empty() {
            config.name = DEFAULT_NAME.to_string();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("device_id", &self.device_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.device_id, &self.client_id, &self.client_secret)
    }

    pub fn temperature_source(&self) -> TemperatureSource {
        self.current_temperature
            .unwrap_or_else(|| self.variant.temperature_source())
    }

    pub fn manufacturer(&self) -> &str {
        self.manufacturer.as_deref().unwrap_or(DEFAULT_MANUFACTURER)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(self.variant.model())
    }
}

pub fn load(path: impl AsRef<Path>) -> Result<AccessoryConfig> {
    let contents = std::fs::read_to_string(path)?;
    AccessoryConfig::from_toml_str(&contents)
}
