use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::codes;

/// Identity of one cloud-linked device plus the cloud project keys used to sign for it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub device_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(
        device_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("device_id", &self.device_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Tuya data centre hosting the cloud project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum Region {
    #[serde(rename = "cn")]
    China,
    #[serde(rename = "us")]
    WesternAmerica,
    #[serde(rename = "us-e")]
    EasternAmerica,
    #[default]
    #[serde(rename = "eu")]
    CentralEurope,
    #[serde(rename = "eu-w")]
    WesternEurope,
    #[serde(rename = "in")]
    India,
}

impl Region {
    pub fn base_url(&self) -> &'static str {
        match self {
            Region::China => "https://openapi.tuyacn.com",
            Region::WesternAmerica => "https://openapi.tuyaus.com",
            Region::EasternAmerica => "https://openapi-ueaz.tuyaus.com",
            Region::CentralEurope => "https://openapi.tuyaeu.com",
            Region::WesternEurope => "https://openapi-weaz.tuyaeu.com",
            Region::India => "https://openapi.tuyain.com",
        }
    }
}

/// One `{code, value}` entry as the cloud reports and accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub code: String,
    pub value: Value,
}

impl DataPoint {
    pub fn new(code: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            code: code.into(),
            value: value.into(),
        }
    }
}

/// Device status keyed by data-point code. Empty means "unknown", not "off".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status(BTreeMap<String, Value>);

impl Status {
    /// Later entries with the same code overwrite earlier ones.
    pub fn from_data_points(points: impl IntoIterator<Item = DataPoint>) -> Self {
        let mut map = BTreeMap::new();
        for dp in points {
            map.insert(dp.code, dp.value);
        }
        Self(map)
    }

    pub fn get(&self, code: &str) -> Option<&Value> {
        self.0.get(code)
    }

    pub fn insert(&mut self, code: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(code.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn flag(&self, code: &str) -> bool {
        self.get(code).is_some_and(truthy)
    }

    pub fn string(&self, code: &str) -> Option<&str> {
        self.get(code).and_then(|v| v.as_str())
    }

    /// Numeric value of `code`, or `default` when it is missing or falsy.
    /// Numeric strings are accepted.
    pub fn number_or(&self, code: &str, default: f64) -> f64 {
        match self.get(code) {
            Some(v) if truthy(v) => v
                .as_f64()
                .or_else(|| v.as_str()?.trim().parse().ok())
                .unwrap_or(default),
            _ => default,
        }
    }

    pub fn power(&self) -> bool {
        self.flag(codes::POWER)
    }

    pub fn mode(&self) -> Option<&str> {
        self.string(codes::MODE).filter(|m| !m.is_empty())
    }

    pub fn speed(&self) -> Option<SpeedTier> {
        self.string(codes::SPEED).and_then(SpeedTier::from_tuya_str)
    }

    pub fn sleep(&self) -> bool {
        self.flag(codes::SLEEP)
    }
}

/// Loose truthiness of a cloud value: `false`, `0`, `""` and `null` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcMode {
    Cool,
    Auto,
    Fan,
    Dry,
}

impl AcMode {
    pub fn as_tuya_str(&self) -> &'static str {
        match self {
            AcMode::Cool => "cool",
            AcMode::Auto => "auto",
            AcMode::Fan => "fan",
            AcMode::Dry => "dry",
        }
    }

    pub fn from_tuya_str(s: &str) -> Option<Self> {
        match s {
            "cool" => Some(AcMode::Cool),
            "auto" => Some(AcMode::Auto),
            "fan" => Some(AcMode::Fan),
            "dry" => Some(AcMode::Dry),
            _ => None,
        }
    }
}

/// The three discrete fan speeds the unit supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedTier {
    Low,
    Mid,
    High,
}

impl SpeedTier {
    pub fn as_tuya_str(&self) -> &'static str {
        match self {
            SpeedTier::Low => "low",
            SpeedTier::Mid => "mid",
            SpeedTier::High => "high",
        }
    }

    pub fn from_tuya_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(SpeedTier::Low),
            "mid" => Some(SpeedTier::Mid),
            "high" => Some(SpeedTier::High),
            _ => None,
        }
    }
}

/// Maps rotation-speed percentages onto speed tiers and back.
///
/// Read and write thresholds are deliberately asymmetric: a percentage read
/// back from the device is always written back as the same tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedScale {
    /// low/mid/high = 0/50/100, written at 25 and 75.
    Simple,
    /// low/mid/high = 33/66/100, written at 50 and 84.
    MultiMode,
}

impl SpeedScale {
    pub fn percent(&self, tier: Option<SpeedTier>) -> u8 {
        match (self, tier) {
            (SpeedScale::Simple, Some(SpeedTier::Low)) => 0,
            (SpeedScale::Simple, Some(SpeedTier::Mid)) => 50,
            (SpeedScale::Simple, Some(SpeedTier::High)) => 100,
            (SpeedScale::Simple, None) => 50,
            (SpeedScale::MultiMode, Some(SpeedTier::Low)) => 33,
            (SpeedScale::MultiMode, Some(SpeedTier::Mid)) => 66,
            (SpeedScale::MultiMode, Some(SpeedTier::High)) => 100,
            (SpeedScale::MultiMode, None) => 66,
        }
    }

    pub fn tier(&self, percent: f64) -> SpeedTier {
        let (mid, high) = match self {
            SpeedScale::Simple => (25.0, 75.0),
            SpeedScale::MultiMode => (50.0, 84.0),
        };
        if percent >= high {
            SpeedTier::High
        } else if percent >= mid {
            SpeedTier::Mid
        } else {
            SpeedTier::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Simple,
    #[default]
    MultiMode,
}

impl Variant {
    pub fn speed_scale(&self) -> SpeedScale {
        match self {
            Variant::Simple => SpeedScale::Simple,
            Variant::MultiMode => SpeedScale::MultiMode,
        }
    }

    pub fn temperature_source(&self) -> TemperatureSource {
        match self {
            Variant::Simple => TemperatureSource::Setpoint,
            Variant::MultiMode => TemperatureSource::Display,
        }
    }

    pub fn model(&self) -> &'static str {
        match self {
            Variant::Simple => "Tuya AC",
            Variant::MultiMode => "Tuya AC Multi-Mode",
        }
    }
}

/// Which data point feeds the current-temperature display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureSource {
    /// `temp_c_set`, the target temperature.
    Setpoint,
    /// `temp_c_disp`, the temperature the unit reports.
    Display,
}

impl TemperatureSource {
    pub fn code(&self) -> &'static str {
        match self {
            TemperatureSource::Setpoint => codes::TEMP_SET,
            TemperatureSource::Display => codes::TEMP_DISPLAY,
        }
    }
}
