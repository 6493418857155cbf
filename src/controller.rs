use std::sync::Arc;

use serde_json::Value;
use tracing::{info, trace, warn};

use crate::gateway::DeviceApi;
use crate::hap::{
    CurrentHeaterCoolerState, CurrentHumidifierDehumidifierState, TargetHeaterCoolerState,
    TargetHumidifierDehumidifierState,
};
use crate::protocol::codes;
use crate::types::{truthy, AcMode, SpeedScale, Status, TemperatureSource, Variant};

pub const DEFAULT_TEMPERATURE: f64 = 22.0;
pub const MIN_TEMPERATURE: f64 = 18.0;
pub const MAX_TEMPERATURE: f64 = 32.0;
pub const TEMPERATURE_STEP: f64 = 1.0;

/// What distinguishes one control surface of the unit from another.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub label: &'static str,
    /// Device modes in which this surface counts as active.
    pub modes: &'static [AcMode],
    /// Mode selected when the surface is switched on.
    pub activation_mode: AcMode,
    /// Mode assumed when the device does not report one.
    pub assumed_mode: Option<AcMode>,
    pub speed_scale: SpeedScale,
    /// Report speed 0 while inactive and ignore writes of 0.
    pub speed_tracks_active: bool,
}

impl Profile {
    pub fn climate(variant: Variant) -> Self {
        Self {
            label: "climate",
            modes: &[AcMode::Cool, AcMode::Auto],
            activation_mode: AcMode::Cool,
            assumed_mode: Some(AcMode::Cool),
            speed_scale: variant.speed_scale(),
            speed_tracks_active: false,
        }
    }

    pub fn fan(variant: Variant) -> Self {
        Self {
            label: "fan",
            modes: &[AcMode::Fan],
            activation_mode: AcMode::Fan,
            assumed_mode: None,
            speed_scale: variant.speed_scale(),
            speed_tracks_active: true,
        }
    }

    pub fn dehumidifier(variant: Variant) -> Self {
        Self {
            label: "dehumidifier",
            modes: &[AcMode::Dry],
            activation_mode: AcMode::Dry,
            assumed_mode: None,
            speed_scale: variant.speed_scale(),
            speed_tracks_active: true,
        }
    }
}

/// Reads a fresh snapshot, substituting an empty one on failure.
async fn read_status(device: &dyn DeviceApi, label: &str, what: &str) -> Status {
    match device.get_status().await {
        Ok(status) => status,
        Err(e) => {
            warn!(controller = label, characteristic = what, error = %e, "status read failed, using defaults");
            Status::default()
        }
    }
}

async fn send(device: &dyn DeviceApi, label: &str, code: &str, value: Value) {
    if let Err(e) = device.set_status(code, value.clone()).await {
        warn!(controller = label, code, %value, error = %e, "command failed");
    }
}

/// One power/mode/speed control surface backed by the device gateway.
#[derive(Clone)]
pub struct CapabilityController {
    device: Arc<dyn DeviceApi>,
    profile: Profile,
}

impl CapabilityController {
    pub fn new(device: Arc<dyn DeviceApi>, profile: Profile) -> Self {
        Self { device, profile }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub async fn status(&self, what: &str) -> Status {
        read_status(self.device.as_ref(), self.profile.label, what).await
    }

    pub async fn send(&self, code: &str, value: impl Into<Value>) {
        send(self.device.as_ref(), self.profile.label, code, value.into()).await
    }

    /// Powered and in one of this surface's modes.
    pub fn is_active_in(&self, status: &Status) -> bool {
        if !status.power() {
            return false;
        }
        // Only an absent mode is assumed; an unknown one belongs to no surface.
        let mode = match status.get(codes::MODE) {
            Some(v) if truthy(v) => v.as_str().and_then(AcMode::from_tuya_str),
            _ => self.profile.assumed_mode,
        };
        mode.is_some_and(|m| self.profile.modes.contains(&m))
    }

    pub fn speed_in(&self, status: &Status) -> u8 {
        if self.profile.speed_tracks_active && !self.is_active_in(status) {
            return 0;
        }
        self.profile.speed_scale.percent(status.speed())
    }

    pub async fn active(&self) -> bool {
        let status = self.status("active").await;
        self.is_active_in(&status)
    }

    /// Switching on powers the unit and selects this surface's mode; switching
    /// off only cuts power.
    pub async fn set_active(&self, on: bool) {
        if on {
            self.send(codes::POWER, true).await;
            self.set_mode(self.profile.activation_mode).await;
        } else {
            self.send(codes::POWER, false).await;
        }
    }

    pub async fn set_mode(&self, mode: AcMode) {
        self.send(codes::MODE, mode.as_tuya_str()).await;
        info!(controller = self.profile.label, mode = mode.as_tuya_str(), "mode changed");
    }

    pub async fn rotation_speed(&self) -> u8 {
        let status = self.status("rotation speed").await;
        self.speed_in(&status)
    }

    pub async fn set_rotation_speed(&self, percent: f64) {
        if self.profile.speed_tracks_active && percent <= 0.0 {
            trace!(controller = self.profile.label, "ignoring rotation speed 0");
            return;
        }
        let tier = self.profile.speed_scale.tier(percent);
        self.send(codes::SPEED, tier.as_tuya_str()).await;
    }
}

/// Cooling/auto surface with a single setpoint shown as two thresholds.
#[derive(Clone)]
pub struct ClimateController {
    core: CapabilityController,
    temperature_source: TemperatureSource,
}

impl ClimateController {
    pub fn new(
        device: Arc<dyn DeviceApi>,
        variant: Variant,
        temperature_source: TemperatureSource,
    ) -> Self {
        Self {
            core: CapabilityController::new(device, Profile::climate(variant)),
            temperature_source,
        }
    }

    pub fn core(&self) -> &CapabilityController {
        &self.core
    }

    pub fn temperature_source(&self) -> TemperatureSource {
        self.temperature_source
    }

    pub async fn active(&self) -> bool {
        self.core.active().await
    }

    pub async fn set_active(&self, on: bool) {
        self.core.set_active(on).await
    }

    pub async fn current_state(&self) -> CurrentHeaterCoolerState {
        let status = self.core.status("current state").await;
        if self.core.is_active_in(&status) {
            CurrentHeaterCoolerState::Cooling
        } else {
            CurrentHeaterCoolerState::Inactive
        }
    }

    pub async fn target_state(&self) -> TargetHeaterCoolerState {
        let status = self.core.status("target state").await;
        match status.mode().and_then(AcMode::from_tuya_str) {
            Some(AcMode::Auto) => TargetHeaterCoolerState::Auto,
            _ => TargetHeaterCoolerState::Cool,
        }
    }

    pub async fn set_target_state(&self, state: TargetHeaterCoolerState) {
        let mode = match state {
            TargetHeaterCoolerState::Auto => AcMode::Auto,
            _ => AcMode::Cool,
        };
        self.core.set_mode(mode).await
    }

    pub async fn target_temperature(&self) -> f64 {
        let status = self.core.status("target temperature").await;
        status.number_or(codes::TEMP_SET, DEFAULT_TEMPERATURE)
    }

    /// Writes the setpoint and returns the whole-degree value actually sent.
    pub async fn set_target_temperature(&self, celsius: f64) -> i64 {
        let value = celsius.round().clamp(MIN_TEMPERATURE, MAX_TEMPERATURE) as i64;
        self.core.send(codes::TEMP_SET, value).await;
        info!(celsius = value, "target temperature set");
        value
    }

    pub async fn current_temperature(&self) -> f64 {
        let status = self.core.status("current temperature").await;
        status.number_or(self.temperature_source.code(), DEFAULT_TEMPERATURE)
    }

    pub async fn rotation_speed(&self) -> u8 {
        self.core.rotation_speed().await
    }

    pub async fn set_rotation_speed(&self, percent: f64) {
        self.core.set_rotation_speed(percent).await
    }
}

/// Dry-mode surface; its target state is fixed to dehumidifying.
#[derive(Clone)]
pub struct DehumidifierController {
    core: CapabilityController,
}

impl DehumidifierController {
    pub const TARGET_STATE: TargetHumidifierDehumidifierState =
        TargetHumidifierDehumidifierState::Dehumidifier;

    pub fn new(device: Arc<dyn DeviceApi>, variant: Variant) -> Self {
        Self {
            core: CapabilityController::new(device, Profile::dehumidifier(variant)),
        }
    }

    pub fn core(&self) -> &CapabilityController {
        &self.core
    }

    pub async fn active(&self) -> bool {
        self.core.active().await
    }

    pub async fn set_active(&self, on: bool) {
        self.core.set_active(on).await
    }

    pub async fn current_state(&self) -> CurrentHumidifierDehumidifierState {
        let status = self.core.status("current state").await;
        if self.core.is_active_in(&status) {
            CurrentHumidifierDehumidifierState::Dehumidifying
        } else {
            CurrentHumidifierDehumidifierState::Inactive
        }
    }

    pub fn target_state(&self) -> TargetHumidifierDehumidifierState {
        Self::TARGET_STATE
    }

    pub fn set_target_state(&self, requested: TargetHumidifierDehumidifierState) {
        trace!(?requested, "dehumidifier target state is fixed, ignoring write");
    }

    pub async fn rotation_speed(&self) -> u8 {
        self.core.rotation_speed().await
    }

    pub async fn set_rotation_speed(&self, percent: f64) {
        self.core.set_rotation_speed(percent).await
    }
}

/// Sleep mode, independent of the operating mode.
#[derive(Clone)]
pub struct SleepSwitch {
    device: Arc<dyn DeviceApi>,
}

impl SleepSwitch {
    const LABEL: &'static str = "sleep";

    pub fn new(device: Arc<dyn DeviceApi>) -> Self {
        Self { device }
    }

    pub async fn is_on(&self) -> bool {
        read_status(self.device.as_ref(), Self::LABEL, "on").await.sleep()
    }

    pub async fn set_on(&self, on: bool) {
        send(self.device.as_ref(), Self::LABEL, codes::SLEEP, Value::Bool(on)).await
    }
}
