use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::AccessoryConfig;
use crate::controller::{
    CapabilityController, ClimateController, DehumidifierController, Profile, SleepSwitch,
    MAX_TEMPERATURE, MIN_TEMPERATURE, TEMPERATURE_STEP,
};
use crate::gateway::{DeviceApi, DeviceGateway};
use crate::hap::{
    Active, CachedValue, Characteristic, HapValue, Props, Service, ServiceKind,
    TargetHeaterCoolerState, TargetHumidifierDehumidifierState,
};
use crate::protocol::codes;
use crate::types::Variant;
use crate::Result;

/// Speed step shown by the host; the unit only has three tiers.
const SPEED_STEP: f64 = 33.0;

/// The services one air conditioner is exposed as.
pub struct Accessory {
    name: String,
    services: Vec<Service>,
    startup_sync: Option<JoinHandle<()>>,
}

impl Accessory {
    /// Builds the gateway from `config` and composes the services around it.
    pub fn from_config(config: &AccessoryConfig) -> Result<Self> {
        config.validate()?;
        let mut builder = DeviceGateway::builder(config.credentials())
            .region(config.region)
            .token_policy(config.token_policy);
        if let Some(url) = &config.base_url {
            builder = builder.base_url(url.clone());
        }
        let gateway = builder.build()?;
        Ok(Self::new(config, Arc::new(gateway)))
    }

    pub fn new(config: &AccessoryConfig, device: Arc<dyn DeviceApi>) -> Self {
        let name = config.name.clone();
        let variant = config.variant;

        let info = Service::new(ServiceKind::AccessoryInformation, name.clone())
            .set_characteristic(Characteristic::Manufacturer, config.manufacturer())
            .set_characteristic(Characteristic::Model, config.model())
            .set_characteristic(Characteristic::SerialNumber, config.device_id.as_str());

        let climate =
            ClimateController::new(device.clone(), variant, config.temperature_source());
        let climate_service = climate_service(format!("{name} Air Conditioner"), climate.clone());

        let mut services = vec![info];
        let mut startup_sync = None;

        if variant == Variant::MultiMode {
            let cooling = climate_service.cached(Characteristic::CoolingThresholdTemperature);
            let heating = climate_service.cached(Characteristic::HeatingThresholdTemperature);
            if let (Some(cooling), Some(heating)) = (cooling, heating) {
                startup_sync = spawn_temperature_sync(climate, cooling, heating);
            }

            services.push(climate_service);
            services.push(fan_service(
                format!("{name} Fan"),
                CapabilityController::new(device.clone(), Profile::fan(variant)),
            ));
            services.push(dehumidifier_service(
                format!("{name} Dehumidifier"),
                DehumidifierController::new(device.clone(), variant),
            ));
            services.push(sleep_service(
                format!("{name} Sleep Mode"),
                SleepSwitch::new(device),
            ));
        } else {
            services.push(climate_service);
        }

        info!(accessory = %name, ?variant, services = services.len(), "accessory ready");

        Self {
            name,
            services,
            startup_sync,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service(&self, kind: ServiceKind) -> Option<&Service> {
        self.services.iter().find(|s| s.kind() == kind)
    }

    /// The temperature sync started at construction, if one was started.
    pub fn take_startup_sync(&mut self) -> Option<JoinHandle<()>> {
        self.startup_sync.take()
    }
}

fn spawn_temperature_sync(
    climate: ClimateController,
    cooling: CachedValue,
    heating: CachedValue,
) -> Option<JoinHandle<()>> {
    let Ok(runtime) = Handle::try_current() else {
        debug!("no async runtime, skipping startup temperature sync");
        return None;
    };
    Some(runtime.spawn(sync_temperatures(climate, cooling, heating)))
}

/// Shows the device's setpoint on both threshold characteristics.
async fn sync_temperatures(
    climate: ClimateController,
    cooling: CachedValue,
    heating: CachedValue,
) {
    let celsius = climate.target_temperature().await;
    cooling.set(celsius);
    heating.set(celsius);
    info!(celsius, "threshold temperatures synchronised");
}

fn temperature_props() -> Props {
    Props::range(MIN_TEMPERATURE, MAX_TEMPERATURE, TEMPERATURE_STEP)
}

fn speed_props() -> Props {
    Props::range(0.0, 100.0, SPEED_STEP)
}

fn climate_service(name: String, climate: ClimateController) -> Service {
    let mut service = Service::new(ServiceKind::HeaterCooler, name);

    let c = climate.clone();
    let slot = service.characteristic(Characteristic::Active);
    slot.on_get(move || {
        let c = c.clone();
        async move { HapValue::from(Active::from(c.active().await)) }
    });
    let c = climate.clone();
    slot.on_set(move |value| {
        let c = c.clone();
        async move { c.set_active(Active::from_value(&value) == Active::Active).await }
    });

    let c = climate.clone();
    service
        .characteristic(Characteristic::CurrentHeaterCoolerState)
        .on_get(move || {
            let c = c.clone();
            async move { HapValue::from(c.current_state().await) }
        });

    let c = climate.clone();
    let slot = service.characteristic(Characteristic::TargetHeaterCoolerState);
    slot.set_props(Props::valid_values([
        TargetHeaterCoolerState::Auto as i64,
        TargetHeaterCoolerState::Cool as i64,
    ]));
    slot.on_get(move || {
        let c = c.clone();
        async move { HapValue::from(c.target_state().await) }
    });
    let c = climate.clone();
    slot.on_set(move |value| {
        let c = c.clone();
        async move {
            let state = TargetHeaterCoolerState::from_value(&value)
                .unwrap_or(TargetHeaterCoolerState::Cool);
            c.set_target_state(state).await
        }
    });

    let c = climate.clone();
    service
        .characteristic(Characteristic::CurrentTemperature)
        .on_get(move || {
            let c = c.clone();
            async move { HapValue::from(c.current_temperature().await) }
        });

    // Both thresholds write the one setpoint and both show the value sent.
    let cooling = service
        .characteristic(Characteristic::CoolingThresholdTemperature)
        .cache();
    let heating = service
        .characteristic(Characteristic::HeatingThresholdTemperature)
        .cache();
    for (characteristic, own, sibling) in [
        (Characteristic::CoolingThresholdTemperature, cooling.clone(), heating.clone()),
        (Characteristic::HeatingThresholdTemperature, heating, cooling),
    ] {
        let slot = service.characteristic(characteristic);
        slot.set_props(temperature_props());
        let c = climate.clone();
        slot.on_get(move || {
            let c = c.clone();
            async move { HapValue::from(c.target_temperature().await) }
        });
        let c = climate.clone();
        slot.on_set(move |value| {
            let c = c.clone();
            let own = own.clone();
            let sibling = sibling.clone();
            async move {
                let Some(celsius) = value.as_f64() else {
                    return;
                };
                let written = c.set_target_temperature(celsius).await;
                own.set(written);
                sibling.set(written);
            }
        });
    }

    let c = climate.clone();
    let slot = service.characteristic(Characteristic::RotationSpeed);
    slot.set_props(speed_props());
    slot.on_get(move || {
        let c = c.clone();
        async move { HapValue::from(c.rotation_speed().await) }
    });
    slot.on_set(move |value| {
        let c = climate.clone();
        async move { c.set_rotation_speed(value.as_f64().unwrap_or(0.0)).await }
    });

    service
}

fn fan_service(name: String, fan: CapabilityController) -> Service {
    let mut service = Service::new(ServiceKind::Fan, name);

    let f = fan.clone();
    let slot = service.characteristic(Characteristic::On);
    slot.on_get(move || {
        let f = f.clone();
        async move { HapValue::from(f.active().await) }
    });
    let f = fan.clone();
    slot.on_set(move |value| {
        let f = f.clone();
        async move { f.set_active(value.as_bool()).await }
    });

    add_rotation_speed(&mut service, fan);
    service
}

fn dehumidifier_service(name: String, dehumidifier: DehumidifierController) -> Service {
    let mut service = Service::new(ServiceKind::HumidifierDehumidifier, name);

    let d = dehumidifier.clone();
    let slot = service.characteristic(Characteristic::Active);
    slot.on_get(move || {
        let d = d.clone();
        async move { HapValue::from(Active::from(d.active().await)) }
    });
    let d = dehumidifier.clone();
    slot.on_set(move |value| {
        let d = d.clone();
        async move { d.set_active(Active::from_value(&value) == Active::Active).await }
    });

    let slot = service.characteristic(Characteristic::TargetHumidifierDehumidifierState);
    slot.on_get(|| async { HapValue::from(DehumidifierController::TARGET_STATE) });
    let d = dehumidifier.clone();
    slot.on_set(move |value| {
        let requested = match value.as_i64() {
            Some(0) => TargetHumidifierDehumidifierState::HumidifierOrDehumidifier,
            Some(1) => TargetHumidifierDehumidifierState::Humidifier,
            _ => TargetHumidifierDehumidifierState::Dehumidifier,
        };
        d.set_target_state(requested);
        async {}
    });

    let d = dehumidifier.clone();
    service
        .characteristic(Characteristic::CurrentHumidifierDehumidifierState)
        .on_get(move || {
            let d = d.clone();
            async move { HapValue::from(d.current_state().await) }
        });

    add_rotation_speed(&mut service, dehumidifier.core().clone());
    service
}

fn add_rotation_speed(service: &mut Service, controller: CapabilityController) {
    let c = controller.clone();
    let slot = service.characteristic(Characteristic::RotationSpeed);
    slot.set_props(speed_props());
    slot.on_get(move || {
        let c = c.clone();
        async move { HapValue::from(c.rotation_speed().await) }
    });
    slot.on_set(move |value| {
        let c = controller.clone();
        async move { c.set_rotation_speed(value.as_f64().unwrap_or(0.0)).await }
    });
}

fn sleep_service(name: String, sleep: SleepSwitch) -> Service {
    let mut service = Service::new(ServiceKind::Switch, name);

    let s = sleep.clone();
    let slot = service.characteristic(Characteristic::On);
    slot.on_get(move || {
        let s = s.clone();
        async move { HapValue::from(s.is_on().await) }
    });
    slot.on_set(move |value| {
        let s = sleep.clone();
        async move { s.set_on(value.as_bool()).await }
    });

    debug!(code = codes::SLEEP, "sleep switch registered");
    service
}
