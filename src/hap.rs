//! The slice of a HomeKit-style accessory framework the controllers rely on.
//!
//! A host binding walks [`Service`]s, calls [`Service::get`] / [`Service::set`]
//! when the home app reads or writes a characteristic, and renders
//! [`Service::value`] as the last known display value.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum HapValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl HapValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HapValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            HapValue::Int(i) => Some(*i as f64),
            HapValue::Float(f) => Some(*f),
            HapValue::String(s) => s.parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HapValue::Float(f) => Some(f.round() as i64),
            other => other.as_f64().map(|f| f as i64),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            HapValue::Bool(b) => *b,
            HapValue::Int(i) => *i != 0,
            HapValue::Float(f) => *f != 0.0,
            HapValue::String(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for HapValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HapValue::Bool(b) => write!(f, "{b}"),
            HapValue::Int(i) => write!(f, "{i}"),
            HapValue::Float(v) => write!(f, "{v}"),
            HapValue::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for HapValue {
    fn from(v: bool) -> Self {
        HapValue::Bool(v)
    }
}

impl From<u8> for HapValue {
    fn from(v: u8) -> Self {
        HapValue::Int(v as i64)
    }
}

impl From<i64> for HapValue {
    fn from(v: i64) -> Self {
        HapValue::Int(v)
    }
}

impl From<f64> for HapValue {
    fn from(v: f64) -> Self {
        HapValue::Float(v)
    }
}

impl From<&str> for HapValue {
    fn from(v: &str) -> Self {
        HapValue::String(v.to_string())
    }
}

impl From<String> for HapValue {
    fn from(v: String) -> Self {
        HapValue::String(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    AccessoryInformation,
    HeaterCooler,
    Fan,
    HumidifierDehumidifier,
    Switch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    Name,
    Manufacturer,
    Model,
    SerialNumber,
    Active,
    On,
    CurrentHeaterCoolerState,
    TargetHeaterCoolerState,
    CurrentTemperature,
    CoolingThresholdTemperature,
    HeatingThresholdTemperature,
    RotationSpeed,
    CurrentHumidifierDehumidifierState,
    TargetHumidifierDehumidifierState,
}

impl Characteristic {
    pub fn name(&self) -> &'static str {
        match self {
            Characteristic::Name => "Name",
            Characteristic::Manufacturer => "Manufacturer",
            Characteristic::Model => "Model",
            Characteristic::SerialNumber => "SerialNumber",
            Characteristic::Active => "Active",
            Characteristic::On => "On",
            Characteristic::CurrentHeaterCoolerState => "CurrentHeaterCoolerState",
            Characteristic::TargetHeaterCoolerState => "TargetHeaterCoolerState",
            Characteristic::CurrentTemperature => "CurrentTemperature",
            Characteristic::CoolingThresholdTemperature => "CoolingThresholdTemperature",
            Characteristic::HeatingThresholdTemperature => "HeatingThresholdTemperature",
            Characteristic::RotationSpeed => "RotationSpeed",
            Characteristic::CurrentHumidifierDehumidifierState => {
                "CurrentHumidifierDehumidifierState"
            }
            Characteristic::TargetHumidifierDehumidifierState => {
                "TargetHumidifierDehumidifierState"
            }
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Active {
    Inactive = 0,
    Active = 1,
}

impl Active {
    pub fn from_value(value: &HapValue) -> Self {
        if value.as_i64() == Some(Active::Active as i64) {
            Active::Active
        } else {
            Active::Inactive
        }
    }
}

impl From<bool> for Active {
    fn from(on: bool) -> Self {
        if on { Active::Active } else { Active::Inactive }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetHeaterCoolerState {
    Auto = 0,
    Heat = 1,
    Cool = 2,
}

impl TargetHeaterCoolerState {
    pub fn from_value(value: &HapValue) -> Option<Self> {
        match value.as_i64()? {
            0 => Some(TargetHeaterCoolerState::Auto),
            1 => Some(TargetHeaterCoolerState::Heat),
            2 => Some(TargetHeaterCoolerState::Cool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentHeaterCoolerState {
    Inactive = 0,
    Idle = 1,
    Heating = 2,
    Cooling = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetHumidifierDehumidifierState {
    HumidifierOrDehumidifier = 0,
    Humidifier = 1,
    Dehumidifier = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentHumidifierDehumidifierState {
    Inactive = 0,
    Idle = 1,
    Humidifying = 2,
    Dehumidifying = 3,
}

macro_rules! enum_into_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for HapValue {
            fn from(v: $ty) -> Self {
                HapValue::Int(v as i64)
            }
        })*
    };
}

enum_into_value!(
    Active,
    TargetHeaterCoolerState,
    CurrentHeaterCoolerState,
    TargetHumidifierDehumidifierState,
    CurrentHumidifierDehumidifierState
);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_step: Option<f64>,
    pub valid_values: Option<Vec<i64>>,
}

impl Props {
    pub fn range(min: f64, max: f64, step: f64) -> Self {
        Self {
            min_value: Some(min),
            max_value: Some(max),
            min_step: Some(step),
            valid_values: None,
        }
    }

    pub fn valid_values(values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            valid_values: Some(values.into_iter().collect()),
            ..Default::default()
        }
    }
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
type ReadFn = Arc<dyn Fn() -> BoxFuture<HapValue> + Send + Sync>;
type WriteFn = Arc<dyn Fn(HapValue) -> BoxFuture<()> + Send + Sync>;

/// The host's last known display value of one characteristic.
#[derive(Debug, Clone, Default)]
pub struct CachedValue(Arc<Mutex<Option<HapValue>>>);

impl CachedValue {
    pub fn get(&self) -> Option<HapValue> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, value: impl Into<HapValue>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.into());
    }
}

pub struct CharacteristicSlot {
    characteristic: Characteristic,
    props: Option<Props>,
    value: CachedValue,
    on_get: Option<ReadFn>,
    on_set: Option<WriteFn>,
}

impl CharacteristicSlot {
    fn new(characteristic: Characteristic) -> Self {
        Self {
            characteristic,
            props: None,
            value: CachedValue::default(),
            on_get: None,
            on_set: None,
        }
    }

    pub fn characteristic(&self) -> Characteristic {
        self.characteristic
    }

    pub fn props(&self) -> Option<&Props> {
        self.props.as_ref()
    }

    pub fn set_props(&mut self, props: Props) -> &mut Self {
        self.props = Some(props);
        self
    }

    /// Shared handle on this characteristic's display value.
    pub fn cache(&self) -> CachedValue {
        self.value.clone()
    }

    pub fn on_get<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HapValue> + Send + 'static,
    {
        self.on_get = Some(Arc::new(move || -> BoxFuture<HapValue> { Box::pin(f()) }));
        self
    }

    pub fn on_set<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(HapValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_set = Some(Arc::new(move |v| -> BoxFuture<()> { Box::pin(f(v)) }));
        self
    }

    pub fn is_writable(&self) -> bool {
        self.on_set.is_some()
    }
}

pub struct Service {
    kind: ServiceKind,
    name: String,
    slots: Vec<CharacteristicSlot>,
}

impl Service {
    pub fn new(kind: ServiceKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut service = Self {
            kind,
            name: String::new(),
            slots: Vec::new(),
        };
        service.characteristic(Characteristic::Name).cache().set(name.as_str());
        service.name = name;
        service
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The slot for `characteristic`, created on first use.
    pub fn characteristic(&mut self, characteristic: Characteristic) -> &mut CharacteristicSlot {
        let idx = match self
            .slots
            .iter()
            .position(|s| s.characteristic == characteristic)
        {
            Some(idx) => idx,
            None => {
                self.slots.push(CharacteristicSlot::new(characteristic));
                self.slots.len() - 1
            }
        };
        &mut self.slots[idx]
    }

    pub fn set_characteristic(
        mut self,
        characteristic: Characteristic,
        value: impl Into<HapValue>,
    ) -> Self {
        self.characteristic(characteristic).cache().set(value);
        self
    }

    pub fn characteristics(&self) -> impl Iterator<Item = Characteristic> + '_ {
        self.slots.iter().map(|s| s.characteristic)
    }

    pub fn has(&self, characteristic: Characteristic) -> bool {
        self.slot(characteristic).is_some()
    }

    pub fn props(&self, characteristic: Characteristic) -> Option<&Props> {
        self.slot(characteristic).and_then(|s| s.props())
    }

    pub fn cached(&self, characteristic: Characteristic) -> Option<CachedValue> {
        self.slot(characteristic).map(|s| s.cache())
    }

    /// Last known display value, without running any handler.
    pub fn value(&self, characteristic: Characteristic) -> Option<HapValue> {
        self.slot(characteristic).and_then(|s| s.value.get())
    }

    /// Pushes a display value without running any handler.
    pub fn update_characteristic(&self, characteristic: Characteristic, value: impl Into<HapValue>) {
        if let Some(slot) = self.slot(characteristic) {
            slot.value.set(value);
        }
    }

    /// Runs the read handler, if any, and records the result as the display value.
    pub async fn get(&self, characteristic: Characteristic) -> Option<HapValue> {
        let slot = self.slot(characteristic)?;
        match &slot.on_get {
            Some(read) => {
                let value = read().await;
                trace!(service = %self.name, %characteristic, %value, "read");
                slot.value.set(value.clone());
                Some(value)
            }
            None => slot.value.get(),
        }
    }

    /// Records `value` as the display value, then runs the write handler.
    pub async fn set(&self, characteristic: Characteristic, value: impl Into<HapValue>) {
        let Some(slot) = self.slot(characteristic) else {
            return;
        };
        let value = value.into();
        trace!(service = %self.name, %characteristic, %value, "write");
        slot.value.set(value.clone());
        if let Some(write) = &slot.on_set {
            write(value).await;
        }
    }

    fn slot(&self, characteristic: Characteristic) -> Option<&CharacteristicSlot> {
        self.slots.iter().find(|s| s.characteristic == characteristic)
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("characteristics", &self.characteristics().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_values() {
        assert_eq!(HapValue::from(Active::Active), HapValue::Int(1));
        assert_eq!(HapValue::from(TargetHeaterCoolerState::Cool), HapValue::Int(2));
        assert_eq!(
            HapValue::from(CurrentHumidifierDehumidifierState::Dehumidifying),
            HapValue::Int(3)
        );
        assert_eq!(Active::from_value(&HapValue::Int(1)), Active::Active);
        assert_eq!(Active::from_value(&HapValue::Bool(false)), Active::Inactive);
        assert_eq!(
            TargetHeaterCoolerState::from_value(&HapValue::Int(0)),
            Some(TargetHeaterCoolerState::Auto)
        );
    }

    #[test]
    fn static_characteristics() {
        let svc = Service::new(ServiceKind::AccessoryInformation, "Info")
            .set_characteristic(Characteristic::Manufacturer, "Acme");
        assert_eq!(svc.value(Characteristic::Name), Some(HapValue::from("Info")));
        assert_eq!(svc.value(Characteristic::Manufacturer), Some(HapValue::from("Acme")));
        assert_eq!(svc.value(Characteristic::Model), None);
    }

    #[tokio::test]
    async fn get_records_display_value() {
        let mut svc = Service::new(ServiceKind::Switch, "S");
        svc.characteristic(Characteristic::On)
            .on_get(|| async { HapValue::Bool(true) });
        assert_eq!(svc.get(Characteristic::On).await, Some(HapValue::Bool(true)));
        assert_eq!(svc.value(Characteristic::On), Some(HapValue::Bool(true)));
        assert_eq!(svc.get(Characteristic::RotationSpeed).await, None);
    }

    #[tokio::test]
    async fn set_runs_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut svc = Service::new(ServiceKind::Switch, "S");
        let sink = seen.clone();
        svc.characteristic(Characteristic::On).on_set(move |v| {
            let sink = sink.clone();
            async move { sink.lock().unwrap().push(v) }
        });
        svc.set(Characteristic::On, true).await;
        assert_eq!(*seen.lock().unwrap(), vec![HapValue::Bool(true)]);
        assert_eq!(svc.value(Characteristic::On), Some(HapValue::Bool(true)));
    }

    #[test]
    fn update_only_touches_cache() {
        let mut svc = Service::new(ServiceKind::HeaterCooler, "AC");
        let cache = svc.characteristic(Characteristic::HeatingThresholdTemperature).cache();
        svc.update_characteristic(Characteristic::HeatingThresholdTemperature, 25_i64);
        assert_eq!(cache.get(), Some(HapValue::Int(25)));
    }
}
