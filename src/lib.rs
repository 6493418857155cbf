mod accessory;
pub mod config;
mod controller;
mod error;
mod gateway;
pub mod hap;
pub mod protocol;
mod session;
mod signer;
mod types;

pub use accessory::Accessory;
pub use config::AccessoryConfig;
pub use controller::{
    CapabilityController, ClimateController, DehumidifierController, Profile, SleepSwitch,
    DEFAULT_TEMPERATURE, MAX_TEMPERATURE, MIN_TEMPERATURE, TEMPERATURE_STEP,
};
pub use error::{Error, Result};
pub use gateway::{DeviceApi, DeviceGateway, DeviceGatewayBuilder};
pub use session::{SessionManager, TokenPolicy};
pub use signer::{string_to_sign, SignMode, Signature, Signer, SIGN_METHOD};
pub use types::*;
