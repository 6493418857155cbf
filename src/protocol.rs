use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{DataPoint, Status};
use crate::{Error, Result};

pub const TOKEN_PATH: &str = "/v1.0/token?grant_type=1";

/// Token lifetime assumed when the cloud omits `expire_time`.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 7200;

pub mod headers {
    pub const CLIENT_ID: &str = "client_id";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const SIGN: &str = "sign";
    pub const T: &str = "t";
    pub const SIGN_METHOD: &str = "sign_method";
    pub const NONCE: &str = "nonce";
}

/// Data-point codes of the air conditioner.
pub mod codes {
    pub const POWER: &str = "power";
    pub const MODE: &str = "mode";
    pub const TEMP_SET: &str = "temp_c_set";
    pub const TEMP_DISPLAY: &str = "temp_c_disp";
    pub const SPEED: &str = "speed";
    pub const SLEEP: &str = "sleep";
}

pub fn status_path(device_id: &str) -> String {
    format!("/v1.0/devices/{device_id}/status")
}

pub fn commands_path(device_id: &str) -> String {
    format!("/v1.0/devices/{device_id}/commands")
}

#[derive(Debug, Serialize)]
struct Commands<'a> {
    commands: [&'a DataPoint; 1],
}

/// Serialized `{"commands":[{"code":..,"value":..}]}` body, signed and sent verbatim.
pub fn command_body(command: &DataPoint) -> Result<String> {
    Ok(serde_json::to_string(&Commands {
        commands: [command],
    })?)
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    result: Value,
}

fn open_envelope(body: &str) -> Result<Value> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if envelope.success == Some(false) {
        return Err(Error::Api {
            code: envelope.code.unwrap_or_default(),
            msg: envelope.msg.unwrap_or_default(),
        });
    }
    Ok(envelope.result)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expire_time: u64,
}

pub fn parse_token_response(body: &str) -> Result<TokenGrant> {
    let result = open_envelope(body)?;
    let access_token = match result.get("access_token").and_then(|v| v.as_str()) {
        Some(token) if !token.is_empty() => token.to_string(),
        _ => return Err(Error::MissingToken),
    };
    let expire_time = result
        .get("expire_time")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
    Ok(TokenGrant {
        access_token,
        expire_time,
    })
}

pub fn parse_status_response(body: &str) -> Result<Status> {
    let result = open_envelope(body)?;
    if !result.is_array() {
        return Err(Error::Protocol(format!(
            "status result is not a data-point array: {result}"
        )));
    }
    let points: Vec<DataPoint> = serde_json::from_value(result)?;
    Ok(Status::from_data_points(points))
}

pub fn parse_command_response(body: &str) -> Result<()> {
    open_envelope(body).map(|_| ())
}
