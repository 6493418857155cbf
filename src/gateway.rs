use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::protocol::{
    command_body, commands_path, headers, parse_command_response, parse_status_response,
    status_path,
};
use crate::session::{SessionManager, TokenPolicy};
use crate::signer::{SignMode, Signer};
use crate::types::{Credentials, DataPoint, Region, Status};
use crate::Result;

/// What the capability controllers need from a device: read the status
/// snapshot and send one data-point command.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn get_status(&self) -> Result<Status>;

    async fn set_status(&self, code: &str, value: Value) -> Result<()>;
}

pub struct DeviceGatewayBuilder {
    credentials: Credentials,
    base_url: Option<String>,
    region: Region,
    token_policy: TokenPolicy,
    http: Option<reqwest::Client>,
}

impl DeviceGatewayBuilder {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            base_url: None,
            region: Region::default(),
            token_policy: TokenPolicy::default(),
            http: None,
        }
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    /// Overrides the region endpoint, e.g. to point at a local test server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn token_policy(mut self, policy: TokenPolicy) -> Self {
        self.token_policy = policy;
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<DeviceGateway> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder().build()?,
        };
        let base_url = self
            .base_url
            .unwrap_or_else(|| self.region.base_url().to_string())
            .trim_end_matches('/')
            .to_string();
        let signer = Signer::new(
            self.credentials.client_id.clone(),
            self.credentials.client_secret.clone(),
        );
        let session = SessionManager::new(
            http.clone(),
            base_url.clone(),
            signer.clone(),
            self.token_policy,
        );

        Ok(DeviceGateway {
            http,
            base_url,
            device_id: self.credentials.device_id,
            signer,
            session,
        })
    }
}

/// Signed access to one device's status and command endpoints.
pub struct DeviceGateway {
    http: reqwest::Client,
    base_url: String,
    device_id: String,
    signer: Signer,
    session: SessionManager,
}

impl DeviceGateway {
    pub fn builder(credentials: Credentials) -> DeviceGatewayBuilder {
        DeviceGatewayBuilder::new(credentials)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Fresh status snapshot; empty when anything along the way failed.
    pub async fn get_status(&self) -> Status {
        match self.try_get_status().await {
            Ok(status) => status,
            Err(e) => {
                error!(device = %self.device_id, error = %e, "status request failed");
                Status::default()
            }
        }
    }

    /// Sends one command; failures are logged and otherwise ignored.
    pub async fn set_status(&self, code: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Err(e) = self.try_set_status(code, value.clone()).await {
            error!(device = %self.device_id, code, %value, error = %e, "command failed");
        }
    }

    pub async fn try_get_status(&self) -> Result<Status> {
        self.session.ensure_token().await;
        let access_token = self.session.access_token();

        let path = status_path(&self.device_id);
        let url = format!("{}{}", self.base_url, path);
        debug!(path = %path, "fetching device status");

        let signature = self.signer.sign(
            "GET",
            &path,
            "",
            SignMode::Business {
                access_token: &access_token,
            },
        )?;
        let resp = signature
            .apply(self.http.get(&url), self.signer.client_id())
            .header(headers::ACCESS_TOKEN, &access_token)
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        parse_status_response(&body)
    }

    pub async fn try_set_status(&self, code: &str, value: Value) -> Result<()> {
        self.session.ensure_token().await;
        let access_token = self.session.access_token();

        let path = commands_path(&self.device_id);
        let url = format!("{}{}", self.base_url, path);
        let command = DataPoint::new(code, value);
        let body = command_body(&command)?;
        debug!(path = %path, body = %body, "sending command");

        let signature = self.signer.sign(
            "POST",
            &path,
            &body,
            SignMode::Business {
                access_token: &access_token,
            },
        )?;
        let resp = signature
            .apply(self.http.post(&url), self.signer.client_id())
            .header(headers::ACCESS_TOKEN, &access_token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        parse_command_response(&body)?;

        info!(code = %command.code, value = %command.value, "command accepted");
        Ok(())
    }
}

#[async_trait]
impl DeviceApi for DeviceGateway {
    async fn get_status(&self) -> Result<Status> {
        self.try_get_status().await
    }

    async fn set_status(&self, code: &str, value: Value) -> Result<()> {
        self.try_set_status(code, value).await
    }
}
