use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace};

use crate::protocol::{parse_token_response, TokenGrant, TOKEN_PATH};
use crate::signer::{SignMode, Signer};
use crate::Result;

/// Tokens are treated as expired this long before the cloud says they are.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPolicy {
    /// Fetch a new token before every device call.
    #[default]
    AlwaysRefresh,
    /// Reuse a held token until its `expire_time` (less a margin) has passed.
    CacheUntilExpiry,
}

#[derive(Debug, Default)]
struct SessionState {
    access_token: String,
    expires_at: Option<Instant>,
}

/// Owns the access token of one cloud project.
///
/// The token is a plain string behind a lock that is never held across an
/// await; concurrent refreshes simply race and the last one wins.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
    signer: Signer,
    policy: TokenPolicy,
    state: RwLock<SessionState>,
}

impl SessionManager {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        signer: Signer,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            signer,
            policy,
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// The held token, empty if none was ever obtained.
    pub fn access_token(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    /// Makes a best effort to hold a usable token. Never fails: on error the
    /// previous (possibly empty) token is kept and the failure is logged.
    pub async fn ensure_token(&self) {
        if self.policy == TokenPolicy::CacheUntilExpiry && self.token_is_fresh() {
            trace!("reusing cached access token");
            return;
        }
        if let Err(e) = self.refresh().await {
            error!(error = %e, "access token request failed");
        }
    }

    /// Fetches a new token and stores it, replacing any previous one.
    pub async fn refresh(&self) -> Result<()> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        debug!(path = TOKEN_PATH, "requesting access token");

        let signature = self.signer.sign("GET", TOKEN_PATH, "", SignMode::Token)?;
        let resp = signature
            .apply(self.http.get(&url), self.signer.client_id())
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        let grant = parse_token_response(&body)?;
        self.store(grant);
        info!("access token obtained");
        Ok(())
    }

    fn store(&self, grant: TokenGrant) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.access_token = grant.access_token;
        state.expires_at = Some(
            Instant::now() + Duration::from_secs(grant.expire_time).saturating_sub(EXPIRY_MARGIN),
        );
    }

    fn token_is_fresh(&self) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        !state.access_token.is_empty()
            && state.expires_at.is_some_and(|deadline| Instant::now() < deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(policy: TokenPolicy) -> SessionManager {
        SessionManager::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Signer::new("cid", "secret"),
            policy,
        )
    }

    #[test]
    fn starts_empty() {
        let session = manager(TokenPolicy::AlwaysRefresh);
        assert_eq!(session.access_token(), "");
        assert!(!session.token_is_fresh());
    }

    #[test]
    fn stored_token_is_fresh_until_margin() {
        let session = manager(TokenPolicy::CacheUntilExpiry);
        session.store(TokenGrant {
            access_token: "tok".into(),
            expire_time: 7200,
        });
        assert_eq!(session.access_token(), "tok");
        assert!(session.token_is_fresh());

        session.store(TokenGrant {
            access_token: "short".into(),
            expire_time: 30,
        });
        assert_eq!(session.access_token(), "short");
        assert!(!session.token_is_fresh());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_token() {
        let session = manager(TokenPolicy::AlwaysRefresh);
        session.store(TokenGrant {
            access_token: "old".into(),
            expire_time: 7200,
        });
        session.ensure_token().await;
        assert_eq!(session.access_token(), "old");
    }
}
