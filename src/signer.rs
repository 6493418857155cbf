use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::protocol::headers;
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGN_METHOD: &str = "HMAC-SHA256";

/// Which key material goes into the HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMode<'a> {
    /// Token acquisition: no access token is bound into the signature.
    Token,
    /// Every other call: the held access token is bound in after the client id.
    Business { access_token: &'a str },
}

impl SignMode<'_> {
    fn access_token(&self) -> &str {
        match self {
            SignMode::Token => "",
            SignMode::Business { access_token } => access_token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub sign: String,
    pub t: String,
    pub nonce: String,
}

/// Computes OpenAPI request signatures for one cloud project.
#[derive(Clone)]
pub struct Signer {
    client_id: String,
    client_secret: String,
}

impl Signer {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Signs with the current time and a fresh nonce.
    ///
    /// `path` must include the query string and `body` must be the exact bytes
    /// sent, or the cloud rejects the request.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        body: &str,
        mode: SignMode<'_>,
    ) -> Result<Signature> {
        let t = Utc::now().timestamp_millis().to_string();
        let nonce = Uuid::new_v4().simple().to_string();
        self.sign_at(method, path, body, mode, &t, &nonce)
    }

    pub fn sign_at(
        &self,
        method: &str,
        path: &str,
        body: &str,
        mode: SignMode<'_>,
        t: &str,
        nonce: &str,
    ) -> Result<Signature> {
        let string_to_sign = string_to_sign(method, path, body);
        let payload = format!(
            "{}{}{t}{nonce}{string_to_sign}",
            self.client_id,
            mode.access_token()
        );

        let mut mac = HmacSha256::new_from_slice(self.client_secret.as_bytes())
            .map_err(|e| Error::Config(format!("client secret rejected as signing key: {e}")))?;
        mac.update(payload.as_bytes());
        let sign = hex::encode_upper(mac.finalize().into_bytes());

        Ok(Signature {
            sign,
            t: t.to_string(),
            nonce: nonce.to_string(),
        })
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl Signature {
    /// Attaches the signature headers common to every call.
    pub fn apply(&self, req: reqwest::RequestBuilder, client_id: &str) -> reqwest::RequestBuilder {
        req.header(headers::CLIENT_ID, client_id)
            .header(headers::SIGN, &self.sign)
            .header(headers::T, &self.t)
            .header(headers::SIGN_METHOD, SIGN_METHOD)
            .header(headers::NONCE, &self.nonce)
    }
}

/// `METHOD \n sha256(body) \n <signature headers, unused> \n path`
pub fn string_to_sign(method: &str, path: &str, body: &str) -> String {
    let content_sha256 = hex::encode(Sha256::digest(body.as_bytes()));
    format!("{method}\n{content_sha256}\n\n{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: &str = "1700000000000";
    const NONCE: &str = "5138cc3a9033d69856923fd07b491173";

    fn signer() -> Signer {
        Signer::new("client", "secret")
    }

    #[test]
    fn empty_body_hash() {
        let s = string_to_sign("GET", "/v1.0/token?grant_type=1", "");
        assert_eq!(
            s,
            "GET\ne3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\n\n/v1.0/token?grant_type=1"
        );
    }

    #[test]
    fn deterministic_with_fixed_inputs() {
        let path = "/v1.0/token?grant_type=1";
        let a = signer().sign_at("GET", path, "", SignMode::Token, T, NONCE).unwrap();
        let b = signer().sign_at("GET", path, "", SignMode::Token, T, NONCE).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sign.len(), 64);
        assert_eq!(a.sign, a.sign.to_uppercase());
        assert_eq!(a.t, T);
        assert_eq!(a.nonce, NONCE);
    }

    #[test]
    fn matches_reference_hmac() {
        let path = "/v1.0/devices/abc/status";
        let expected_payload = format!("clientTOKEN{T}{NONCE}{}", string_to_sign("GET", path, ""));
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(expected_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes()).to_uppercase();

        let sig = signer().sign_at(
            "GET",
            path,
            "",
            SignMode::Business { access_token: "TOKEN" },
            T,
            NONCE,
        ).unwrap();
        assert_eq!(sig.sign, expected);
    }

    #[test]
    fn business_mode_binds_token() {
        let path = "/v1.0/devices/abc/commands";
        let body = r#"{"commands":[{"code":"power","value":true}]}"#;
        let token = signer().sign_at("POST", path, body, SignMode::Token, T, NONCE).unwrap();
        let business = signer().sign_at(
            "POST",
            path,
            body,
            SignMode::Business { access_token: "abc123" },
            T,
            NONCE,
        ).unwrap();
        assert_ne!(token.sign, business.sign);

        let empty = signer().sign_at(
            "POST",
            path,
            body,
            SignMode::Business { access_token: "" },
            T,
            NONCE,
        ).unwrap();
        assert_eq!(token.sign, empty.sign);
    }

    #[test]
    fn body_changes_signature() {
        let path = "/v1.0/devices/abc/commands";
        let a = signer().sign_at("POST", path, "{}", SignMode::Token, T, NONCE).unwrap();
        let b = signer().sign_at("POST", path, "{ }", SignMode::Token, T, NONCE).unwrap();
        assert_ne!(a.sign, b.sign);
    }

    #[test]
    fn fresh_nonce_per_call() {
        let a = signer().sign("GET", "/v1.0/token?grant_type=1", "", SignMode::Token).unwrap();
        let b = signer().sign("GET", "/v1.0/token?grant_type=1", "", SignMode::Token).unwrap();
        assert_eq!(a.nonce.len(), 32);
        assert!(!a.nonce.contains('-'));
        assert_ne!(a.nonce, b.nonce);
        assert!(a.t.parse::<i64>().is_ok());
    }

    #[test]
    fn empty_secret_still_signs() {
        let sig = Signer::new("client", "")
            .sign_at("GET", "/v1.0/token?grant_type=1", "", SignMode::Token, T, NONCE)
            .expect("any key length is accepted");
        assert_eq!(sig.sign.len(), 64);
    }
}
