use serde_json::json;
use tuya_cloud_ac::{
    Credentials, DeviceGateway, Error, SignMode, Signer, TokenPolicy, SIGN_METHOD,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const DEVICE: &str = "bf0123456789abcdef";
const CLIENT_ID: &str = "client-id";
const SECRET: &str = "client-secret";
const STATUS_PATH: &str = "/v1.0/devices/bf0123456789abcdef/status";
const COMMANDS_PATH: &str = "/v1.0/devices/bf0123456789abcdef/commands";

/// Accepts a request only if its `sign` header matches what the cloud would compute.
struct ValidSignature {
    access_token: Option<&'static str>,
}

impl Match for ValidSignature {
    fn matches(&self, request: &Request) -> bool {
        let header = |name: &str| request.headers.get(name).and_then(|v| v.to_str().ok());
        let (Some(sign), Some(t), Some(nonce)) = (header("sign"), header("t"), header("nonce"))
        else {
            return false;
        };
        let mut signed_path = request.url.path().to_string();
        if let Some(query) = request.url.query() {
            signed_path.push('?');
            signed_path.push_str(query);
        }
        let body = String::from_utf8_lossy(&request.body);
        let mode = match self.access_token {
            Some(access_token) => SignMode::Business { access_token },
            None => SignMode::Token,
        };
        let Ok(expected) = Signer::new(CLIENT_ID, SECRET).sign_at(
            request.method.as_str(),
            &signed_path,
            &body,
            mode,
            t,
            nonce,
        ) else {
            return false;
        };
        expected.sign == sign
    }
}

fn token_body(token: &str) -> serde_json::Value {
    json!({
        "success": true,
        "t": 1700000000000_u64,
        "result": { "access_token": token, "expire_time": 7200, "uid": "u1" }
    })
}

fn status_body(points: serde_json::Value) -> serde_json::Value {
    json!({ "success": true, "t": 1700000000000_u64, "result": points })
}

fn token_mock(token: &str) -> Mock {
    Mock::given(method("GET"))
        .and(path("/v1.0/token"))
        .and(query_param("grant_type", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token)))
}

fn gateway(server: &MockServer) -> DeviceGateway {
    DeviceGateway::builder(Credentials::new(DEVICE, CLIENT_ID, SECRET))
        .base_url(server.uri())
        .build()
        .expect("gateway should build")
}

#[tokio::test]
async fn token_request_is_signed_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/token"))
        .and(query_param("grant_type", "1"))
        .and(header("client_id", CLIENT_ID))
        .and(header("sign_method", SIGN_METHOD))
        .and(ValidSignature { access_token: None })
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1")))
        .expect(1)
        .mount(&server)
        .await;

    let gw = gateway(&server);
    gw.session().refresh().await.expect("token refresh should succeed");
    assert_eq!(gw.session().access_token(), "tok-1");
}

#[tokio::test]
async fn status_uses_business_signature() {
    let server = MockServer::start().await;
    token_mock("tok-1").mount(&server).await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .and(header("client_id", CLIENT_ID))
        .and(header("access_token", "tok-1"))
        .and(ValidSignature {
            access_token: Some("tok-1"),
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(json!([
            { "code": "power", "value": true },
            { "code": "mode", "value": "cool" },
            { "code": "temp_c_set", "value": 24 },
            { "code": "speed", "value": "high" }
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let status = gateway(&server).get_status().await;
    assert!(status.power());
    assert_eq!(status.mode(), Some("cool"));
    assert_eq!(status.number_or("temp_c_set", 22.0), 24.0);
    assert_eq!(status.len(), 4);
}

#[tokio::test]
async fn duplicate_codes_last_wins() {
    let server = MockServer::start().await;
    token_mock("tok-1").mount(&server).await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(json!([
            { "code": "power", "value": true },
            { "code": "power", "value": false }
        ]))))
        .mount(&server)
        .await;

    let status = gateway(&server).get_status().await;
    assert!(!status.power());
    assert_eq!(status.get("power"), Some(&json!(false)));
}

#[tokio::test]
async fn command_envelope_is_signed_over_exact_body() {
    let server = MockServer::start().await;
    token_mock("tok-1").mount(&server).await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(header("access_token", "tok-1"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "commands": [{ "code": "speed", "value": "low" }] })))
        .and(ValidSignature {
            access_token: Some("tok-1"),
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "result": true })))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server)
        .try_set_status("speed", json!("low"))
        .await
        .expect("command should be accepted");
}

#[tokio::test]
async fn every_call_fetches_a_new_token() {
    let server = MockServer::start().await;
    token_mock("tok-1").expect(3).mount(&server).await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(json!([]))))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let gw = gateway(&server);
    gw.get_status().await;
    gw.get_status().await;
    gw.set_status("power", true).await;
}

#[tokio::test]
async fn cached_token_is_reused_until_expiry() {
    let server = MockServer::start().await;
    token_mock("tok-1").expect(1).mount(&server).await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .and(header("access_token", "tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(json!([]))))
        .expect(3)
        .mount(&server)
        .await;

    let gw = DeviceGateway::builder(Credentials::new(DEVICE, CLIENT_ID, SECRET))
        .base_url(server.uri())
        .token_policy(TokenPolicy::CacheUntilExpiry)
        .build()
        .unwrap();
    for _ in 0..3 {
        gw.try_get_status().await.expect("status should succeed");
    }
}

#[tokio::test]
async fn status_failure_yields_empty_snapshot_and_commands_still_go_out() {
    let server = MockServer::start().await;
    token_mock("tok-1").mount(&server).await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let gw = gateway(&server);
    assert!(gw.get_status().await.is_empty());
    gw.set_status("power", false).await;
}

#[tokio::test]
async fn token_failure_keeps_token_empty_and_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false, "code": 1004, "msg": "sign invalid"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false, "code": 1010, "msg": "token invalid"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gw = gateway(&server);
    assert!(gw.get_status().await.is_empty());
    assert_eq!(gw.session().access_token(), "");
}

#[tokio::test]
async fn refresh_reports_missing_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "result": {} })))
        .mount(&server)
        .await;

    let err = gateway(&server).session().refresh().await.unwrap_err();
    assert!(matches!(err, Error::MissingToken), "got {err:?}");
}

#[tokio::test]
async fn rejected_command_is_an_api_error() {
    let server = MockServer::start().await;
    token_mock("tok-1").mount(&server).await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false, "code": 2008, "msg": "command or value not support"
        })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .try_set_status("mode", json!("heat"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { code: 2008, .. }), "got {err:?}");
}

#[tokio::test]
async fn unreachable_cloud_degrades_without_panicking() {
    let gw = DeviceGateway::builder(Credentials::new(DEVICE, CLIENT_ID, SECRET))
        .base_url("http://127.0.0.1:9")
        .build()
        .unwrap();
    assert!(gw.get_status().await.is_empty());
    gw.set_status("power", true).await;
    assert!(matches!(gw.try_get_status().await, Err(Error::Http(_))));
}
