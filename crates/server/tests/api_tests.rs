use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower::ServiceExt;

use msgbridge_audit_memory::MemoryAuditStore;
use msgbridge_gateway::{GatewayConfig, InMemoryWorkQueue};
use msgbridge_server::state::AppState;
use msgbridge_state_memory::{MemoryDistributedLock, MemoryStateStore};

const API_KEY: &str = "test-api-key";
const TRANSPORT_TOKEN: &str = "transport-secret";

struct NoopIdentity;
#[async_trait::async_trait]
impl msgbridge_identity::IdentityStore for NoopIdentity {
    async fn create_user(
        &self,
        _data: &msgbridge_identity::AccountCreationData,
    ) -> Result<String, msgbridge_identity::IdentityError> {
        Ok("user-1".into())
    }
    async fn get_user(
        &self,
        _identifier: &str,
        _identifier_type: msgbridge_identity::IdentifierType,
    ) -> Result<Option<msgbridge_identity::UserRecord>, msgbridge_identity::IdentityError> {
        Ok(None)
    }
}

struct NoopEmail;
#[async_trait::async_trait]
impl msgbridge_email::EmailSender for NoopEmail {
    async fn send_otp(&self, _email: &str, _otp: &str, _expiry_minutes: u32) -> Result<(), msgbridge_email::EmailError> {
        Ok(())
    }
}

struct NoopBackend;
#[async_trait::async_trait]
impl msgbridge_backend::ConversationBackend for NoopBackend {
    async fn get_conversation_id(&self, _user: &str) -> Result<Option<String>, msgbridge_backend::BackendError> {
        Ok(None)
    }
    async fn send(
        &self,
        _user: &str,
        _message: &str,
        _conversation_id: Option<&str>,
    ) -> Result<msgbridge_backend::BackendReply, msgbridge_backend::BackendError> {
        Ok(msgbridge_backend::BackendReply { answer: "ack".into(), conversation_id: Some("conv-1".into()) })
    }
}

struct NoopTransport;
#[async_trait::async_trait]
impl msgbridge_transport::MessagingTransport for NoopTransport {
    async fn send(
        &self,
        _to: &str,
        _from: &msgbridge_core::ChannelNumber,
        _body: &str,
        _media: Option<&msgbridge_transport::OutboundMedia>,
    ) -> Result<(), msgbridge_transport::TransportError> {
        Ok(())
    }
    async fn validate_media_url(&self, _url: &str) -> bool {
        true
    }
}

fn test_state() -> AppState {
    let config = GatewayConfig::new(API_KEY, TRANSPORT_TOKEN, vec![msgbridge_core::ChannelNumber::new("+15551234567")]);
    let (queue, receivers) = InMemoryWorkQueue::new(8);
    // Nothing in these tests drains the queue; leak the receiving end so the
    // channel stays open instead of the handler's `enqueue` failing because
    // every receiver has been dropped.
    std::mem::forget(receivers);
    AppState::new(
        config,
        Arc::new(MemoryStateStore::new()),
        Arc::new(MemoryDistributedLock::new()),
        Arc::new(MemoryAuditStore::new()),
        Arc::new(NoopIdentity),
        Arc::new(NoopEmail),
        Arc::new(NoopBackend),
        Arc::new(NoopTransport),
        Arc::new(queue),
    )
}

fn app() -> axum::Router {
    msgbridge_server::api::router(test_state())
}

/// `/webhook` and `/signup` extract `ConnectInfo<SocketAddr>`, which `axum::serve`
/// only populates via `into_make_service_with_connect_info`; `oneshot` bypasses
/// that, so tests exercising those routes must insert the extension by hand.
fn with_connect_info(mut request: Request<Body>) -> Request<Body> {
    let addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn sign(auth_token: &str, url: &str, form: &[(&str, &str)]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(auth_token.as_bytes()).unwrap();
    mac.update(url.as_bytes());
    for (key, value) in form {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

fn webhook_form_body() -> (String, String) {
    let fields: Vec<(&str, &str)> =
        vec![("Body", "hello there"), ("From", "whatsapp:+15551234567"), ("MessageSid", "SM123"), ("NumMedia", "0"), ("To", "+15557654321")];
    let mut sorted = fields.clone();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let signature = sign(TRANSPORT_TOKEN, "https://gateway.example/webhook", &sorted);
    let body = serde_urlencoded::to_string(&fields).unwrap();
    (body, signature)
}

#[tokio::test]
async fn health_endpoint_is_public_and_reports_components() {
    let response =
        app().oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_reject_missing_api_key() {
    let response = app()
        .oneshot(Request::builder().method("GET").uri("/stats/load").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn protected_routes_accept_matching_api_key() {
    let response = app()
        .oneshot(Request::builder().method("GET").uri("/stats/load").header("x-api-key", API_KEY).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn request_id_is_generated_when_absent_and_echoed_when_present() {
    let response = app().oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert!(response.headers().get("x-request-id").is_some());

    let app = app();
    let response = app
        .oneshot(Request::builder().uri("/health").header("x-request-id", "caller-supplied-id").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "caller-supplied-id");
}

#[tokio::test]
async fn webhook_is_accepted_then_deduplicated() {
    let state = test_state();
    let app = msgbridge_server::api::router(state);
    let (body, signature) = webhook_form_body();

    let first = app
        .clone()
        .oneshot(with_connect_info(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("host", "gateway.example")
                .header("x-forwarded-proto", "https")
                .header("x-transport-signature", &signature)
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(body.clone()))
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(with_connect_info(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("host", "gateway.example")
                .header("x-forwarded-proto", "https")
                .header("x-transport-signature", &signature)
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["detail"], "Duplicate message");
}

#[tokio::test]
async fn webhook_rejects_bad_signature() {
    let app = app();
    let (body, _signature) = webhook_form_body();

    let response = app
        .oneshot(with_connect_info(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("host", "gateway.example")
                .header("x-forwarded-proto", "https")
                .header("x-transport-signature", "not-a-real-signature")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn check_email_before_check_phone_is_a_sequence_violation() {
    let app = app();
    let payload = serde_json::json!({ "phone_number": "+15551234567", "email": "user@example.com" });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/check_email")
                .header("x-api-key", API_KEY)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["error_code"], "SEQUENCE_VIOLATION");
}

#[tokio::test]
async fn check_phone_then_check_email_advances_the_sequence() {
    let app = app();

    let phone_payload = serde_json::json!({ "phone_number": "+15551234567" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/check_phone")
                .header("x-api-key", API_KEY)
                .header("content-type", "application/json")
                .body(Body::from(phone_payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let email_payload = serde_json::json!({ "phone_number": "+15551234567", "email": "user@example.com" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/check_email")
                .header("x-api-key", API_KEY)
                .header("content-type", "application/json")
                .body(Body::from(email_payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["next_action"], "create_account");
}

#[tokio::test]
async fn check_phone_is_rate_limited_per_phone_number() {
    let app = app();
    let phone_payload = serde_json::json!({ "phone_number": "+15557654321" });

    let request = || {
        Request::builder()
            .method("POST")
            .uri("/check_phone")
            .header("x-api-key", API_KEY)
            .header("content-type", "application/json")
            .body(Body::from(phone_payload.to_string()))
            .unwrap()
    };

    // Default rate limit (no RATE_LIMIT_check_phone_* configured) admits 21
    // requests in the window before the 22nd is denied.
    for _ in 0..21 {
        let response = app.clone().oneshot(request()).await.unwrap();
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    let response = app.oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["error_code"], "RATE_LIMIT");
    assert!(value["retry_after"].as_u64().is_some());
}

#[tokio::test]
async fn signup_redirects_to_wa_me() {
    let app = app();
    let response = app.oneshot(with_connect_info(Request::builder().uri("/signup").body(Body::empty()).unwrap())).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(response.headers().get("location").unwrap().to_str().unwrap().contains("wa.me"));
}
