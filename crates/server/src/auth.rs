use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::state::AppState;

/// Rejects any request whose `X-API-Key` header does not match
/// [`AppState::config`]'s configured key.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request.headers().get("x-api-key").and_then(|v| v.to_str().ok());

    if provided != Some(state.config.api_key.as_str()) {
        let body = serde_json::json!({ "status": "failed", "message": "missing or invalid API key", "error_code": "FORBIDDEN" });
        return (StatusCode::FORBIDDEN, Json(body)).into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use axum::Router;
    use msgbridge_gateway::GatewayConfig;
    use tower::ServiceExt;

    fn minimal_state(api_key: &str) -> AppState {
        use msgbridge_audit_memory::MemoryAuditStore;
        use msgbridge_state_memory::{MemoryDistributedLock, MemoryStateStore};
        use std::sync::Arc;

        struct NoopIdentity;
        #[async_trait::async_trait]
        impl msgbridge_identity::IdentityStore for NoopIdentity {
            async fn create_user(
                &self,
                _data: &msgbridge_identity::AccountCreationData,
            ) -> Result<String, msgbridge_identity::IdentityError> {
                unimplemented!()
            }
            async fn get_user(
                &self,
                _identifier: &str,
                _identifier_type: msgbridge_identity::IdentifierType,
            ) -> Result<Option<msgbridge_identity::UserRecord>, msgbridge_identity::IdentityError> {
                unimplemented!()
            }
        }

        struct NoopEmail;
        #[async_trait::async_trait]
        impl msgbridge_email::EmailSender for NoopEmail {
            async fn send_otp(&self, _email: &str, _otp: &str, _expiry_minutes: u32) -> Result<(), msgbridge_email::EmailError> {
                unimplemented!()
            }
        }

        struct NoopBackend;
        #[async_trait::async_trait]
        impl msgbridge_backend::ConversationBackend for NoopBackend {
            async fn get_conversation_id(&self, _user: &str) -> Result<Option<String>, msgbridge_backend::BackendError> {
                unimplemented!()
            }
            async fn send(
                &self,
                _user: &str,
                _message: &str,
                _conversation_id: Option<&str>,
            ) -> Result<msgbridge_backend::BackendReply, msgbridge_backend::BackendError> {
                unimplemented!()
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
                unimplemented!()
            }
            async fn validate_media_url(&self, _url: &str) -> bool {
                unimplemented!()
            }
        }

        let config = GatewayConfig::new(api_key, "token", vec![msgbridge_core::ChannelNumber::new("+15551234567")]);
        let (queue, _rx) = msgbridge_gateway::InMemoryWorkQueue::new(8);
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

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
            .with_state(state)
    }

    #[tokio::test]
    async fn rejects_missing_key() {
        let app = router(minimal_state("secret"));
        let response =
            app.oneshot(HttpRequest::builder().uri("/protected").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn accepts_matching_key() {
        let app = router(minimal_state("secret"));
        let response = app
            .oneshot(
                HttpRequest::builder().uri("/protected").header("x-api-key", "secret").body(Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
