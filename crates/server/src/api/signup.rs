use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect};
use serde::Deserialize;

use msgbridge_gateway::SignupRequestMeta;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct SignupQuery {
    country: Option<String>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

/// `GET /signup` -- pick a channel number and redirect to its `wa.me` link.
pub async fn signup(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    Query(query): Query<SignupQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let meta = SignupRequestMeta {
        client_ip: addr.ip().to_string(),
        user_agent: header_value(&headers, "user-agent"),
        referer: header_value(&headers, "referer"),
        country_code: query.country,
    };

    let target = state.signup.redirect(meta).await.map_err(|e| ApiError::new("signup", e))?;
    Ok(Redirect::to(&target.redirect_url))
}
