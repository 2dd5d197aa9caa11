use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /stats/load` -- point-in-time load snapshot for every configured
/// channel number, advisory only.
pub async fn stats_load(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let snapshots = state.load_balancer.loads().await.map_err(|e| ApiError::new("stats_load", e))?;

    let stats: Vec<_> = snapshots
        .iter()
        .map(|s| {
            serde_json::json!({
                "number": s.number.as_str(),
                "message_count": s.message_count,
                "load_fraction": s.load_fraction,
            })
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let aggregate = if snapshots.is_empty() {
        0.0
    } else {
        snapshots.iter().map(|s| s.load_fraction).sum::<f64>() / snapshots.len() as f64
    };

    let body = serde_json::json!({
        "stats": stats,
        "aggregate": aggregate,
        "thresholds": {
            "high": state.config.high_threshold,
            "alert": state.config.alert_threshold,
        },
        "window_size": state.config.stats_window.as_secs(),
    });

    Ok(Json(body))
}
