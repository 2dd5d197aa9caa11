use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use msgbridge_core::MediaAttachment;

/// Row logged for every inbound webhook request, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogRow {
    pub id: String,
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaAttachment>,
    pub status_code: u16,
    pub created_at: DateTime<Utc>,
}

/// Row logged once a worker has completed a full conversation round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLogRow {
    pub id: String,
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub answer: String,
    pub conversation_id: Option<String>,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Row logged on any operational failure, with enough context to diagnose
/// it without replaying the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogRow {
    pub id: String,
    pub operation: String,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub request_log_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row logged on every `/signup` redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerLogRow {
    pub id: String,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub country_code: Option<String>,
    pub assigned_number: String,
    pub loads: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Row logged whenever a channel number's load crosses the 80% threshold
/// within a bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberLoadStatsRow {
    pub id: String,
    pub number: String,
    pub load_fraction: f64,
    pub message_count: i64,
    pub bucket: i64,
    pub created_at: DateTime<Utc>,
}

/// The five append-only audit record kinds the gateway produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    RequestLog(RequestLogRow),
    MessageLog(MessageLogRow),
    ErrorLog(ErrorLogRow),
    LoadBalancerLog(LoadBalancerLogRow),
    NumberLoadStats(NumberLoadStatsRow),
}

impl AuditEntry {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::RequestLog(r) => &r.id,
            Self::MessageLog(r) => &r.id,
            Self::ErrorLog(r) => &r.id,
            Self::LoadBalancerLog(r) => &r.id,
            Self::NumberLoadStats(r) => &r.id,
        }
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::RequestLog(r) => r.created_at,
            Self::MessageLog(r) => r.created_at,
            Self::ErrorLog(r) => r.created_at,
            Self::LoadBalancerLog(r) => r.created_at,
            Self::NumberLoadStats(r) => r.created_at,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestLog(_) => "request_log",
            Self::MessageLog(_) => "message_log",
            Self::ErrorLog(_) => "error_log",
            Self::LoadBalancerLog(_) => "load_balancer_log",
            Self::NumberLoadStats(_) => "number_load_stats",
        }
    }
}

/// Query parameters for searching audit records.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Restrict to one record kind (`"request_log"`, `"message_log"`, ...).
    pub kind: Option<String>,
    /// Only records logged at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Only records logged at or before this time.
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of records to return (default 50, max 1000).
    pub limit: Option<u32>,
    /// Number of records to skip for pagination.
    pub offset: Option<u32>,
}

impl AuditQuery {
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(50).clamp(1, 1000)
    }

    #[must_use]
    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// A paginated page of audit records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub records: Vec<AuditEntry>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}
