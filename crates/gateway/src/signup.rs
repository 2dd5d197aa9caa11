use std::sync::Arc;

use chrono::Utc;
use msgbridge_audit::{AuditEntry, AuditStore, LoadBalancerLogRow};

use crate::error::GatewayError;
use crate::load_balancer::LoadBalancer;

/// Metadata captured from the inbound HTTP request driving a signup
/// redirect, for audit purposes only -- never consulted for selection.
#[derive(Debug, Clone, Default)]
pub struct SignupRequestMeta {
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub country_code: Option<String>,
}

/// The deep link a signup redirect resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupTarget {
    pub redirect_url: String,
}

/// Picks a channel number for a new signup, records the dispatch, and
/// audits the redirect.
pub struct SignupRedirect {
    load_balancer: Arc<LoadBalancer>,
    audit: Arc<dyn AuditStore>,
}

impl SignupRedirect {
    #[must_use]
    pub fn new(load_balancer: Arc<LoadBalancer>, audit: Arc<dyn AuditStore>) -> Self {
        Self { load_balancer, audit }
    }

    /// Pick a number, record the dispatch, audit the redirect, and return
    /// the `wa.me` deep link the caller should 302 to.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoNumbersAvailable`] if no numbers are
    /// configured.
    pub async fn redirect(&self, meta: SignupRequestMeta) -> Result<SignupTarget, GatewayError> {
        let number = self.load_balancer.pick().await?;

        let load_balancer = self.load_balancer.clone();
        let dispatched_number = number.clone();
        tokio::spawn(async move {
            if let Err(e) = load_balancer.record_dispatch(&dispatched_number).await {
                tracing::warn!(error = %e, number = dispatched_number.as_str(), "failed to record signup dispatch");
            }
        });

        let loads = self.load_balancer.loads().await.unwrap_or_default();
        let loads_json = serde_json::json!(loads
            .into_iter()
            .map(|l| serde_json::json!({
                "number": l.number.as_str(),
                "message_count": l.message_count,
                "load_fraction": l.load_fraction,
            }))
            .collect::<Vec<_>>());

        self.audit
            .record(AuditEntry::LoadBalancerLog(LoadBalancerLogRow {
                id: uuid::Uuid::new_v4().to_string(),
                client_ip: meta.client_ip,
                user_agent: meta.user_agent,
                referer: meta.referer,
                country_code: meta.country_code,
                assigned_number: number.as_str().to_owned(),
                loads: loads_json,
                created_at: Utc::now(),
            }))
            .await?;

        Ok(SignupTarget { redirect_url: format!("https://wa.me/{}", number.digits()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgbridge_audit::AuditQuery;
    use msgbridge_audit_memory::MemoryAuditStore;
    use msgbridge_core::ChannelNumber;
    use msgbridge_state_memory::MemoryStateStore;

    fn redirect(numbers: Vec<&str>) -> (SignupRedirect, Arc<dyn AuditStore>) {
        let audit: Arc<dyn AuditStore> = Arc::new(MemoryAuditStore::new());
        let lb = Arc::new(LoadBalancer::new(
            Arc::new(MemoryStateStore::new()),
            audit.clone(),
            numbers.into_iter().map(ChannelNumber::new).collect(),
            70,
            0.7,
            0.9,
        ));
        (SignupRedirect::new(lb, audit.clone()), audit)
    }

    #[tokio::test]
    async fn redirects_to_wa_me_with_digits_only() {
        let (redirect, _audit) = redirect(vec!["+1 555-123-4567"]);
        let target = redirect.redirect(SignupRequestMeta::default()).await.unwrap();
        assert_eq!(target.redirect_url, "https://wa.me/15551234567");
    }

    #[tokio::test]
    async fn writes_load_balancer_log_row() {
        let (redirect, audit) = redirect(vec!["+15551234567"]);
        redirect
            .redirect(SignupRequestMeta {
                client_ip: "203.0.113.5".into(),
                user_agent: Some("curl/8".into()),
                referer: None,
                country_code: Some("US".into()),
            })
            .await
            .unwrap();

        let page = audit
            .query(&AuditQuery { kind: Some("load_balancer_log".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
    }

    #[tokio::test]
    async fn fails_when_no_numbers_configured() {
        let (redirect, _audit) = redirect(vec![]);
        assert!(matches!(
            redirect.redirect(SignupRequestMeta::default()).await,
            Err(GatewayError::NoNumbersAvailable)
        ));
    }
}
