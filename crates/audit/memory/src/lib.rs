use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use msgbridge_audit::error::AuditError;
use msgbridge_audit::record::{AuditEntry, AuditPage, AuditQuery};
use msgbridge_audit::store::AuditStore;

/// In-memory audit store using `DashMap`. Suitable for development and testing.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: DashMap<String, AuditEntry>,
}

impl MemoryAuditStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.records.insert(entry.id().to_owned(), entry);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AuditEntry>, AuditError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError> {
        let limit = query.effective_limit();
        let offset = query.effective_offset();

        let mut matching: Vec<AuditEntry> = self
            .records
            .iter()
            .filter_map(|entry| {
                let rec = entry.value();
                if let Some(ref kind) = query.kind {
                    if rec.kind() != kind {
                        return None;
                    }
                }
                if let Some(ref from) = query.from {
                    if rec.created_at() < *from {
                        return None;
                    }
                }
                if let Some(ref to) = query.to {
                    if rec.created_at() > *to {
                        return None;
                    }
                }
                Some(rec.clone())
            })
            .collect();

        matching.sort_by_key(|rec| std::cmp::Reverse(rec.created_at()));

        let total = matching.len() as u64;
        let records: Vec<AuditEntry> = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(AuditPage { records, total, limit, offset })
    }

    async fn cleanup_expired(&self, older_than: chrono::DateTime<Utc>) -> Result<u64, AuditError> {
        let expired_ids: Vec<String> = self
            .records
            .iter()
            .filter_map(|entry| {
                let rec = entry.value();
                if rec.created_at() <= older_than {
                    Some(rec.id().to_owned())
                } else {
                    None
                }
            })
            .collect();

        let mut removed = 0u64;
        for id in expired_ids {
            if self.records.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use msgbridge_audit::record::{AuditEntry, AuditQuery, RequestLogRow};

    use super::*;

    fn make_request_log(id: &str, created_at: chrono::DateTime<Utc>) -> AuditEntry {
        AuditEntry::RequestLog(RequestLogRow {
            id: id.to_owned(),
            message_id: format!("SM{id}"),
            sender: "+15551234567".to_owned(),
            recipient: "+15557654321".to_owned(),
            body: "hello".to_owned(),
            media: vec![],
            status_code: 200,
            created_at,
        })
    }

    #[tokio::test]
    async fn record_and_get_by_id() {
        let store = MemoryAuditStore::new();
        let rec = make_request_log("r1", Utc::now());
        store.record(rec).await.unwrap();

        let found = store.get_by_id("r1").await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().kind(), "request_log");
    }

    #[tokio::test]
    async fn query_filters_by_kind_and_time() {
        let store = MemoryAuditStore::new();
        let now = Utc::now();
        store.record(make_request_log("r1", now - Duration::hours(2))).await.unwrap();
        store.record(make_request_log("r2", now)).await.unwrap();

        let q = AuditQuery { from: Some(now - Duration::hours(1)), ..Default::default() };
        let page = store.query(&q).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].id(), "r2");
    }

    #[tokio::test]
    async fn query_pagination() {
        let store = MemoryAuditStore::new();
        let now = Utc::now();
        for i in 0..10 {
            store.record(make_request_log(&format!("r{i}"), now + Duration::seconds(i))).await.unwrap();
        }

        let q = AuditQuery { limit: Some(3), offset: Some(2), ..Default::default() };
        let page = store.query(&q).await.unwrap();
        assert_eq!(page.total, 10);
        assert_eq!(page.records.len(), 3);
    }

    #[tokio::test]
    async fn cleanup_expired_removes_only_old_rows() {
        let store = MemoryAuditStore::new();
        let now = Utc::now();
        store.record(make_request_log("old", now - Duration::hours(2))).await.unwrap();
        store.record(make_request_log("new", now)).await.unwrap();

        let removed = store.cleanup_expired(now - Duration::hours(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_by_id("old").await.unwrap().is_none());
        assert!(store.get_by_id("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let store = MemoryAuditStore::new();
        assert!(store.get_by_id("nope").await.unwrap().is_none());
    }
}
