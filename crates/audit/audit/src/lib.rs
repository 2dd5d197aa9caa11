pub mod error;
pub mod record;
pub mod store;

pub use error::AuditError;
pub use record::{
    AuditEntry, AuditPage, AuditQuery, ErrorLogRow, LoadBalancerLogRow, MessageLogRow,
    NumberLoadStatsRow, RequestLogRow,
};
pub use store::AuditStore;
