use serde::{Deserialize, Serialize};

/// The namespace a state entry belongs to, matching the KV layout table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// `msg_count:{number}:{bucket}`
    MsgCount,
    /// `lb:current_index`
    LbCurrentIndex,
    /// `sequence:{id}`
    Sequence,
    /// `sequence_data:{id}`
    SequenceData,
    /// `sequence_lock:{id}`
    SequenceLock,
    /// `lock:{name}`
    Lock,
    /// `rate_limit:{rule}:{id}`
    RateLimit,
    /// `auth:otp:{email}`
    OtpRecord,
    /// `auth:otp:attempts:{email}`
    OtpAttempts,
    /// `message:sid:{id}`
    MessageSid,
    /// `load_balancer:last_alert:{n}`
    LoadBalancerLastAlert,
    /// `load_balancer:number_status:{n}`
    LoadBalancerNumberStatus,
    /// `dify_chat:conv:{user}`
    ConversationId,
}

impl KeyKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MsgCount => "msg_count",
            Self::LbCurrentIndex => "lb:current_index",
            Self::Sequence => "sequence",
            Self::SequenceData => "sequence_data",
            Self::SequenceLock => "sequence_lock",
            Self::Lock => "lock",
            Self::RateLimit => "rate_limit",
            Self::OtpRecord => "auth:otp",
            Self::OtpAttempts => "auth:otp:attempts",
            Self::MessageSid => "message:sid",
            Self::LoadBalancerLastAlert => "load_balancer:last_alert",
            Self::LoadBalancerNumberStatus => "load_balancer:number_status",
            Self::ConversationId => "dify_chat:conv",
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used to address an entry in the state store.
///
/// Canonical rendering is `{kind}:{id}`, except for [`KeyKind::LbCurrentIndex`]
/// which carries no id and renders as its bare prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub kind: KeyKind,
    pub id: String,
}

impl StateKey {
    #[must_use]
    pub fn new(kind: KeyKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    /// The singleton key for the round-robin cursor; carries no identifier.
    #[must_use]
    pub fn lb_current_index() -> Self {
        Self {
            kind: KeyKind::LbCurrentIndex,
            id: String::new(),
        }
    }

    #[must_use]
    pub fn canonical(&self) -> String {
        if self.id.is_empty() {
            self.kind.as_str().to_owned()
        } else {
            format!("{}:{}", self.kind.as_str(), self.id)
        }
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_rendering_matches_kv_layout() {
        let key = StateKey::new(KeyKind::Sequence, "+15551234567");
        assert_eq!(key.canonical(), "sequence:+15551234567");

        let key = StateKey::new(KeyKind::MessageSid, "SM123");
        assert_eq!(key.canonical(), "message:sid:SM123");

        assert_eq!(StateKey::lb_current_index().canonical(), "lb:current_index");
    }
}
