use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A step in the registration state machine.
///
/// Transitions are strictly linear:
/// `CheckPhone -> CheckEmail -> CreateAccount -> SendEmailOtp -> VerifyEmail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountCreationStep {
    CheckPhone,
    CheckEmail,
    CreateAccount,
    SendEmailOtp,
    VerifyEmail,
}

impl AccountCreationStep {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckPhone => "check_phone",
            Self::CheckEmail => "check_email",
            Self::CreateAccount => "create_account",
            Self::SendEmailOtp => "send_email_otp",
            Self::VerifyEmail => "verify_email",
        }
    }

    /// The next step name to report to the caller in `next_action`.
    #[must_use]
    pub fn next_action(self) -> Option<&'static str> {
        match self {
            Self::CheckPhone => Some("check_email"),
            Self::CheckEmail => Some("create_account"),
            Self::CreateAccount => Some("send_email_otp"),
            Self::SendEmailOtp => Some("verify_email"),
            Self::VerifyEmail => None,
        }
    }
}

impl std::fmt::Display for AccountCreationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountCreationStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check_phone" => Ok(Self::CheckPhone),
            "check_email" => Ok(Self::CheckEmail),
            "create_account" => Ok(Self::CreateAccount),
            "send_email_otp" => Ok(Self::SendEmailOtp),
            "verify_email" => Ok(Self::VerifyEmail),
            other => Err(format!("unknown sequence step: {other}")),
        }
    }
}

/// Returns the step that must already have been reached before `step` can be
/// attempted, or `None` if `step` is the first step of the sequence.
#[must_use]
pub fn required_previous_step(step: AccountCreationStep) -> Option<AccountCreationStep> {
    match step {
        AccountCreationStep::CheckPhone => None,
        AccountCreationStep::CheckEmail => Some(AccountCreationStep::CheckPhone),
        AccountCreationStep::CreateAccount => Some(AccountCreationStep::CheckEmail),
        AccountCreationStep::SendEmailOtp => Some(AccountCreationStep::CreateAccount),
        AccountCreationStep::VerifyEmail => Some(AccountCreationStep::SendEmailOtp),
    }
}

/// Payload recorded for the `check_phone` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneCheckData {
    pub phone_number: String,
    #[serde(default)]
    pub verification_status: bool,
    pub timestamp: DateTime<Utc>,
}

/// Payload recorded for the `check_email` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailCheckData {
    pub phone_number: String,
    pub email: String,
    #[serde(default)]
    pub verification_status: bool,
    pub timestamp: DateTime<Utc>,
}

/// Payload recorded for the `create_account` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCreationData {
    pub phone_number: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub country: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Payload recorded for the `send_email_otp` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOtpData {
    pub email: String,
    pub otp_sent: bool,
    pub otp_sent_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}

/// Payload recorded for the `verify_email` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyEmailData {
    pub email: String,
    #[serde(default)]
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verification_attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
}

/// The full per-identifier blob backing a sequence, keyed by step.
///
/// Stored as one JSON document in the state store. `storeStepData` merges a
/// single step's payload in; `getStepData` can read the whole blob or a
/// single step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceData {
    pub started_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,

    #[serde(default)]
    pub check_phone: Option<PhoneCheckData>,
    #[serde(default)]
    pub check_email: Option<EmailCheckData>,
    #[serde(default)]
    pub create_account: Option<AccountCreationData>,
    #[serde(default)]
    pub send_email_otp: Option<SendOtpData>,
    #[serde(default)]
    pub verify_email: Option<VerifyEmailData>,
}

impl SequenceData {
    /// Invariant (d): once `verify_email.verified` is true, no further writes
    /// to this sequence are accepted.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.verify_email.as_ref().is_some_and(|v| v.verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_ordering_round_trips() {
        for step in [
            AccountCreationStep::CheckPhone,
            AccountCreationStep::CheckEmail,
            AccountCreationStep::CreateAccount,
            AccountCreationStep::SendEmailOtp,
            AccountCreationStep::VerifyEmail,
        ] {
            let parsed: AccountCreationStep = step.as_str().parse().unwrap();
            assert_eq!(parsed, step);
        }
    }

    #[test]
    fn required_previous_step_chain() {
        assert_eq!(required_previous_step(AccountCreationStep::CheckPhone), None);
        assert_eq!(
            required_previous_step(AccountCreationStep::CheckEmail),
            Some(AccountCreationStep::CheckPhone)
        );
        assert_eq!(
            required_previous_step(AccountCreationStep::VerifyEmail),
            Some(AccountCreationStep::SendEmailOtp)
        );
    }

    #[test]
    fn terminal_once_verified() {
        let mut data = SequenceData::default();
        assert!(!data.is_terminal());
        data.verify_email = Some(VerifyEmailData {
            email: "a@b.com".into(),
            verified: true,
            verified_at: Some(Utc::now()),
            verification_attempts: 1,
            last_attempt: Some(Utc::now()),
        });
        assert!(data.is_terminal());
    }
}
