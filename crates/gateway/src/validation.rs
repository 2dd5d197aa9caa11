use std::sync::OnceLock;

use regex::Regex;

use crate::error::GatewayError;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"))
}

/// Validate a phone number against `^\+?\d{10,15}$`, returning the value
/// unchanged on success.
pub fn validate_phone(raw: &str) -> Result<String, GatewayError> {
    let digits_only = raw.strip_prefix('+').unwrap_or(raw);
    if !(10..=15).contains(&digits_only.len()) || !digits_only.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GatewayError::InvalidPhone(raw.to_owned()));
    }
    Ok(raw.to_owned())
}

/// Validate an email address against a permissive `local@domain.tld` shape.
pub fn validate_email(raw: &str) -> Result<(), GatewayError> {
    if email_pattern().is_match(raw) {
        Ok(())
    } else {
        Err(GatewayError::InvalidEmail(raw.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plausible_phone_numbers() {
        assert!(validate_phone("+15551234567").is_ok());
        assert!(validate_phone("15551234567").is_ok());
    }

    #[test]
    fn rejects_malformed_phone_numbers() {
        assert!(validate_phone("+123").is_err());
        assert!(validate_phone("not-a-number").is_err());
    }

    #[test]
    fn accepts_plausible_emails() {
        assert!(validate_email("alice@example.com").is_ok());
    }

    #[test]
    fn rejects_malformed_emails() {
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("missing@tld").is_err());
    }
}
