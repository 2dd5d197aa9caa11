use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the vendor-supplied webhook signature against the full request
/// URL and posted form fields.
///
/// The source's actual validation is delegated to a vendor SDK call; this is
/// the one piece of that validation the gateway owns directly, as an
/// HMAC-SHA256-over-`url + sorted form` scheme, base64-encoded and compared
/// in constant time.
pub struct SignatureVerifier {
    auth_token: String,
}

impl SignatureVerifier {
    #[must_use]
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self { auth_token: auth_token.into() }
    }

    /// `form` must be provided in a stable (e.g. sorted by key) order --
    /// callers are responsible for that ordering since it's part of the
    /// signed payload.
    #[must_use]
    pub fn verify(&self, url: &str, form: &[(&str, &str)], signature: &str) -> bool {
        let expected = self.sign(url, form);
        let Ok(provided) = base64::engine::general_purpose::STANDARD.decode(signature) else {
            return false;
        };
        let Ok(expected_bytes) = base64::engine::general_purpose::STANDARD.decode(&expected) else {
            return false;
        };
        expected_bytes.ct_eq(&provided).into()
    }

    fn sign(&self, url: &str, form: &[(&str, &str)]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.auth_token.as_bytes())
            .expect("HMAC accepts a key of any length");

        mac.update(url.as_bytes());
        for (key, value) in form {
            mac.update(key.as_bytes());
            mac.update(value.as_bytes());
        }

        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_round_trips() {
        let verifier = SignatureVerifier::new("secret-token");
        let form = [("Body", "hello"), ("From", "+15551234567")];
        let sig = verifier.sign("https://gateway.example/webhook", &form);

        assert!(verifier.verify("https://gateway.example/webhook", &form, &sig));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let verifier = SignatureVerifier::new("secret-token");
        let form = [("Body", "hello"), ("From", "+15551234567")];
        let sig = verifier.sign("https://gateway.example/webhook", &form);

        let tampered = [("Body", "goodbye"), ("From", "+15551234567")];
        assert!(!verifier.verify("https://gateway.example/webhook", &tampered, &sig));
    }

    #[test]
    fn wrong_token_fails_verification() {
        let signer = SignatureVerifier::new("secret-token");
        let verifier = SignatureVerifier::new("different-token");
        let form = [("Body", "hello")];
        let sig = signer.sign("https://gateway.example/webhook", &form);

        assert!(!verifier.verify("https://gateway.example/webhook", &form, &sig));
    }

    #[test]
    fn malformed_signature_rejected() {
        let verifier = SignatureVerifier::new("secret-token");
        assert!(!verifier.verify("https://gateway.example/webhook", &[], "not-base64!!"));
    }
}
