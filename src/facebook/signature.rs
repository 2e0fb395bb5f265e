use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the platform's payload signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Resolved once at startup from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignaturePolicy {
    /// Every delivery must carry a valid `sha256=<hex>` signature.
    Enforced { secret: String },
    /// Operator explicitly turned verification off.
    Disabled,
    /// Verification is required but no secret is configured; deliveries are refused.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    /// Accepted without checking because verification is disabled.
    Unchecked,
    Rejected,
    Unavailable,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Verified | Verdict::Unchecked)
    }
}

#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    policy: SignaturePolicy,
}

impl SignatureVerifier {
    pub fn new(policy: SignaturePolicy) -> Self {
        if policy == SignaturePolicy::Disabled {
            warn!("Webhook signature verification is DISABLED; unsigned deliveries will be accepted");
        }
        Self { policy }
    }

    pub fn check(&self, body: &[u8], header: Option<&str>) -> Verdict {
        match &self.policy {
            SignaturePolicy::Disabled => Verdict::Unchecked,
            SignaturePolicy::Unavailable => Verdict::Unavailable,
            SignaturePolicy::Enforced { secret } => match header {
                Some(header) if verify_signature(secret, body, header) => Verdict::Verified,
                _ => Verdict::Rejected,
            },
        }
    }
}

/// HMAC-SHA256 over the raw body, compared in constant time against a
/// `sha256=<hex>` header value. Malformed headers simply fail.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(digest_hex) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Produces the header value the platform would send for `body`.
#[cfg(test)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"object":"page","entry":[]}"#;

    #[test]
    fn accepts_valid_signature() {
        let header = sign("app-secret", BODY);
        assert!(header.starts_with("sha256="));
        assert!(verify_signature("app-secret", BODY, &header));
    }

    #[test]
    fn flipping_any_byte_fails_verification() {
        let header = sign("app-secret", BODY);
        for index in 0..BODY.len() {
            let mut tampered = BODY.to_vec();
            tampered[index] ^= 0x01;
            assert!(
                !verify_signature("app-secret", &tampered, &header),
                "byte {} flip was accepted",
                index
            );
        }
    }

    #[test]
    fn rejects_wrong_secret_and_malformed_headers() {
        let header = sign("app-secret", BODY);
        assert!(!verify_signature("other-secret", BODY, &header));
        assert!(!verify_signature("app-secret", BODY, ""));
        assert!(!verify_signature("app-secret", BODY, "sha1=abcd"));
        assert!(!verify_signature("app-secret", BODY, "sha256=not-hex"));
        assert!(!verify_signature("app-secret", BODY, &header.replace("sha256=", "")));
    }

    #[test]
    fn policy_decides_verdict() {
        let enforced = SignatureVerifier::new(SignaturePolicy::Enforced {
            secret: "app-secret".into(),
        });
        let header = sign("app-secret", BODY);
        assert_eq!(enforced.check(BODY, Some(&header)), Verdict::Verified);
        assert_eq!(enforced.check(BODY, None), Verdict::Rejected);

        let disabled = SignatureVerifier::new(SignaturePolicy::Disabled);
        assert_eq!(disabled.check(BODY, None), Verdict::Unchecked);
        assert!(disabled.check(BODY, None).is_accepted());

        let unavailable = SignatureVerifier::new(SignaturePolicy::Unavailable);
        assert_eq!(unavailable.check(BODY, Some(&header)), Verdict::Unavailable);
        assert!(!unavailable.check(BODY, Some(&header)).is_accepted());
    }
}
