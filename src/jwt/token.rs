//! A single signed claim set.
//!
//! Parsing never fails outright: a token that cannot be verified is kept
//! around with an empty claim set and the error that explains why, so the
//! refresh logic can tell "expired but sound" apart from garbage at the point
//! where that matters.

use std::time::Duration;

use serde_json::Value;

use crate::config::SigningMethod;
use crate::error::{CredentialError, TokenParseError};
use crate::jwt::claims::ClaimSet;
use crate::jwt::serializer::TokenSerializer;

/// One signed token of the credential pair.
#[derive(Debug, Clone)]
pub struct SignedToken {
    claims: ClaimSet,
    encoded: String,
    parse_error: Option<TokenParseError>,
    valid_for: Duration,
    method: SigningMethod,
}

impl SignedToken {
    /// Sign `claims` into a fresh token.
    ///
    /// # Errors
    ///
    /// Fails only when the serializer cannot sign (verify-only keys) or the
    /// claims shadow protocol keys.
    pub fn create(
        claims: ClaimSet,
        valid_for: Duration,
        serializer: &TokenSerializer,
    ) -> Result<Self, CredentialError> {
        let encoded = serializer.serialize(&claims)?;

        Ok(Self {
            claims,
            encoded,
            parse_error: None,
            valid_for,
            method: serializer.keys().method(),
        })
    }

    /// Parse and verify a wire string.
    ///
    /// Never fails; inspect [`SignedToken::parse_error`] instead.
    pub fn parse(wire: &str, valid_for: Duration, serializer: &TokenSerializer) -> Self {
        let (claims, parse_error) = match serializer.deserialize(wire) {
            Ok(claims) if claims.is_expired() => {
                let expired_at = claims.exp;
                (claims, Some(TokenParseError::Expired { expired_at }))
            }
            Ok(claims) => (claims, None),
            Err(e) => (ClaimSet::default(), Some(e)),
        };

        Self {
            claims,
            encoded: wire.to_string(),
            parse_error,
            valid_for,
            method: serializer.keys().method(),
        }
    }

    /// Signature verifies, structure is sound and `exp` has not elapsed.
    pub fn is_valid(&self) -> bool {
        self.parse_error.is_none() && !self.claims.is_expired()
    }

    /// The only defect is expiry.
    pub fn is_expired_only(&self) -> bool {
        match &self.parse_error {
            Some(e) => e.is_expired(),
            None => self.claims.is_expired(),
        }
    }

    /// Claims were recovered from a verified signature, expired or not.
    pub fn is_sound(&self) -> bool {
        self.parse_error.as_ref().map_or(true, TokenParseError::is_expired)
    }

    /// Overwrite one claim and re-sign the whole set.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` when a protocol claim gets a value of the
    /// wrong type.
    pub fn with_claim(
        &self,
        key: &str,
        value: impl Into<Value>,
        serializer: &TokenSerializer,
    ) -> Result<Self, CredentialError> {
        let mut claims = self.claims.clone();
        claims.set_claim(key, value.into())?;
        Self::create(claims, self.valid_for, serializer)
    }

    /// Push `exp` to `now + valid_for` and re-sign.
    pub fn with_extended_expiry(&self, serializer: &TokenSerializer) -> Result<Self, CredentialError> {
        let exp = chrono::Utc::now()
            .timestamp()
            .saturating_add(ttl_seconds(self.valid_for));
        let claims = self.claims.clone().with_expiry(exp);
        Self::create(claims, self.valid_for, serializer)
    }

    /// Verified claims; empty when the token could not be verified.
    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    /// The compact JWT. For parsed tokens this is the input, unchanged.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Why verification failed, if it did.
    pub fn parse_error(&self) -> Option<&TokenParseError> {
        self.parse_error.as_ref()
    }

    /// `exp`, unix seconds.
    pub fn expires_at(&self) -> i64 {
        self.claims.exp
    }

    /// Lifetime applied when the token is re-issued or extended.
    pub fn valid_for(&self) -> Duration {
        self.valid_for
    }

    /// Signing method of the serializer that produced or parsed it.
    pub fn method(&self) -> SigningMethod {
        self.method
    }
}

/// Whole seconds of a lifetime, saturating.
pub(crate) fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::keys::{KeyMaterial, SigningKeys};

    const TTL: Duration = Duration::from_secs(900);

    fn serializer() -> TokenSerializer {
        let keys = SigningKeys::load(
            SigningMethod::HS256,
            &KeyMaterial::hmac(b"signed-token-test-secret".to_vec()),
        )
        .unwrap();
        TokenSerializer::new(keys)
    }

    fn live_claims() -> ClaimSet {
        ClaimSet::new()
            .with_csrf("csrf")
            .with_expiry(chrono::Utc::now().timestamp() + 600)
            .with_custom_claim("role", "user")
    }

    #[test]
    fn test_create_then_parse() {
        let serializer = serializer();
        let token = SignedToken::create(live_claims(), TTL, &serializer).unwrap();
        let parsed = SignedToken::parse(token.encoded(), TTL, &serializer);

        assert!(parsed.is_valid());
        assert_eq!(parsed.claims(), token.claims());
        assert_eq!(parsed.encoded(), token.encoded());
        assert_eq!(parsed.method(), SigningMethod::HS256);
    }

    #[test]
    fn test_parse_garbage_keeps_error() {
        let parsed = SignedToken::parse("garbage", TTL, &serializer());

        assert!(!parsed.is_valid());
        assert!(!parsed.is_sound());
        assert!(!parsed.is_expired_only());
        assert_eq!(parsed.claims(), &ClaimSet::default());
        assert!(matches!(parsed.parse_error(), Some(TokenParseError::Malformed(_))));
    }

    #[test]
    fn test_parse_expired_keeps_claims() {
        let serializer = serializer();
        let expired = live_claims().with_expiry(chrono::Utc::now().timestamp() - 5);
        let token = SignedToken::create(expired, TTL, &serializer).unwrap();

        let parsed = SignedToken::parse(token.encoded(), TTL, &serializer);

        assert!(!parsed.is_valid());
        assert!(parsed.is_sound());
        assert!(parsed.is_expired_only());
        assert_eq!(parsed.claims().csrf.as_deref(), Some("csrf"));
    }

    #[test]
    fn test_with_claim_resigns() {
        let serializer = serializer();
        let token = SignedToken::create(live_claims(), TTL, &serializer).unwrap();

        let tampered = token.with_claim("csrf", "other", &serializer).unwrap();

        assert_ne!(tampered.encoded(), token.encoded());
        let parsed = SignedToken::parse(tampered.encoded(), TTL, &serializer);
        assert!(parsed.is_valid());
        assert_eq!(parsed.claims().csrf.as_deref(), Some("other"));
        assert_eq!(parsed.claims().custom_str("role"), Some("user"));
    }

    #[test]
    fn test_with_claim_rejects_wrong_type() {
        let serializer = serializer();
        let token = SignedToken::create(live_claims(), TTL, &serializer).unwrap();

        assert!(token.with_claim("exp", "never", &serializer).is_err());
    }

    #[test]
    fn test_extended_expiry_saturates_huge_lifetime() {
        let serializer = serializer();
        let token = SignedToken::create(live_claims(), Duration::from_secs(u64::MAX), &serializer)
            .unwrap();

        let renewed = token.with_extended_expiry(&serializer).unwrap();

        assert_eq!(renewed.expires_at(), i64::MAX);
        assert!(renewed.is_valid());
    }

    #[test]
    fn test_with_extended_expiry() {
        let serializer = serializer();
        let expired = live_claims().with_expiry(chrono::Utc::now().timestamp() - 5);
        let token = SignedToken::create(expired, TTL, &serializer).unwrap();

        let renewed = token.with_extended_expiry(&serializer).unwrap();

        assert!(renewed.is_valid());
        assert!(renewed.expires_at() >= chrono::Utc::now().timestamp() + 899);
    }
}
