//! Claim set carried by both tokens of the pair.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{CredentialError, TokenKind};

/// Claim key carrying the CSRF secret.
pub const CSRF_CLAIM: &str = "csrf";
/// Claim key carrying the expiry in unix seconds.
pub const EXP_CLAIM: &str = "exp";
/// Claim key carrying the refresh lineage id.
pub const ID_CLAIM: &str = "id";
/// Claim key recording which slot of the pair the token was minted for.
pub const KIND_CLAIM: &str = "kind";

/// Signed payload of a credential token.
///
/// The protocol fields are typed; everything else the caller puts in a token
/// lives in `custom` and is opaque to the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClaimSet {
    /// CSRF secret the token is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf: Option<String>,

    /// Expiry, unix seconds
    pub exp: i64,

    /// Refresh lineage id, required only for revocation checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Slot the token was minted for; absent on tokens signed elsewhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TokenKind>,

    /// Caller-defined claims
    #[serde(flatten)]
    pub custom: HashMap<String, Value>,
}

impl ClaimSet {
    /// Empty claim set with no protocol fields stamped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the refresh lineage id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Bind to a CSRF secret.
    pub fn with_csrf(mut self, csrf: impl Into<String>) -> Self {
        self.csrf = Some(csrf.into());
        self
    }

    /// Set `exp`, unix seconds.
    pub fn with_expiry(mut self, exp: i64) -> Self {
        self.exp = exp;
        self
    }

    /// Mark the slot this claim set is minted for.
    pub fn with_kind(mut self, kind: TokenKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Add or replace a caller-defined claim.
    pub fn with_custom_claim(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Custom claim by key.
    pub fn custom_claim(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    /// Custom claim by key, if it is a string.
    pub fn custom_str(&self, key: &str) -> Option<&str> {
        self.custom.get(key).and_then(Value::as_str)
    }

    /// Overwrite one claim, converting protocol keys to their typed fields.
    ///
    /// Setting a custom claim whose key collides with a protocol key is not
    /// possible: `csrf`, `exp`, `id` and `kind` always land in the typed fields.
    pub fn set_claim(&mut self, key: &str, value: Value) -> Result<(), CredentialError> {
        match key {
            CSRF_CLAIM => {
                self.csrf = Some(expect_string(key, value)?);
            }
            ID_CLAIM => {
                self.id = Some(expect_string(key, value)?);
            }
            KIND_CLAIM => {
                self.kind = Some(match expect_string(key, value)?.as_str() {
                    "auth" => TokenKind::Auth,
                    "refresh" => TokenKind::Refresh,
                    other => {
                        return Err(CredentialError::malformed(format!(
                            "claim `{}` must be `auth` or `refresh`, got `{}`",
                            key, other
                        )))
                    }
                });
            }
            EXP_CLAIM => {
                self.exp = value.as_i64().ok_or_else(|| {
                    CredentialError::malformed(format!("claim `{}` must be an integer", key))
                })?;
            }
            _ => {
                self.custom.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// True when `exp` has elapsed at `timestamp`.
    pub fn is_expired_at(&self, timestamp: i64) -> bool {
        timestamp >= self.exp
    }

    /// True when `exp` has elapsed now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }
}

fn expect_string(key: &str, value: Value) -> Result<String, CredentialError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(CredentialError::malformed(format!(
            "claim `{}` must be a string",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape_is_flat() {
        let claims = ClaimSet::new()
            .with_csrf("abc")
            .with_expiry(1_700_000_000)
            .with_id("lineage-1")
            .with_custom_claim("role", "user");

        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            value,
            json!({"csrf": "abc", "exp": 1_700_000_000, "id": "lineage-1", "role": "user"})
        );

        let back: ClaimSet = serde_json::from_value(value).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn test_missing_optional_fields() {
        let claims: ClaimSet = serde_json::from_value(json!({"exp": 10, "role": "admin"})).unwrap();

        assert!(claims.csrf.is_none());
        assert!(claims.id.is_none());
        assert_eq!(claims.custom_str("role"), Some("admin"));
    }

    #[test]
    fn test_set_claim_routes_protocol_keys() {
        let mut claims = ClaimSet::new();
        claims.set_claim("csrf", json!("secret")).unwrap();
        claims.set_claim("exp", json!(42)).unwrap();
        claims.set_claim("tier", json!(3)).unwrap();

        assert_eq!(claims.csrf.as_deref(), Some("secret"));
        assert_eq!(claims.exp, 42);
        assert_eq!(claims.custom_claim("tier"), Some(&json!(3)));
        assert!(!claims.custom.contains_key("csrf"));
    }

    #[test]
    fn test_set_claim_type_mismatch() {
        let mut claims = ClaimSet::new();
        assert!(claims.set_claim("exp", json!("tomorrow")).is_err());
        assert!(claims.set_claim("id", json!(7)).is_err());
    }

    #[test]
    fn test_kind_claim() {
        let claims = ClaimSet::new().with_expiry(10).with_kind(TokenKind::Refresh);
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value, json!({"exp": 10, "kind": "refresh"}));

        let mut claims = ClaimSet::new();
        claims.set_claim("kind", json!("auth")).unwrap();
        assert_eq!(claims.kind, Some(TokenKind::Auth));
        assert!(claims.set_claim("kind", json!("session")).is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let claims = ClaimSet::new().with_expiry(100);
        assert!(!claims.is_expired_at(99));
        assert!(claims.is_expired_at(100));
    }
}
