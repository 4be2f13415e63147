//! Compact JWT encoding for [`ClaimSet`].

use crate::error::{CredentialError, TokenParseError};
use crate::jwt::claims::{ClaimSet, CSRF_CLAIM, EXP_CLAIM, ID_CLAIM, KIND_CLAIM};
use crate::jwt::keys::SigningKeys;
use jsonwebtoken::{decode, encode, Header, Validation};

/// Signs claim sets into compact JWTs and verifies them back.
#[derive(Debug, Clone)]
pub struct TokenSerializer {
    keys: SigningKeys,
    validation: Validation,
}

impl TokenSerializer {
    /// Serializer bound to `keys` and their signing method.
    pub fn new(keys: SigningKeys) -> Self {
        let mut validation = Validation::new(keys.method().algorithm());
        // Expiry is checked by the caller so an expired token keeps its claims.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&[EXP_CLAIM]);

        TokenSerializer { keys, validation }
    }

    /// Keys used for signing and verification.
    pub fn keys(&self) -> &SigningKeys {
        &self.keys
    }

    /// Sign `claims` into a compact JWT.
    ///
    /// # Errors
    ///
    /// Setup error without a private key, `MalformedInput` when a custom
    /// claim shadows a protocol claim.
    pub fn serialize(&self, claims: &ClaimSet) -> Result<String, CredentialError> {
        let key = self.keys.encoding_key().ok_or_else(|| {
            CredentialError::setup("no signing key loaded; this service can only verify")
        })?;

        if let Some(key) = claims
            .custom
            .keys()
            .find(|k| matches!(k.as_str(), CSRF_CLAIM | EXP_CLAIM | ID_CLAIM | KIND_CLAIM))
        {
            return Err(CredentialError::malformed(format!(
                "custom claim `{}` shadows a protocol claim",
                key
            )));
        }

        let header = Header::new(self.keys.method().algorithm());
        encode(&header, claims, key)
            .map_err(|e| CredentialError::Internal(anyhow::anyhow!("JWT encoding error: {}", e)))
    }

    /// Verify signature and method and decode the claims.
    ///
    /// Expiry is not checked here.
    pub fn deserialize(&self, token: &str) -> Result<ClaimSet, TokenParseError> {
        if token.is_empty() {
            return Err(TokenParseError::Malformed("empty token".to_string()));
        }

        let token_data = decode::<ClaimSet>(token, self.keys.decoding_key(), &self.validation)?;
        Ok(token_data.claims)
    }
}
