//! Centralized configuration for the credential service.
//!
//! Configuration is loaded from environment variables and validated at
//! startup. Key material is loaded separately, see [`crate::jwt::keys`].

use crate::error::CredentialError;
use jsonwebtoken::Algorithm;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default auth token lifetime: 15 minutes.
pub const DEFAULT_AUTH_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
/// Default refresh token lifetime: 72 hours.
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(72 * 60 * 60);

/// JWT signing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMethod {
    /// HMAC with SHA-256
    HS256,
    /// HMAC with SHA-384
    HS384,
    /// HMAC with SHA-512
    HS512,
    /// RSA with SHA-256
    RS256,
    /// RSA with SHA-384
    RS384,
    /// RSA with SHA-512
    RS512,
    /// RSA-PSS with SHA-256
    PS256,
    /// RSA-PSS with SHA-384
    PS384,
    /// RSA-PSS with SHA-512
    PS512,
    /// ECDSA with P-256 and SHA-256
    ES256,
    /// ECDSA with P-384 and SHA-384
    ES384,
    /// Ed25519
    EdDSA,
}

impl SigningMethod {
    /// Method name as it appears in the JWT header.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::EdDSA => "EdDSA",
        }
    }

    /// Matching `jsonwebtoken` algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::RS512 => Algorithm::RS512,
            Self::PS256 => Algorithm::PS256,
            Self::PS384 => Algorithm::PS384,
            Self::PS512 => Algorithm::PS512,
            Self::ES256 => Algorithm::ES256,
            Self::ES384 => Algorithm::ES384,
            Self::EdDSA => Algorithm::EdDSA,
        }
    }

    /// True for the HMAC family, which signs and verifies with one secret.
    #[must_use]
    pub const fn is_symmetric(&self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }
}

impl FromStr for SigningMethod {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "PS256" => Ok(Self::PS256),
            "PS384" => Ok(Self::PS384),
            "PS512" => Ok(Self::PS512),
            "ES256" => Ok(Self::ES256),
            "ES384" => Ok(Self::ES384),
            "EDDSA" => Ok(Self::EdDSA),
            _ => Err(CredentialError::setup(format!("Invalid signing method: {}", s))),
        }
    }
}

impl std::fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How credentials travel between client and server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Cookie or header name carrying the auth token
    pub auth_token_name: String,
    /// Cookie or header name carrying the refresh token
    pub refresh_token_name: String,
    /// Header name echoing the CSRF secret
    pub csrf_token_name: String,
    /// Send tokens as headers instead of cookies
    pub bearer_tokens: bool,
    /// Mark cookies `Secure`; disabled in development
    pub secure_cookies: bool,
    /// Cookie path
    pub cookie_path: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            auth_token_name: "X-Auth-Token".to_string(),
            refresh_token_name: "X-Refresh-Token".to_string(),
            csrf_token_name: "X-CSRF-Token".to_string(),
            bearer_tokens: false,
            secure_cookies: true,
            cookie_path: "/".to_string(),
        }
    }
}

/// Credential service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Auth token lifetime
    pub auth_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Only verify tokens, never mint new ones
    pub verify_only: bool,
    /// Signing method for both tokens
    pub signing_method: SigningMethod,
    /// Emit per-step diagnostic logs
    pub debug: bool,
    /// Wire transport settings
    pub transport: TransportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_token_ttl: DEFAULT_AUTH_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            verify_only: false,
            signing_method: SigningMethod::HS256,
            debug: false,
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    /// Set the auth token lifetime.
    #[must_use]
    pub const fn with_auth_token_ttl(mut self, ttl: Duration) -> Self {
        self.auth_token_ttl = ttl;
        self
    }

    /// Set the refresh token lifetime.
    #[must_use]
    pub const fn with_refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    /// Restrict the service to verification.
    #[must_use]
    pub const fn with_verify_only(mut self, verify_only: bool) -> Self {
        self.verify_only = verify_only;
        self
    }

    /// Set the signing method.
    #[must_use]
    pub const fn with_signing_method(mut self, method: SigningMethod) -> Self {
        self.signing_method = method;
        self
    }

    /// Enable diagnostic logging.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replace the transport settings.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, CredentialError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CredentialError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = TransportConfig::default();

        let auth_token_ttl = Duration::from_secs(parse_var(
            &lookup,
            "AUTH_TOKEN_TTL",
            DEFAULT_AUTH_TOKEN_TTL.as_secs(),
        )?);
        let refresh_token_ttl = Duration::from_secs(parse_var(
            &lookup,
            "REFRESH_TOKEN_TTL",
            DEFAULT_REFRESH_TOKEN_TTL.as_secs(),
        )?);
        if auth_token_ttl.is_zero() || refresh_token_ttl.is_zero() {
            return Err(CredentialError::setup("token lifetimes must be positive"));
        }

        let signing_method = match lookup("SIGNING_METHOD") {
            Some(value) => value.parse()?,
            None => SigningMethod::HS256,
        };

        let transport = TransportConfig {
            auth_token_name: lookup("AUTH_TOKEN_NAME").unwrap_or(defaults.auth_token_name),
            refresh_token_name: lookup("REFRESH_TOKEN_NAME")
                .unwrap_or(defaults.refresh_token_name),
            csrf_token_name: lookup("CSRF_TOKEN_NAME").unwrap_or(defaults.csrf_token_name),
            bearer_tokens: parse_var(&lookup, "BEARER_TOKENS", false)?,
            secure_cookies: !parse_var(&lookup, "DEV_ENV", false)?,
            cookie_path: lookup("COOKIE_PATH").unwrap_or(defaults.cookie_path),
        };

        Ok(Self {
            auth_token_ttl,
            refresh_token_ttl,
            verify_only: parse_var(&lookup, "VERIFY_ONLY", false)?,
            signing_method,
            debug: parse_var(&lookup, "CREDENTIALS_DEBUG", false)?,
            transport,
        })
    }
}

/// Parse a variable with a default value.
fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, CredentialError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|e| CredentialError::setup(format!("Invalid {}: {}", name, e))),
        None => Ok(default),
    }
}
