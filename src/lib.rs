//! Session credentials library.
//!
//! Issues a short-lived auth token and a long-lived refresh token, both JWTs
//! bound to a per-session CSRF secret, validates them on each request and
//! rotates the whole set when the auth token has expired.
//!
//! ```no_run
//! use session_credentials::{ClaimSet, Config, CredentialService, KeyMaterial, SigningKeys};
//!
//! # fn main() -> Result<(), session_credentials::CredentialError> {
//! let config = Config::default();
//! let keys = SigningKeys::load(config.signing_method, &KeyMaterial::hmac(b"secret".to_vec()))?;
//! let service = CredentialService::new(config, keys)?;
//!
//! let issued = service.issue_new_lineage(ClaimSet::new().with_custom_claim("role", "user"))?.issued();
//! let (creds, _outcome) = service.process(
//!     &issued.csrf_secret,
//!     &issued.auth_token,
//!     issued.refresh_token.as_deref().unwrap_or_default(),
//! )?;
//! assert_eq!(creds.claims().custom_str("role"), Some("user"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Debug-level event emitted only when [`Config::debug`] is set.
macro_rules! diag {
    ($config:expr, $($arg:tt)+) => {
        if $config.debug {
            tracing::debug!($($arg)+);
        }
    };
}

pub mod collaborators;
pub mod config;
pub mod credentials;
pub mod csrf;
pub mod error;
pub mod jwt;
pub mod metrics;
pub mod service;
pub mod tracing_config;
pub mod transport;

// Re-exports for convenience
pub use collaborators::{AlwaysValid, ClaimsUpdater, PassThroughClaims, RevocationList, RevocationOracle};
pub use config::{Config, SigningMethod, TransportConfig};
pub use credentials::{CredentialSet, IssuedCredentials, Outcome};
pub use error::{CredentialError, ErrorCode, TokenKind, TokenParseError, UnauthorizedReason};
pub use jwt::{ClaimSet, KeyMaterial, SignedToken, SigningKeys, TokenSerializer};
pub use service::CredentialService;
