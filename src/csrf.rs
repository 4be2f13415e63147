//! CSRF secrets and lineage ids.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use subtle::ConstantTimeEq;

/// Random bytes per CSRF secret.
pub const CSRF_SECRET_BYTES: usize = 32;

/// Source of per-session CSRF secrets.
pub struct CsrfGenerator;

impl CsrfGenerator {
    /// New per-session CSRF secret, base64url without padding.
    pub fn generate() -> String {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; CSRF_SECRET_BYTES] = rng.gen();
        URL_SAFE_NO_PAD.encode(random_bytes)
    }
}

/// Fresh lineage id for a new refresh chain.
pub fn generate_lineage_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Constant-time comparison of the session secret against a token's claim.
///
/// Empty or absent values never match.
pub fn secrets_match(session_secret: &str, claimed: Option<&str>) -> bool {
    match claimed {
        Some(claimed) if !claimed.is_empty() && !session_secret.is_empty() => {
            bool::from(session_secret.as_bytes().ct_eq(claimed.as_bytes()))
        }
        _ => false,
    }
}
