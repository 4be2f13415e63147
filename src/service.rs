//! Top-level credential service.
//!
//! Owns the configuration, the signing keys and the two collaborators. One
//! instance is shared by every request; it holds no per-request state.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::collaborators::{AlwaysValid, ClaimsUpdater, PassThroughClaims, RevocationOracle};
use crate::config::Config;
use crate::credentials::{CredentialSet, Outcome};
use crate::csrf::generate_lineage_id;
use crate::error::{CredentialError, TokenKind};
use crate::jwt::claims::ClaimSet;
use crate::jwt::keys::SigningKeys;
use crate::jwt::serializer::TokenSerializer;
use crate::metrics;

/// Issues, validates and refreshes credential pairs.
pub struct CredentialService {
    config: Config,
    serializer: TokenSerializer,
    revocation_oracle: Arc<dyn RevocationOracle>,
    claims_updater: Arc<dyn ClaimsUpdater>,
}

impl CredentialService {
    /// Build a service, checking that `keys` fit the configured method.
    ///
    /// # Errors
    ///
    /// Returns a setup error when the keys belong to another method, when a
    /// minting service has no private key, or when a sign/verify self-check
    /// fails.
    pub fn new(config: Config, keys: SigningKeys) -> Result<Self, CredentialError> {
        if keys.method() != config.signing_method {
            return Err(CredentialError::setup(format!(
                "keys are for {} but the service is configured for {}",
                keys.method(),
                config.signing_method
            )));
        }
        if !config.verify_only && !keys.can_sign() {
            return Err(CredentialError::setup(
                "a service that issues tokens needs a signing key",
            ));
        }

        let serializer = TokenSerializer::new(keys);
        if serializer.keys().can_sign() {
            self_check(&serializer)?;
        }

        info!(
            signing_method = %config.signing_method,
            verify_only = config.verify_only,
            auth_ttl_secs = config.auth_token_ttl.as_secs(),
            refresh_ttl_secs = config.refresh_token_ttl.as_secs(),
            "Credential service ready"
        );

        Ok(Self {
            config,
            serializer,
            revocation_oracle: Arc::new(AlwaysValid),
            claims_updater: Arc::new(PassThroughClaims),
        })
    }

    /// Build from environment variables, see [`Config::from_env`] and
    /// [`SigningKeys::from_env`].
    pub fn from_env() -> Result<Self, CredentialError> {
        let config = Config::from_env()?;
        let keys = SigningKeys::from_env(config.signing_method)?;
        Self::new(config, keys)
    }

    /// Consult `oracle` before spending a refresh token.
    #[must_use]
    pub fn with_revocation_oracle(self, oracle: impl RevocationOracle + 'static) -> Self {
        self.with_shared_revocation_oracle(Arc::new(oracle))
    }

    /// Like [`Self::with_revocation_oracle`] for an oracle shared elsewhere.
    #[must_use]
    pub fn with_shared_revocation_oracle(mut self, oracle: Arc<dyn RevocationOracle>) -> Self {
        self.revocation_oracle = oracle;
        self
    }

    /// Derive reissued claims through `updater`.
    #[must_use]
    pub fn with_claims_updater(mut self, updater: impl ClaimsUpdater + 'static) -> Self {
        self.claims_updater = Arc::new(updater);
        self
    }

    /// Mint a fresh pair for a new login. The caller chooses the lineage id.
    ///
    /// # Errors
    ///
    /// `NotAuthorizedToIssue` on a verify-only service; internal errors when
    /// signing fails.
    pub fn issue(&self, base: ClaimSet) -> Result<CredentialSet<'_>, CredentialError> {
        if self.config.verify_only {
            return Err(CredentialError::NotAuthorizedToIssue);
        }
        if base.id.is_none() {
            diag!(self.config, "issuing credentials without a lineage id; refresh will fail");
        }

        let creds = CredentialSet::issue(self, base)?;
        metrics::record_issued(self.config.signing_method.as_str());
        Ok(creds)
    }

    /// Mint a fresh pair under a newly generated lineage id.
    pub fn issue_new_lineage(&self, base: ClaimSet) -> Result<CredentialSet<'_>, CredentialError> {
        self.issue(base.with_id(generate_lineage_id()))
    }

    /// Rebuild credentials from request strings without validating them.
    pub fn credentials_from_strings(
        &self,
        csrf_secret: &str,
        auth_token: &str,
        refresh_token: &str,
    ) -> CredentialSet<'_> {
        CredentialSet::from_strings(self, csrf_secret, auth_token, refresh_token)
    }

    /// Rebuild, validate and possibly refresh request credentials.
    ///
    /// # Errors
    ///
    /// Whatever ended the attempt, see [`CredentialSet::validate_and_refresh`].
    pub fn process(
        &self,
        csrf_secret: &str,
        auth_token: &str,
        refresh_token: &str,
    ) -> Result<(CredentialSet<'_>, Outcome), CredentialError> {
        let start = Instant::now();
        let mut creds = self.credentials_from_strings(csrf_secret, auth_token, refresh_token);
        let result = creds.validate_and_refresh();

        metrics::record_validation_latency(start.elapsed().as_secs_f64());
        match &result {
            Ok(outcome) => {
                metrics::record_validation(outcome.as_str());
                if *outcome == Outcome::Refreshed {
                    metrics::record_refresh("success");
                }
            }
            Err(e) => {
                metrics::record_validation(e.reason().map_or("internal_error", |r| r.as_str()));
                if let Some(status) = refresh_failure_status(e) {
                    metrics::record_refresh(status);
                }
                if !e.is_unauthorized() {
                    warn!(code = e.code().as_str(), error = %e, "Credential validation failed");
                }
            }
        }

        result.map(|outcome| (creds, outcome))
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serializer holding the service's keys.
    pub fn serializer(&self) -> &TokenSerializer {
        &self.serializer
    }

    pub(crate) fn revocation_oracle(&self) -> &dyn RevocationOracle {
        self.revocation_oracle.as_ref()
    }

    pub(crate) fn claims_updater(&self) -> &dyn ClaimsUpdater {
        self.claims_updater.as_ref()
    }
}

impl std::fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService")
            .field("config", &self.config)
            .field("keys", self.serializer.keys())
            .finish_non_exhaustive()
    }
}

/// Refresh metric label for errors raised after the refresh path was entered.
fn refresh_failure_status(err: &CredentialError) -> Option<&'static str> {
    match err {
        CredentialError::RefreshTokenInvalid { .. } => Some("invalid"),
        CredentialError::CsrfMismatch {
            token: TokenKind::Refresh,
        } => Some("csrf_mismatch"),
        CredentialError::RevokedRefreshToken => Some("revoked"),
        CredentialError::RefreshTokenExpired => Some("expired"),
        CredentialError::MissingLineageId | CredentialError::Internal(_) => Some("error"),
        _ => None,
    }
}

/// Sign and verify a throwaway claim set so key/method mismatches surface at
/// construction rather than on the first request.
fn self_check(serializer: &TokenSerializer) -> Result<(), CredentialError> {
    let sample = ClaimSet::new()
        .with_csrf("self-check")
        .with_expiry(chrono::Utc::now().timestamp() + 60);

    let token = serializer
        .serialize(&sample)
        .map_err(|e| CredentialError::setup(format!("signing self-check failed: {}", e)))?;
    serializer
        .deserialize(&token)
        .map_err(|e| CredentialError::setup(format!("verification self-check failed: {}", e)))?;
    Ok(())
}
