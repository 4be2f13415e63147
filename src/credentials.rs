//! The credential pair and its validate/refresh state machine.
//!
//! A [`CredentialSet`] lives for one request or one login. It is mutated at
//! most once, by a successful refresh, and every failed attempt leaves it
//! exactly as it was.

use tracing::warn;

use crate::csrf::{secrets_match, CsrfGenerator};
use crate::error::{CredentialError, TokenKind, TokenParseError};
use crate::jwt::claims::ClaimSet;
use crate::jwt::token::{ttl_seconds, SignedToken};
use crate::service::CredentialService;

/// Successful result of [`CredentialSet::validate_and_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Auth token valid and bound; nothing changed
    AuthValid,
    /// Auth token had expired; a new pair and CSRF secret were issued
    Refreshed,
}

impl Outcome {
    /// Label used in metrics and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthValid => "auth_valid",
            Self::Refreshed => "refreshed",
        }
    }
}

/// State of the auth token before any refresh is considered.
#[derive(Debug)]
enum AuthStatus {
    Valid,
    Expired,
    CsrfMismatch,
    Invalid(TokenParseError),
}

/// Strings and expiries the transport writes back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredentials {
    /// Compact auth JWT
    pub auth_token: String,
    /// Compact refresh JWT, if the set has one
    pub refresh_token: Option<String>,
    /// Secret the client must echo on its next request
    pub csrf_secret: String,
    /// Auth token `exp`, unix seconds
    pub auth_expiry: i64,
    /// Refresh token `exp`, unix seconds
    pub refresh_expiry: Option<i64>,
}

/// Auth token, optional refresh token and the CSRF secret binding them.
#[derive(Debug, Clone)]
pub struct CredentialSet<'s> {
    csrf_secret: String,
    auth_token: SignedToken,
    refresh_token: Option<SignedToken>,
    service: &'s CredentialService,
}

impl<'s> CredentialSet<'s> {
    /// Mint a new pair for a fresh login.
    pub(crate) fn issue(
        service: &'s CredentialService,
        base: ClaimSet,
    ) -> Result<Self, CredentialError> {
        let csrf_secret = CsrfGenerator::generate();
        let (auth_token, refresh_token) = mint_pair(service, base, &csrf_secret)?;

        Ok(Self {
            csrf_secret,
            auth_token,
            refresh_token: Some(refresh_token),
            service,
        })
    }

    /// Rebuild the pair from the strings of an incoming request.
    ///
    /// Nothing is verified yet; an empty refresh string means the client has
    /// no refresh capability.
    pub(crate) fn from_strings(
        service: &'s CredentialService,
        csrf_secret: &str,
        auth_token: &str,
        refresh_token: &str,
    ) -> Self {
        let config = service.config();
        let serializer = service.serializer();

        let auth_token = SignedToken::parse(auth_token, config.auth_token_ttl, serializer);
        let refresh_token = (!refresh_token.is_empty())
            .then(|| SignedToken::parse(refresh_token, config.refresh_token_ttl, serializer));

        Self {
            csrf_secret: csrf_secret.to_string(),
            auth_token,
            refresh_token,
            service,
        }
    }

    /// Validate the auth token and, if it only expired, rotate the pair.
    ///
    /// # Errors
    ///
    /// Returns the unauthorized or internal error that ended the attempt. The
    /// set is unchanged on every error path.
    pub fn validate_and_refresh(&mut self) -> Result<Outcome, CredentialError> {
        match self.auth_status() {
            AuthStatus::Valid => {
                diag!(self.service.config(), "auth token valid and bound to csrf secret");
                Ok(Outcome::AuthValid)
            }
            AuthStatus::Invalid(e) => {
                diag!(self.service.config(), error = %e, "auth token invalid, not because it expired");
                Err(CredentialError::AuthTokenInvalid(e))
            }
            AuthStatus::CsrfMismatch => {
                diag!(self.service.config(), "csrf secret does not match auth token");
                Err(CredentialError::CsrfMismatch {
                    token: TokenKind::Auth,
                })
            }
            AuthStatus::Expired if self.service.config().verify_only => {
                diag!(
                    self.service.config(),
                    "auth token expired and this service is not authorized to issue tokens"
                );
                Err(CredentialError::NotAuthorizedToIssue)
            }
            AuthStatus::Expired => {
                diag!(self.service.config(), "auth token expired, attempting refresh");
                self.refresh()?;
                Ok(Outcome::Refreshed)
            }
        }
    }

    fn auth_status(&self) -> AuthStatus {
        let token = &self.auth_token;

        if let Some(e) = token.parse_error().filter(|e| !e.is_expired()) {
            return AuthStatus::Invalid(e.clone());
        }
        if token.claims().kind == Some(TokenKind::Refresh) {
            return AuthStatus::Invalid(TokenParseError::WrongKind {
                expected: TokenKind::Auth,
            });
        }
        if !secrets_match(&self.csrf_secret, token.claims().csrf.as_deref()) {
            return AuthStatus::CsrfMismatch;
        }
        if token.is_valid() {
            AuthStatus::Valid
        } else {
            AuthStatus::Expired
        }
    }

    /// Spend the refresh token: all checks first, then replace every field.
    fn refresh(&mut self) -> Result<(), CredentialError> {
        let service = self.service;
        let config = service.config();

        let refresh_token = match &self.refresh_token {
            Some(token) if token.claims().kind == Some(TokenKind::Auth) => {
                diag!(config, "auth token presented in the refresh slot");
                return Err(CredentialError::refresh_invalid(
                    "refresh token is invalid, cannot refresh auth token",
                ));
            }
            Some(token) if token.is_sound() => token,
            Some(token) => {
                diag!(config, error = ?token.parse_error(), "refresh token could not be parsed");
                return Err(CredentialError::refresh_invalid(
                    "refresh token is invalid, cannot refresh auth token",
                ));
            }
            None => {
                diag!(config, "no refresh token presented");
                return Err(CredentialError::refresh_invalid(
                    "no refresh token, cannot refresh auth token",
                ));
            }
        };
        let refresh_claims = refresh_token.claims();

        if !secrets_match(&self.csrf_secret, refresh_claims.csrf.as_deref()) {
            warn!("CSRF secret does not match value in refresh token");
            return Err(CredentialError::CsrfMismatch {
                token: TokenKind::Refresh,
            });
        }

        let lineage_id = refresh_claims
            .id
            .as_deref()
            .ok_or(CredentialError::MissingLineageId)?;

        let not_revoked = service
            .revocation_oracle()
            .is_valid(lineage_id)
            .map_err(|e| CredentialError::Internal(e.context("revocation oracle failed")))?;
        if !not_revoked {
            warn!(lineage_id = %lineage_id, "Refresh token lineage has been revoked");
            return Err(CredentialError::RevokedRefreshToken);
        }

        if !refresh_token.is_valid() {
            diag!(config, lineage_id = %lineage_id, "refresh token expired");
            return Err(CredentialError::RefreshTokenExpired);
        }

        let mut base = service
            .claims_updater()
            .update(refresh_claims)
            .map_err(|e| CredentialError::Internal(e.context("claims updater failed")))?;
        if base.id.is_none() {
            base.id = Some(lineage_id.to_string());
        }

        let csrf_secret = CsrfGenerator::generate();
        let (auth_token, refresh_token) = mint_pair(service, base, &csrf_secret)?;

        diag!(config, lineage_id = %lineage_id, "issued refreshed credentials");

        self.csrf_secret = csrf_secret;
        self.auth_token = auth_token;
        self.refresh_token = Some(refresh_token);
        Ok(())
    }

    /// Secret the client must echo; rotated by a refresh.
    pub fn csrf_secret(&self) -> &str {
        &self.csrf_secret
    }

    /// The auth token, parsed or freshly minted.
    pub fn auth_token(&self) -> &SignedToken {
        &self.auth_token
    }

    /// The refresh token, absent when the client presented none.
    pub fn refresh_token(&self) -> Option<&SignedToken> {
        self.refresh_token.as_ref()
    }

    /// Claims of the auth token, including custom ones.
    pub fn claims(&self) -> &ClaimSet {
        self.auth_token.claims()
    }

    /// Lineage id to hand to a revocation store, taken from the refresh token.
    pub fn lineage_id(&self) -> Option<&str> {
        self.refresh_token
            .as_ref()
            .and_then(|t| t.claims().id.as_deref())
    }

    /// Outbound strings and expiries.
    pub fn issued(&self) -> IssuedCredentials {
        IssuedCredentials {
            auth_token: self.auth_token.encoded().to_string(),
            refresh_token: self.refresh_token.as_ref().map(|t| t.encoded().to_string()),
            csrf_secret: self.csrf_secret.clone(),
            auth_expiry: self.auth_token.expires_at(),
            refresh_expiry: self.refresh_token.as_ref().map(SignedToken::expires_at),
        }
    }
}

/// Stamp `csrf` and expiries on `base` and sign both tokens.
fn mint_pair(
    service: &CredentialService,
    base: ClaimSet,
    csrf_secret: &str,
) -> Result<(SignedToken, SignedToken), CredentialError> {
    let config = service.config();
    let serializer = service.serializer();
    let now = chrono::Utc::now().timestamp();

    let auth_claims = base
        .clone()
        .with_kind(TokenKind::Auth)
        .with_csrf(csrf_secret)
        .with_expiry(now.saturating_add(ttl_seconds(config.auth_token_ttl)));
    let refresh_claims = base
        .with_kind(TokenKind::Refresh)
        .with_csrf(csrf_secret)
        .with_expiry(now.saturating_add(ttl_seconds(config.refresh_token_ttl)));

    let auth_token = SignedToken::create(auth_claims, config.auth_token_ttl, serializer)?;
    let refresh_token = SignedToken::create(refresh_claims, config.refresh_token_ttl, serializer)?;
    Ok((auth_token, refresh_token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::RevocationList;
    use crate::config::Config;
    use crate::jwt::keys::{KeyMaterial, SigningKeys};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn service(config: Config) -> CredentialService {
        let keys = SigningKeys::load(
            config.signing_method,
            &KeyMaterial::hmac(b"credential-set-unit-test-secret".to_vec()),
        )
        .unwrap();
        CredentialService::new(config, keys).unwrap()
    }

    fn base_claims() -> ClaimSet {
        ClaimSet::new()
            .with_id("lineage-1")
            .with_custom_claim("role", "user")
    }

    /// Pair signed by `service` whose auth token expired `ago` seconds back.
    fn aged_pair(service: &CredentialService, csrf: &str, ago: i64) -> (String, String) {
        let now = chrono::Utc::now().timestamp();
        let config = service.config();
        let auth = SignedToken::create(
            base_claims().with_csrf(csrf).with_expiry(now - ago),
            config.auth_token_ttl,
            service.serializer(),
        )
        .unwrap();
        let refresh = SignedToken::create(
            base_claims()
                .with_csrf(csrf)
                .with_expiry(now - ago + ttl_seconds(config.refresh_token_ttl)),
            config.refresh_token_ttl,
            service.serializer(),
        )
        .unwrap();
        (auth.encoded().to_string(), refresh.encoded().to_string())
    }

    /// Service whose oracle answers `not_revoked` and whose collaborators
    /// count their calls.
    fn counting_service(
        config: Config,
        not_revoked: bool,
    ) -> (CredentialService, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let oracle_calls = Arc::new(AtomicUsize::new(0));
        let updater_calls = Arc::new(AtomicUsize::new(0));
        let oracle_counter = Arc::clone(&oracle_calls);
        let updater_counter = Arc::clone(&updater_calls);

        let service = service(config)
            .with_revocation_oracle(move |_: &str| {
                oracle_counter.fetch_add(1, Ordering::SeqCst);
                not_revoked
            })
            .with_claims_updater(move |current: &ClaimSet| {
                updater_counter.fetch_add(1, Ordering::SeqCst);
                current.clone()
            });
        (service, oracle_calls, updater_calls)
    }

    #[test]
    fn test_issue_binds_both_tokens() {
        let service = service(Config::default());
        let creds = CredentialSet::issue(&service, base_claims()).unwrap();

        let refresh = creds.refresh_token().unwrap();
        assert_eq!(creds.auth_token().claims().csrf.as_deref(), Some(creds.csrf_secret()));
        assert_eq!(refresh.claims().csrf.as_deref(), Some(creds.csrf_secret()));
        assert_eq!(creds.lineage_id(), Some("lineage-1"));
        assert!(refresh.expires_at() > creds.auth_token().expires_at());
        assert_eq!(creds.auth_token().claims().kind, Some(TokenKind::Auth));
        assert_eq!(refresh.claims().kind, Some(TokenKind::Refresh));
    }

    #[test]
    fn test_fast_path_leaves_state_untouched() {
        let service = service(Config::default());
        let issued = CredentialSet::issue(&service, base_claims()).unwrap().issued();

        let mut creds = CredentialSet::from_strings(
            &service,
            &issued.csrf_secret,
            &issued.auth_token,
            issued.refresh_token.as_deref().unwrap(),
        );

        assert_eq!(creds.validate_and_refresh().unwrap(), Outcome::AuthValid);
        assert_eq!(creds.issued(), issued);
    }

    #[test]
    fn test_fast_path_does_not_consult_refresh_token() {
        let service = service(Config::default());
        let issued = CredentialSet::issue(&service, base_claims()).unwrap().issued();

        let mut creds =
            CredentialSet::from_strings(&service, &issued.csrf_secret, &issued.auth_token, "junk");

        assert_eq!(creds.validate_and_refresh().unwrap(), Outcome::AuthValid);
    }

    #[test]
    fn test_fast_path_skips_collaborators() {
        let (service, oracle_calls, updater_calls) = counting_service(Config::default(), true);
        let issued = CredentialSet::issue(&service, base_claims()).unwrap().issued();

        let mut creds = CredentialSet::from_strings(
            &service,
            &issued.csrf_secret,
            &issued.auth_token,
            issued.refresh_token.as_deref().unwrap(),
        );

        assert_eq!(creds.validate_and_refresh().unwrap(), Outcome::AuthValid);
        assert_eq!(oracle_calls.load(Ordering::SeqCst), 0);
        assert_eq!(updater_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_refresh_consults_each_collaborator_once() {
        let (service, oracle_calls, updater_calls) = counting_service(Config::default(), true);
        let (auth, refresh) = aged_pair(&service, "csrf", 10);

        let mut creds = CredentialSet::from_strings(&service, "csrf", &auth, &refresh);

        assert_eq!(creds.validate_and_refresh().unwrap(), Outcome::Refreshed);
        assert_eq!(oracle_calls.load(Ordering::SeqCst), 1);
        assert_eq!(updater_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_revocation_checked_before_refresh_expiry() {
        let (service, oracle_calls, updater_calls) = counting_service(
            Config::default().with_refresh_token_ttl(Duration::from_secs(5)),
            false,
        );
        let (auth, refresh) = aged_pair(&service, "csrf", 10);

        let mut creds = CredentialSet::from_strings(&service, "csrf", &auth, &refresh);
        assert!(creds.refresh_token().unwrap().is_expired_only());

        let err = creds.validate_and_refresh().unwrap_err();

        assert!(matches!(err, CredentialError::RevokedRefreshToken));
        assert_eq!(oracle_calls.load(Ordering::SeqCst), 1);
        assert_eq!(updater_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_refresh_token_rejected_as_auth_token() {
        let service = service(Config::default());
        let creds = CredentialSet::issue(&service, base_claims()).unwrap();
        let refresh = creds.refresh_token().unwrap().encoded().to_string();

        let mut presented = CredentialSet::from_strings(&service, creds.csrf_secret(), &refresh, "");
        let err = presented.validate_and_refresh().unwrap_err();

        assert!(matches!(
            err,
            CredentialError::AuthTokenInvalid(TokenParseError::WrongKind {
                expected: TokenKind::Auth
            })
        ));
    }

    #[test]
    fn test_auth_token_rejected_as_refresh_token() {
        let (service, oracle_calls, _) = counting_service(Config::default(), true);
        let expired_auth = SignedToken::create(
            base_claims()
                .with_kind(TokenKind::Auth)
                .with_csrf("csrf")
                .with_expiry(chrono::Utc::now().timestamp() - 10),
            service.config().auth_token_ttl,
            service.serializer(),
        )
        .unwrap();
        let wire = expired_auth.encoded();

        let mut creds = CredentialSet::from_strings(&service, "csrf", wire, wire);

        assert!(matches!(
            creds.validate_and_refresh(),
            Err(CredentialError::RefreshTokenInvalid { .. })
        ));
        assert_eq!(oracle_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_expired_auth_refreshes() {
        let service = service(Config::default());
        let (auth, refresh) = aged_pair(&service, "old-csrf", 10);

        let mut creds = CredentialSet::from_strings(&service, "old-csrf", &auth, &refresh);
        let before = creds.issued();

        assert_eq!(creds.validate_and_refresh().unwrap(), Outcome::Refreshed);

        let after = creds.issued();
        assert_ne!(after.csrf_secret, before.csrf_secret);
        assert!(after.auth_expiry > before.auth_expiry);
        assert!(after.refresh_expiry.unwrap() > before.refresh_expiry.unwrap());
        assert_eq!(creds.claims().custom_str("role"), Some("user"));
        assert_eq!(creds.lineage_id(), Some("lineage-1"));
    }

    #[test]
    fn test_refresh_without_refresh_token() {
        let service = service(Config::default());
        let (auth, _) = aged_pair(&service, "csrf", 10);

        let mut creds = CredentialSet::from_strings(&service, "csrf", &auth, "");
        let err = creds.validate_and_refresh().unwrap_err();

        assert!(matches!(err, CredentialError::RefreshTokenInvalid { .. }));
        assert_eq!(creds.csrf_secret(), "csrf");
    }

    #[test]
    fn test_refresh_with_garbage_refresh_token() {
        let service = service(Config::default());
        let (auth, _) = aged_pair(&service, "csrf", 10);

        let mut creds = CredentialSet::from_strings(&service, "csrf", &auth, "garbage");
        assert!(matches!(
            creds.validate_and_refresh(),
            Err(CredentialError::RefreshTokenInvalid { .. })
        ));
    }

    #[test]
    fn test_refresh_csrf_mismatch() {
        let service = service(Config::default());
        let (auth, _) = aged_pair(&service, "csrf", 10);
        let (_, foreign_refresh) = aged_pair(&service, "other-csrf", 10);

        let mut creds = CredentialSet::from_strings(&service, "csrf", &auth, &foreign_refresh);
        let err = creds.validate_and_refresh().unwrap_err();

        assert!(matches!(
            err,
            CredentialError::CsrfMismatch {
                token: TokenKind::Refresh
            }
        ));
    }

    #[test]
    fn test_revoked_lineage() {
        let revoked = Arc::new(RevocationList::new());
        revoked.revoke("lineage-1");
        let list = Arc::clone(&revoked);
        let service = service(Config::default())
            .with_revocation_oracle(move |id: &str| !list.is_revoked(id));
        let (auth, refresh) = aged_pair(&service, "csrf", 10);

        let mut creds = CredentialSet::from_strings(&service, "csrf", &auth, &refresh);
        let before = creds.issued();

        assert!(matches!(
            creds.validate_and_refresh(),
            Err(CredentialError::RevokedRefreshToken)
        ));
        assert_eq!(creds.issued(), before);
    }

    #[test]
    fn test_missing_lineage_id_is_internal() {
        let service = service(Config::default());
        let now = chrono::Utc::now().timestamp();
        let make = |exp: i64| {
            SignedToken::create(
                ClaimSet::new().with_csrf("csrf").with_expiry(exp),
                Duration::from_secs(60),
                service.serializer(),
            )
            .unwrap()
        };
        let auth = make(now - 10);
        let refresh = make(now + 600);

        let mut creds =
            CredentialSet::from_strings(&service, "csrf", auth.encoded(), refresh.encoded());
        let err = creds.validate_and_refresh().unwrap_err();

        assert!(matches!(err, CredentialError::MissingLineageId));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_expired_refresh_token() {
        let service = service(
            Config::default().with_refresh_token_ttl(Duration::from_secs(5)),
        );
        let (auth, refresh) = aged_pair(&service, "csrf", 10);

        let mut creds = CredentialSet::from_strings(&service, "csrf", &auth, &refresh);
        assert!(matches!(
            creds.validate_and_refresh(),
            Err(CredentialError::RefreshTokenExpired)
        ));
    }

    #[test]
    fn test_updater_without_id_keeps_lineage() {
        let service = service(Config::default()).with_claims_updater(|current: &ClaimSet| {
            ClaimSet::new().with_custom_claim("role", current.custom_str("role").unwrap_or("guest"))
        });
        let (auth, refresh) = aged_pair(&service, "csrf", 10);

        let mut creds = CredentialSet::from_strings(&service, "csrf", &auth, &refresh);
        assert_eq!(creds.validate_and_refresh().unwrap(), Outcome::Refreshed);
        assert_eq!(creds.lineage_id(), Some("lineage-1"));
        assert_eq!(creds.claims().id.as_deref(), Some("lineage-1"));
    }
}
