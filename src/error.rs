//! Error handling for credential issuance, validation and refresh.
//!
//! Every failure terminates the attempt it belongs to. Each error carries a
//! stable code and an HTTP status hint so a boundary layer can translate it
//! without re-deriving protocol semantics.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which token of the pair a claim set or an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// The short-lived auth token
    Auth,
    /// The long-lived refresh token
    Refresh,
}

impl TokenKind {
    /// Lowercase name used in logs and messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was rejected as unauthorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    /// Refresh token absent or not parseable
    InvalidRefresh,
    /// Refresh token not bound to the presented CSRF secret
    CsrfMismatch,
    /// Refresh lineage revoked by the oracle
    Revoked,
    /// Refresh token expired
    RefreshExpired,
    /// Auth token invalid for a reason other than expiry, or refresh suppressed
    NotAuthorizedOrInvalid,
}

impl UnauthorizedReason {
    /// Stable snake_case identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRefresh => "invalid_refresh",
            Self::CsrfMismatch => "csrf_mismatch",
            Self::Revoked => "revoked",
            Self::RefreshExpired => "refresh_expired",
            Self::NotAuthorizedOrInvalid => "not_authorized_or_invalid",
        }
    }
}

/// Failure while parsing or verifying a single token.
///
/// Retained inside a parsed token instead of being raised, so callers can
/// tell an expired-but-sound token from garbage where that matters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenParseError {
    /// Signature and structure are sound but `exp` has elapsed
    #[error("token expired at {expired_at}")]
    Expired {
        /// Unix seconds at which the token expired
        expired_at: i64,
    },

    /// Signature does not verify against the configured key
    #[error("token signature invalid")]
    InvalidSignature,

    /// Token was signed with a method other than the configured one
    #[error("token signing method does not match the configured method")]
    AlgorithmMismatch,

    /// A required claim is absent
    #[error("token is missing required claim `{0}`")]
    MissingClaim(String),

    /// Token was minted for the other slot of the pair
    #[error("token was not minted as the {expected} token")]
    WrongKind {
        /// Slot the token was presented in
        expected: TokenKind,
    },

    /// Anything else: bad encoding, bad JSON, wrong claim types, empty input
    #[error("token malformed: {0}")]
    Malformed(String),
}

impl TokenParseError {
    /// True when the only defect is expiry.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }
}

impl From<jsonwebtoken::errors::Error> for TokenParseError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenParseError::Expired {
                expired_at: chrono::Utc::now().timestamp(),
            },
            ErrorKind::InvalidSignature => TokenParseError::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                TokenParseError::AlgorithmMismatch
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                TokenParseError::MissingClaim(claim.clone())
            }
            _ => TokenParseError::Malformed(err.to_string()),
        }
    }
}

/// Error taxonomy of the credential protocol.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Bad signing key or method; fatal at service construction
    #[error("credential service setup failed: {reason}")]
    Setup {
        /// What was wrong with the configuration
        reason: String,
    },

    /// Unparseable claims or a claim of the wrong type
    #[error("malformed input: {reason}")]
    MalformedInput {
        /// Description of the malformation
        reason: String,
    },

    /// Auth token failed verification for a reason other than expiry
    #[error("auth token invalid: {0}")]
    AuthTokenInvalid(TokenParseError),

    /// Token `csrf` claim missing or different from the presented secret
    #[error("CSRF secret does not match the value in the {token} token")]
    CsrfMismatch {
        /// Which token failed the binding check
        token: TokenKind,
    },

    /// Revocation oracle reported the refresh lineage as revoked
    #[error("refresh token has been revoked")]
    RevokedRefreshToken,

    /// Refresh token absent or not parseable
    #[error("refresh token invalid: {reason}")]
    RefreshTokenInvalid {
        /// Why the refresh token could not be used
        reason: String,
    },

    /// Refresh token is sound but expired
    #[error("refresh token expired")]
    RefreshTokenExpired,

    /// Verify-only service asked to mint tokens
    #[error("auth token expired and this service is not authorized to issue tokens")]
    NotAuthorizedToIssue,

    /// Refresh token carries no lineage `id`
    #[error("refresh token has no lineage id")]
    MissingLineageId,

    /// Collaborator or signing failure (details never exposed to clients)
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Stable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Setup failure
    Setup,
    /// Malformed input
    MalformedInput,
    /// Auth token invalid
    AuthTokenInvalid,
    /// CSRF mismatch
    CsrfMismatch,
    /// Revoked refresh lineage
    Revoked,
    /// Refresh token invalid
    RefreshInvalid,
    /// Refresh token expired
    RefreshExpired,
    /// Verify-only service refused to issue
    NotAuthorizedToIssue,
    /// Internal failure
    Internal,
}

impl ErrorCode {
    /// String representation of the error code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "CRED_SETUP_ERROR",
            Self::MalformedInput => "CRED_MALFORMED_INPUT",
            Self::AuthTokenInvalid => "CRED_AUTH_TOKEN_INVALID",
            Self::CsrfMismatch => "CRED_CSRF_MISMATCH",
            Self::Revoked => "CRED_REFRESH_REVOKED",
            Self::RefreshInvalid => "CRED_REFRESH_INVALID",
            Self::RefreshExpired => "CRED_REFRESH_EXPIRED",
            Self::NotAuthorizedToIssue => "CRED_NOT_AUTHORIZED_TO_ISSUE",
            Self::Internal => "CRED_INTERNAL_ERROR",
        }
    }

    /// HTTP status a boundary layer should answer with.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Setup | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MalformedInput
            | Self::AuthTokenInvalid
            | Self::CsrfMismatch
            | Self::Revoked
            | Self::RefreshInvalid
            | Self::RefreshExpired
            | Self::NotAuthorizedToIssue => StatusCode::UNAUTHORIZED,
        }
    }
}

impl CredentialError {
    /// Build a setup error.
    #[must_use]
    pub fn setup(reason: impl Into<String>) -> Self {
        Self::Setup {
            reason: reason.into(),
        }
    }

    /// Build a malformed-input error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            reason: reason.into(),
        }
    }

    /// Build a refresh-token-invalid error.
    #[must_use]
    pub fn refresh_invalid(reason: impl Into<String>) -> Self {
        Self::RefreshTokenInvalid {
            reason: reason.into(),
        }
    }

    /// Error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Setup { .. } => ErrorCode::Setup,
            Self::MalformedInput { .. } => ErrorCode::MalformedInput,
            Self::AuthTokenInvalid(_) => ErrorCode::AuthTokenInvalid,
            Self::CsrfMismatch { .. } => ErrorCode::CsrfMismatch,
            Self::RevokedRefreshToken => ErrorCode::Revoked,
            Self::RefreshTokenInvalid { .. } => ErrorCode::RefreshInvalid,
            Self::RefreshTokenExpired => ErrorCode::RefreshExpired,
            Self::NotAuthorizedToIssue => ErrorCode::NotAuthorizedToIssue,
            Self::MissingLineageId | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// HTTP status hint.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.code().status_code()
    }

    /// Unauthorized reason, or `None` for setup and internal errors.
    #[must_use]
    pub const fn reason(&self) -> Option<UnauthorizedReason> {
        match self {
            Self::RefreshTokenInvalid { .. } => Some(UnauthorizedReason::InvalidRefresh),
            Self::CsrfMismatch {
                token: TokenKind::Refresh,
            } => Some(UnauthorizedReason::CsrfMismatch),
            Self::RevokedRefreshToken => Some(UnauthorizedReason::Revoked),
            Self::RefreshTokenExpired => Some(UnauthorizedReason::RefreshExpired),
            Self::CsrfMismatch {
                token: TokenKind::Auth,
            }
            | Self::AuthTokenInvalid(_)
            | Self::MalformedInput { .. }
            | Self::NotAuthorizedToIssue => Some(UnauthorizedReason::NotAuthorizedOrInvalid),
            Self::Setup { .. } | Self::MissingLineageId | Self::Internal(_) => None,
        }
    }

    /// True when the boundary should answer 401.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        self.reason().is_some()
    }

    /// Message safe to return to a client.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Setup { .. } | Self::MissingLineageId | Self::Internal(_) => {
                "Internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}
