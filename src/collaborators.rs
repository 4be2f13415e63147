//! Caller-supplied behavior consulted during refresh.
//!
//! Both collaborators are called synchronously, at most once per refresh
//! attempt, and never retried. An error from either is fatal to that attempt.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::jwt::claims::ClaimSet;

/// Decides whether a refresh lineage may still be used.
pub trait RevocationOracle: Send + Sync {
    /// `Ok(true)` when the lineage `id` has not been revoked.
    fn is_valid(&self, id: &str) -> anyhow::Result<bool>;
}

impl<F> RevocationOracle for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_valid(&self, id: &str) -> anyhow::Result<bool> {
        Ok(self(id))
    }
}

/// Oracle for stateless deployments: nothing is ever revoked.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysValid;

impl RevocationOracle for AlwaysValid {
    fn is_valid(&self, _id: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// In-memory set of revoked lineage ids, owned by one service instance.
#[derive(Debug, Default)]
pub struct RevocationList {
    revoked: RwLock<HashSet<String>>,
}

impl RevocationList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a lineage; later refreshes under `id` fail.
    pub fn revoke(&self, id: impl Into<String>) {
        self.revoked.write().insert(id.into());
    }

    /// Returns true if the id was revoked before.
    pub fn reinstate(&self, id: &str) -> bool {
        self.revoked.write().remove(id)
    }

    /// True when `id` is on the list.
    pub fn is_revoked(&self, id: &str) -> bool {
        self.revoked.read().contains(id)
    }

    /// Number of revoked lineages.
    pub fn len(&self) -> usize {
        self.revoked.read().len()
    }

    /// True when nothing is revoked.
    pub fn is_empty(&self) -> bool {
        self.revoked.read().is_empty()
    }
}

impl RevocationOracle for RevocationList {
    fn is_valid(&self, id: &str) -> anyhow::Result<bool> {
        Ok(!self.is_revoked(id))
    }
}

/// Produces the base claims for a reissued credential pair.
///
/// Receives the claims of the refresh token being spent. `csrf` and `exp` on
/// the result are overwritten by the caller.
pub trait ClaimsUpdater: Send + Sync {
    /// Base claims for the new pair, derived from the spent refresh token's.
    fn update(&self, current: &ClaimSet) -> anyhow::Result<ClaimSet>;
}

impl<F> ClaimsUpdater for F
where
    F: Fn(&ClaimSet) -> ClaimSet + Send + Sync,
{
    fn update(&self, current: &ClaimSet) -> anyhow::Result<ClaimSet> {
        Ok(self(current))
    }
}

/// Carries the refresh token's claims forward unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughClaims;

impl ClaimsUpdater for PassThroughClaims {
    fn update(&self, current: &ClaimSet) -> anyhow::Result<ClaimSet> {
        Ok(current.clone())
    }
}
