//! Association store interface.
//!
//! The store owns every (enrollment, certificate hash) association. The
//! middleware only queries it and asks it to bind; it never deletes.
//!
//! # Atomicity
//!
//! The predicate queries are advisory. Correctness under concurrent requests
//! rests on [`CertAuthStore::associate_cert_hash`], which must evaluate its
//! [`BindMode`] condition and write in one atomic step. A backend that
//! implements it as a separate read followed by a write lets two concurrent
//! `Authenticate` check-ins with one certificate both bind.

mod error;
mod memory;

pub use error::StoreError;
pub use memory::MemoryCertAuthStore;

use async_trait::async_trait;
use certbind_core::{CertHash, EnrollId};

/// Condition applied atomically by [`CertAuthStore::associate_cert_hash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Bind unconditionally, replacing the enrollment's active hash.
    Shared,
    /// Bind only if no other enrollment holds the hash. Replaces the
    /// enrollment's active hash (re-authentication).
    Exclusive,
    /// Bind only if the enrollment holds no hash yet and no other enrollment
    /// holds this one.
    FirstBind,
}

/// Storage of certificate hash associations.
///
/// An enrollment has at most one active hash. Whether a hash may be held by
/// several enrollments is decided by the [`BindMode`] the caller passes.
#[async_trait]
pub trait CertAuthStore: Send + Sync {
    /// True if any enrollment holds this hash.
    async fn has_cert_hash(&self, hash: &CertHash) -> Result<bool, StoreError>;

    /// True if this exact (enrollment, hash) pair is bound.
    async fn is_cert_hash_associated(
        &self,
        id: &EnrollId,
        hash: &CertHash,
    ) -> Result<bool, StoreError>;

    /// True if the enrollment holds any hash. `hash` is the candidate being
    /// tested; backends may ignore it.
    async fn enrollment_has_cert_hash(
        &self,
        id: &EnrollId,
        hash: &CertHash,
    ) -> Result<bool, StoreError>;

    /// Bind the pair if `mode` allows it, else fail with
    /// [`StoreError::Conflict`]. Rebinding an already bound pair succeeds.
    async fn associate_cert_hash(
        &self,
        id: &EnrollId,
        hash: &CertHash,
        mode: BindMode,
    ) -> Result<(), StoreError>;
}
