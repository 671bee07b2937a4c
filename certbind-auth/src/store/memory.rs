//! In-memory association store.
//!
//! Suitable for tests and single-process deployments that can afford to lose
//! associations on restart.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use certbind_core::{CertHash, EnrollId};
use tokio::sync::Mutex;

use super::{BindMode, CertAuthStore, StoreError};

#[derive(Default)]
struct Associations {
    by_id: HashMap<EnrollId, CertHash>,
    by_hash: HashMap<CertHash, HashSet<EnrollId>>,
}

impl Associations {
    fn held_elsewhere(&self, id: &EnrollId, hash: &CertHash) -> bool {
        self.by_hash
            .get(hash)
            .is_some_and(|ids| ids.iter().any(|other| other != id))
    }

    fn is_bound(&self, id: &EnrollId, hash: &CertHash) -> bool {
        self.by_id.get(id) == Some(hash)
    }

    fn bind(&mut self, id: &EnrollId, hash: &CertHash) {
        if let Some(previous) = self.by_id.insert(id.clone(), hash.clone()) {
            if &previous != hash {
                if let Some(ids) = self.by_hash.get_mut(&previous) {
                    ids.remove(id);
                    if ids.is_empty() {
                        self.by_hash.remove(&previous);
                    }
                }
            }
        }
        self.by_hash
            .entry(hash.clone())
            .or_default()
            .insert(id.clone());
    }
}

/// Association store backed by a mutex-guarded map.
///
/// The mutex is held across the condition check and the write in
/// [`CertAuthStore::associate_cert_hash`], which makes binds atomic.
#[derive(Default)]
pub struct MemoryCertAuthStore {
    inner: Mutex<Associations>,
}

impl MemoryCertAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of enrollments with an active association.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Active hash of an enrollment.
    pub async fn cert_hash_for(&self, id: &EnrollId) -> Option<CertHash> {
        self.inner.lock().await.by_id.get(id).cloned()
    }

    /// Enrollments holding a hash.
    pub async fn enrollments_for(&self, hash: &CertHash) -> Vec<EnrollId> {
        self.inner
            .lock()
            .await
            .by_hash
            .get(hash)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CertAuthStore for MemoryCertAuthStore {
    async fn has_cert_hash(&self, hash: &CertHash) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.by_hash.contains_key(hash))
    }

    async fn is_cert_hash_associated(
        &self,
        id: &EnrollId,
        hash: &CertHash,
    ) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.is_bound(id, hash))
    }

    async fn enrollment_has_cert_hash(
        &self,
        id: &EnrollId,
        _hash: &CertHash,
    ) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.by_id.contains_key(id))
    }

    async fn associate_cert_hash(
        &self,
        id: &EnrollId,
        hash: &CertHash,
        mode: BindMode,
    ) -> Result<(), StoreError> {
        let mut assoc = self.inner.lock().await;
        if assoc.is_bound(id, hash) {
            return Ok(());
        }
        let allowed = match mode {
            BindMode::Shared => true,
            BindMode::Exclusive => !assoc.held_elsewhere(id, hash),
            BindMode::FirstBind => {
                !assoc.by_id.contains_key(id) && !assoc.held_elsewhere(id, hash)
            }
        };
        if !allowed {
            return Err(StoreError::Conflict);
        }
        assoc.bind(id, hash);
        Ok(())
    }
}
