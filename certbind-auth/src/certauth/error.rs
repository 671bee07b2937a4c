//! Certificate authentication error types.

use certbind_core::{EnrollIdError, EnrollmentStage};

use crate::store::StoreError;

/// Reasons the association protocol rejects a request.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CertAuthError {
    /// No client certificate was attached to the request.
    #[error("missing MDM certificate")]
    MissingCertificate,

    /// The hash is bound to another enrollment, or the enrollment is bound
    /// to another hash.
    #[error("cert re-use not permitted")]
    CertificateReuseDenied,

    /// An existing enrollment presented a certificate it was never bound to.
    #[error("enrollment not associated with cert")]
    CertificateNotAssociated,

    #[error(transparent)]
    InvalidEnrollId(#[from] EnrollIdError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CertAuthError {
    fn from(err: StoreError) -> Self {
        match err {
            // A lost conditional bind is a reuse the store caught for us.
            StoreError::Conflict => Self::CertificateReuseDenied,
            other => Self::Store(other),
        }
    }
}

/// A [`CertAuthError`] tagged with the protocol path that produced it.
#[derive(Debug, thiserror::Error)]
#[error("cert auth: {stage} enrollment: {source}")]
pub struct CertAuthFailure {
    pub stage: EnrollmentStage,
    #[source]
    pub source: CertAuthError,
}

impl CertAuthFailure {
    pub fn new(stage: EnrollmentStage, source: CertAuthError) -> Self {
        Self { stage, source }
    }

    pub fn kind(&self) -> &CertAuthError {
        &self.source
    }
}
