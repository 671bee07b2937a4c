//! The certificate association middleware.

use std::sync::Arc;

use async_trait::async_trait;
use certbind_core::{
    normalize, validate_enroll_id, AuditAction, AuditEvent, Authenticate, CertHash, CheckOut,
    Command, CommandResults, EnrollId, Enrollment, EnrollmentStage, Request, TokenUpdate,
};

use super::{CertAuthError, CertAuthFailure, CertAuthPolicy};
use crate::audit::{AuditSink, TracingAuditSink};
use crate::service::{CheckinAndCommandService, ServiceError};
use crate::store::{BindMode, CertAuthStore, StoreError};

/// Binds client certificates to enrollments and rejects requests whose
/// certificate does not match the bound one.
///
/// `Authenticate` check-ins run the new-enrollment protocol; every other
/// message runs the existing-enrollment protocol. Both key on the
/// normalized device-channel identity. On success the original request is
/// handed to the next stage untouched.
pub struct CertAuth {
    next: Arc<dyn CheckinAndCommandService>,
    store: Arc<dyn CertAuthStore>,
    audit: Arc<dyn AuditSink>,
    policy: CertAuthPolicy,
}

impl CertAuth {
    /// Create the middleware with the strictest policy.
    pub fn new(next: Arc<dyn CheckinAndCommandService>, store: Arc<dyn CertAuthStore>) -> Self {
        Self {
            next,
            store,
            audit: Arc::new(TracingAuditSink),
            policy: CertAuthPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CertAuthPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn policy(&self) -> CertAuthPolicy {
        self.policy
    }

    fn record(
        &self,
        stage: EnrollmentStage,
        action: AuditAction,
        id: &EnrollId,
        hash: &CertHash,
    ) {
        let suppressed = action.is_violation() && self.policy.warn_only;
        let event = AuditEvent::new(stage, action, id.clone(), hash.clone()).suppressed(suppressed);
        self.audit.record(&event);
    }

    /// Clone the request with its identity replaced by the normalized one.
    fn normalized(&self, req: &Request, enrollment: &Enrollment) -> Request {
        let mut normalized = req.clone();
        normalized.enroll_id = normalize(enrollment);
        normalized
    }

    async fn associate_new_enrollment(&self, req: &Request) -> Result<(), CertAuthError> {
        let cert = req
            .certificate
            .as_ref()
            .ok_or(CertAuthError::MissingCertificate)?;
        let id = validate_enroll_id(req.enroll_id.as_ref())?;
        let hash = cert.hash();
        let stage = EnrollmentStage::New;

        // Warn-only still binds a conflicting hash so that remediation
        // traffic keeps flowing.
        let mode = if self.policy.allow_duplicates || self.policy.warn_only {
            BindMode::Shared
        } else {
            BindMode::Exclusive
        };

        if self.store.has_cert_hash(&hash).await? && !self.policy.allow_duplicates {
            // Re-authentication with the certificate already bound to this
            // enrollment, e.g. one embedded in the enrollment profile.
            if self.store.is_cert_hash_associated(id, &hash).await? {
                return Ok(());
            }
            self.record(stage, AuditAction::CertHashExists, id, &hash);
            if !self.policy.warn_only {
                return Err(CertAuthError::CertificateReuseDenied);
            }
        }

        self.bind(stage, id, &hash, mode).await
    }

    async fn validate_associate_existing_enrollment(
        &self,
        req: &Request,
    ) -> Result<(), CertAuthError> {
        let cert = req
            .certificate
            .as_ref()
            .ok_or(CertAuthError::MissingCertificate)?;
        let id = validate_enroll_id(req.enroll_id.as_ref())?;
        let hash = cert.hash();
        let stage = EnrollmentStage::Existing;
        let warn_only = self.policy.warn_only;

        if self.store.is_cert_hash_associated(id, &hash).await? {
            return Ok(());
        }

        if !self.policy.allow_retroactive {
            if !warn_only {
                // A bound enrollment presenting another certificate is a
                // swap, not a missing association.
                if self.store.enrollment_has_cert_hash(id, &hash).await? {
                    self.record(stage, AuditAction::EnrollmentHasCertHash, id, &hash);
                    return Err(CertAuthError::CertificateReuseDenied);
                }
                self.record(stage, AuditAction::NoCertAssociation, id, &hash);
                return Err(CertAuthError::CertificateNotAssociated);
            }
            self.record(stage, AuditAction::NoCertAssociation, id, &hash);
        }

        // Switching certificates requires a new Authenticate, even with
        // retroactive binds allowed.
        if self.store.enrollment_has_cert_hash(id, &hash).await? {
            self.record(stage, AuditAction::EnrollmentHasCertHash, id, &hash);
            if !warn_only {
                return Err(CertAuthError::CertificateReuseDenied);
            }
        }

        // Even with duplicates allowed, an existing enrollment may not pick
        // up a certificate seen elsewhere (exfiltrated or replayed).
        if self.store.has_cert_hash(&hash).await? {
            self.record(stage, AuditAction::CertHashExists, id, &hash);
            if !warn_only {
                return Err(CertAuthError::CertificateReuseDenied);
            }
        }

        if warn_only {
            return Ok(());
        }

        self.bind(stage, id, &hash, BindMode::FirstBind).await
    }

    /// Persist the association. A lost store condition is a collision that
    /// the predicates did not see, so it is audited like one.
    async fn bind(
        &self,
        stage: EnrollmentStage,
        id: &EnrollId,
        hash: &CertHash,
        mode: BindMode,
    ) -> Result<(), CertAuthError> {
        match self.store.associate_cert_hash(id, hash, mode).await {
            Ok(()) => {
                self.record(stage, AuditAction::CertAssociated, id, hash);
                Ok(())
            }
            Err(StoreError::Conflict) => {
                self.record(stage, AuditAction::CertHashExists, id, hash);
                Err(CertAuthError::CertificateReuseDenied)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn check_existing(
        &self,
        req: &Request,
        enrollment: &Enrollment,
    ) -> Result<(), CertAuthFailure> {
        let normalized = self.normalized(req, enrollment);
        self.validate_associate_existing_enrollment(&normalized)
            .await
            .map_err(|e| CertAuthFailure::new(EnrollmentStage::Existing, e))
    }
}

#[async_trait]
impl CheckinAndCommandService for CertAuth {
    async fn authenticate(&self, req: &Request, msg: &Authenticate) -> Result<(), ServiceError> {
        let normalized = self.normalized(req, &msg.enrollment);
        self.associate_new_enrollment(&normalized)
            .await
            .map_err(|e| CertAuthFailure::new(EnrollmentStage::New, e))?;
        self.next.authenticate(req, msg).await
    }

    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> Result<(), ServiceError> {
        self.check_existing(req, &msg.enrollment).await?;
        self.next.token_update(req, msg).await
    }

    async fn check_out(&self, req: &Request, msg: &CheckOut) -> Result<(), ServiceError> {
        self.check_existing(req, &msg.enrollment).await?;
        self.next.check_out(req, msg).await
    }

    async fn command_and_report_results(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> Result<Option<Command>, ServiceError> {
        self.check_existing(req, &results.enrollment).await?;
        self.next.command_and_report_results(req, results).await
    }
}
