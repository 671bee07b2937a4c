//! Audit records for certificate association decisions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cert::CertHash;
use crate::identity::EnrollId;

/// Which enrollment lifecycle path produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStage {
    /// Initial `Authenticate` check-in.
    New,
    /// Any later message from an enrolled device.
    Existing,
}

impl EnrollmentStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Existing => "existing",
        }
    }
}

impl fmt::Display for EnrollmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A certificate hash was bound to the enrollment.
    CertAssociated,
    /// The hash is already owned by another enrollment.
    CertHashExists,
    /// The enrollment presented a certificate it is not associated with.
    NoCertAssociation,
    /// The enrollment already owns a different certificate hash.
    EnrollmentHasCertHash,
}

impl AuditAction {
    /// Returns true for policy violations, false for successful binds.
    pub fn is_violation(self) -> bool {
        !matches!(self, Self::CertAssociated)
    }

    /// Log message for this action.
    pub fn message(self) -> &'static str {
        match self {
            Self::CertAssociated => "cert associated",
            Self::CertHashExists => "cert hash exists",
            Self::NoCertAssociation => "no cert association",
            Self::EnrollmentHasCertHash => "enrollment cannot have associated cert hash",
        }
    }
}

/// An audit event recording one association decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred.
    pub ts: DateTime<Utc>,

    pub stage: EnrollmentStage,

    pub action: AuditAction,

    /// Normalized enrollment the decision was made for.
    pub enroll_id: EnrollId,

    pub cert_hash: CertHash,

    /// A violation that warn-only mode let through.
    #[serde(default)]
    pub suppressed: bool,
}

impl AuditEvent {
    /// Create a new audit event with the current timestamp.
    pub fn new(
        stage: EnrollmentStage,
        action: AuditAction,
        enroll_id: EnrollId,
        cert_hash: CertHash,
    ) -> Self {
        Self::with_timestamp(Utc::now(), stage, action, enroll_id, cert_hash)
    }

    /// Create a new audit event with specific timestamp.
    pub fn with_timestamp(
        ts: DateTime<Utc>,
        stage: EnrollmentStage,
        action: AuditAction,
        enroll_id: EnrollId,
        cert_hash: CertHash,
    ) -> Self {
        Self {
            ts,
            stage,
            action,
            enroll_id,
            cert_hash,
            suppressed: false,
        }
    }

    /// Mark the event as a violation suppressed by warn-only mode (builder pattern).
    pub fn suppressed(mut self, suppressed: bool) -> Self {
        self.suppressed = suppressed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EnrollType;

    fn hash() -> CertHash {
        CertHash::parse(&"0f".repeat(32)).unwrap()
    }

    #[test]
    fn audit_action_snake_case() {
        assert_eq!(
            serde_json::to_string(&AuditAction::CertAssociated).unwrap(),
            r#""cert_associated""#
        );
        assert_eq!(
            serde_json::to_string(&AuditAction::EnrollmentHasCertHash).unwrap(),
            r#""enrollment_has_cert_hash""#
        );
    }

    #[test]
    fn only_binds_are_not_violations() {
        assert!(!AuditAction::CertAssociated.is_violation());
        assert!(AuditAction::CertHashExists.is_violation());
        assert!(AuditAction::NoCertAssociation.is_violation());
        assert!(AuditAction::EnrollmentHasCertHash.is_violation());
    }

    #[test]
    fn audit_event_roundtrip() {
        let event = AuditEvent::with_timestamp(
            DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            EnrollmentStage::Existing,
            AuditAction::CertHashExists,
            EnrollId::new("UDID-1", EnrollType::Device),
            hash(),
        )
        .suppressed(true);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""stage":"existing""#));
        assert!(json.contains(r#""suppressed":true"#));
        let parsed: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn stage_display() {
        assert_eq!(EnrollmentStage::New.to_string(), "new");
        assert_eq!(EnrollmentStage::Existing.to_string(), "existing");
    }
}
