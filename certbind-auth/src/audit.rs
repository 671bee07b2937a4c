//! Audit sinks for association decisions.

use certbind_core::AuditEvent;

/// Receives one record per bind and per detected violation.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Writes audit records as structured `tracing` events.
///
/// Violations are logged at `warn`, binds at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        if event.action.is_violation() {
            tracing::warn!(
                enrollment = %event.stage,
                id = %event.enroll_id.id,
                hash = %event.cert_hash,
                action = ?event.action,
                suppressed = event.suppressed,
                "{}",
                event.action.message()
            );
        } else {
            tracing::info!(
                enrollment = %event.stage,
                id = %event.enroll_id.id,
                hash = %event.cert_hash,
                "{}",
                event.action.message()
            );
        }
    }
}
