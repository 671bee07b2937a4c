//! Strictness knobs for the association protocol.

/// Policy applied by [`CertAuth`](super::CertAuth). The default is the
/// strictest setting: no duplicates, no retroactive binds, enforce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CertAuthPolicy {
    /// Let one certificate serve several enrollments, e.g. an identity
    /// embedded in a shared enrollment profile. With SCEP-issued identities
    /// every enrollment has its own certificate and this stays off.
    pub allow_duplicates: bool,

    /// Bind certificates on messages other than `Authenticate`, so existing
    /// enrollments without an association can gain one. An enrollment that
    /// already has an association still cannot switch certificates.
    pub allow_retroactive: bool,

    /// Log violations instead of rejecting, and never bind on the existing
    /// enrollment path. Meant for troubleshooting and remediation.
    ///
    /// WARNING: This allows MDM clients to spoof other MDM clients.
    pub warn_only: bool,
}

impl CertAuthPolicy {
    pub fn with_allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    pub fn with_allow_retroactive(mut self, allow: bool) -> Self {
        self.allow_retroactive = allow;
        self
    }

    pub fn with_warn_only(mut self, warn_only: bool) -> Self {
        self.warn_only = warn_only;
        self
    }
}
