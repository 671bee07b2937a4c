//! # certbind core
//!
//! Pure domain types for binding MDM client certificates to enrollments.
//!
//! ## Design Principles
//!
//! This crate is intentionally **IO-free**:
//! - No filesystem operations
//! - No network calls
//! - No database interactions
//! - No logging
//!
//! The association protocol lives in `certbind-auth`; storage and process
//! wiring live in `certbind-server`.
//!
//! ## Modules
//!
//! - [`identity`] - Enrollment ids and device-channel normalization
//! - [`cert`] - Client certificates and their hash fingerprints
//! - [`mdm`] - Requests and the check-in / command messages
//! - [`audit`] - Audit records for association decisions

pub mod audit;
pub mod cert;
pub mod identity;
pub mod mdm;

pub use audit::{AuditAction, AuditEvent, EnrollmentStage};
pub use cert::{CertError, CertHash, Certificate};
pub use identity::{normalize, validate_enroll_id, EnrollId, EnrollIdError, EnrollType, Enrollment};
pub use mdm::{
    Authenticate, CheckOut, Command, CommandResults, CommandStatus, Request, TokenUpdate,
};
