//! Certificate association middleware for MDM services.
//!
//! This crate performs no I/O of its own. Collaborators are injected via
//! traits:
//! - [`CertAuthStore`] - Persistent (enrollment, certificate hash) associations
//! - [`CheckinAndCommandService`] - The next stage of the handler chain
//! - [`AuditSink`] - Destination for association and violation records
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use certbind_auth::{CertAuth, CertAuthPolicy, MemoryCertAuthStore};
//!
//! let store = Arc::new(MemoryCertAuthStore::new());
//! let service = CertAuth::new(next, store).with_policy(CertAuthPolicy::default());
//!
//! // Authenticate binds the certificate; later check-ins must present it.
//! service.authenticate(&request, &message).await?;
//! ```

pub mod audit;
pub mod certauth;
pub mod service;
pub mod store;

pub use audit::{AuditSink, TracingAuditSink};
pub use certauth::{CertAuth, CertAuthError, CertAuthFailure, CertAuthPolicy};
pub use service::{CheckinAndCommandService, ServiceError};
pub use store::{BindMode, CertAuthStore, MemoryCertAuthStore, StoreError};
