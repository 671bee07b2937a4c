//! Certificate-to-enrollment association protocol.

mod error;
mod middleware;
mod policy;

pub use error::{CertAuthError, CertAuthFailure};
pub use middleware::CertAuth;
pub use policy::CertAuthPolicy;
