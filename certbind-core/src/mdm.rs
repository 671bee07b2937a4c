//! MDM protocol requests and the messages the middleware intercepts.
//!
//! These are produced by the transport layer after the plist body has been
//! decoded; nothing here parses wire formats.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cert::Certificate;
use crate::identity::{EnrollId, Enrollment};

/// An inbound MDM request.
///
/// Cloning is how per-call context is derived: a handler that needs a
/// different identity clones the request and edits the clone, leaving the
/// original untouched for the rest of the chain.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Identity of the enrollment, once resolved.
    pub enroll_id: Option<EnrollId>,
    /// Verified mTLS client certificate, if one was presented.
    pub certificate: Option<Certificate>,
    /// URL query parameters from the check-in or command URL.
    pub params: BTreeMap<String, String>,
    /// Correlates log lines belonging to one inbound request.
    pub trace_id: Option<String>,
}

impl Request {
    pub fn new(certificate: Option<Certificate>) -> Self {
        Self {
            certificate,
            ..Self::default()
        }
    }

    pub fn with_enroll_id(mut self, id: EnrollId) -> Self {
        self.enroll_id = Some(id);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Enrollment identifier string, empty if unresolved.
    pub fn id(&self) -> &str {
        self.enroll_id.as_ref().map_or("", |e| e.id.as_str())
    }
}

/// Initial `Authenticate` check-in of a new enrollment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticate {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Undecoded message body.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// `TokenUpdate` check-in carrying the device push token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUpdate {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub topic: String,
    pub push_magic: String,
    pub token: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_token: Option<Vec<u8>>,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// `CheckOut` check-in sent when the MDM profile is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOut {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub topic: String,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// Status a device reports on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    Idle,
    Acknowledged,
    Error,
    CommandFormatError,
    NotNow,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Acknowledged => "Acknowledged",
            Self::Error => "Error",
            Self::CommandFormatError => "CommandFormatError",
            Self::NotNow => "NotNow",
        }
    }
}

/// Command result report (or idle poll) on the command channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResults {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_uuid: Option<String>,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl CommandResults {
    pub fn idle(enrollment: Enrollment) -> Self {
        Self {
            enrollment,
            status: CommandStatus::Idle,
            command_uuid: None,
            raw: Vec::new(),
        }
    }
}

/// Next command handed back to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub command_uuid: String,
    pub request_type: String,
    #[serde(skip)]
    pub raw: Vec<u8>,
}
