//! Enrollment identity types and device-channel normalization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// User GUID that identifies a Shared iPad user channel.
pub const SHARED_IPAD_USER_ID: &str = "FFFFFFFF-FFFF-FFFF-FFFF-FFFFFFFFFFFF";

/// Longest enrollment identifier accepted by [`EnrollId::validate`].
pub const MAX_ENROLL_ID_LEN: usize = 255;

/// Kind of MDM channel an enrollment identity refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollType {
    /// Device channel of a device enrollment.
    Device,
    /// User channel of a device enrollment.
    User,
    /// Device channel of a user enrollment (BYOD).
    UserEnrollmentDevice,
    /// User channel of a user enrollment.
    UserEnrollmentUser,
    /// User channel of a Shared iPad.
    SharedIpad,
}

impl EnrollType {
    /// The device-channel type that owns this channel.
    pub fn device_channel(self) -> Self {
        match self {
            Self::Device | Self::User | Self::SharedIpad => Self::Device,
            Self::UserEnrollmentDevice | Self::UserEnrollmentUser => Self::UserEnrollmentDevice,
        }
    }

    /// Returns true for the two device-channel types.
    pub fn is_device_channel(self) -> bool {
        self.device_channel() == self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::User => "user",
            Self::UserEnrollmentDevice => "user_enrollment_device",
            Self::UserEnrollmentUser => "user_enrollment_user",
            Self::SharedIpad => "shared_ipad",
        }
    }

    /// Parse the storage form produced by [`EnrollType::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "device" => Some(Self::Device),
            "user" => Some(Self::User),
            "user_enrollment_device" => Some(Self::UserEnrollmentDevice),
            "user_enrollment_user" => Some(Self::UserEnrollmentUser),
            "shared_ipad" => Some(Self::SharedIpad),
            _ => None,
        }
    }
}

impl fmt::Display for EnrollType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of an enrollment: channel id plus channel type.
///
/// Two ids are equal only when both the identifier and the type match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollId {
    pub id: String,
    #[serde(rename = "type")]
    pub enroll_type: EnrollType,
}

impl EnrollId {
    pub fn new(id: impl Into<String>, enroll_type: EnrollType) -> Self {
        Self {
            id: id.into(),
            enroll_type,
        }
    }

    /// Structural validation of the identifier.
    pub fn validate(&self) -> Result<(), EnrollIdError> {
        if self.id.trim().is_empty() {
            return Err(EnrollIdError::EmptyId);
        }
        if self.id.len() > MAX_ENROLL_ID_LEN {
            return Err(EnrollIdError::TooLong(self.id.len()));
        }
        Ok(())
    }
}

impl fmt::Display for EnrollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.enroll_type, self.id)
    }
}

/// Validate an optional identity, treating absence as a failure.
pub fn validate_enroll_id(id: Option<&EnrollId>) -> Result<&EnrollId, EnrollIdError> {
    let id = id.ok_or(EnrollIdError::Missing)?;
    id.validate()?;
    Ok(id)
}

/// Errors from enrollment id validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum EnrollIdError {
    /// The enrollment could not be resolved to any identity.
    #[error("missing enrollment id")]
    Missing,

    #[error("empty enrollment id")]
    EmptyId,

    #[error("enrollment id too long: {0} bytes (max {MAX_ENROLL_ID_LEN})")]
    TooLong(usize),
}

/// Enrollment fields embedded in every check-in and command message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_long_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_user_id: Option<String>,
}

/// An enrollment resolved to its channel ids and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnrollment {
    pub device_channel_id: String,
    pub user_channel_id: Option<String>,
    pub enroll_type: EnrollType,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

impl Enrollment {
    /// Device enrollment of the given UDID, device channel only.
    pub fn device(udid: impl Into<String>) -> Self {
        Self {
            udid: Some(udid.into()),
            ..Self::default()
        }
    }

    /// Resolve the channel type and ids. `None` when neither a UDID nor a
    /// user-enrollment id is present.
    pub fn resolved(&self) -> Option<ResolvedEnrollment> {
        if let Some(udid) = present(&self.udid) {
            let (enroll_type, user_channel_id) = match (
                present(&self.user_id),
                present(&self.user_short_name),
            ) {
                (Some(SHARED_IPAD_USER_ID), Some(short)) => {
                    (EnrollType::SharedIpad, Some(short.to_string()))
                }
                (Some(user_id), _) => (EnrollType::User, Some(user_id.to_string())),
                (None, _) => (EnrollType::Device, None),
            };
            return Some(ResolvedEnrollment {
                device_channel_id: udid.to_string(),
                user_channel_id,
                enroll_type,
            });
        }

        let enrollment_id = present(&self.enrollment_id)?;
        let (enroll_type, user_channel_id) = match present(&self.enrollment_user_id) {
            Some(user) => (EnrollType::UserEnrollmentUser, Some(user.to_string())),
            None => (EnrollType::UserEnrollmentDevice, None),
        };
        Some(ResolvedEnrollment {
            device_channel_id: enrollment_id.to_string(),
            user_channel_id,
            enroll_type,
        })
    }

    /// Identity of the channel this message was actually sent on.
    pub fn enroll_id(&self) -> Option<EnrollId> {
        let r = self.resolved()?;
        let id = match r.user_channel_id {
            Some(user) if r.enroll_type == EnrollType::SharedIpad => {
                format!("{}:{}", r.device_channel_id, user)
            }
            Some(user) => user,
            None => r.device_channel_id,
        };
        Some(EnrollId::new(id, r.enroll_type))
    }
}

/// Reduce an enrollment to its parent device-channel identity.
///
/// User channels and Shared iPad users map onto the device channel that
/// owns them, so certificate association is tracked per device.
pub fn normalize(enrollment: &Enrollment) -> Option<EnrollId> {
    let r = enrollment.resolved()?;
    Some(EnrollId::new(
        r.device_channel_id,
        r.enroll_type.device_channel(),
    ))
}
