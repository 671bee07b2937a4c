//! JSON events delivered to the webhook.

use std::collections::BTreeMap;

use base64::Engine as _;
use certbind_core::{Enrollment, Request};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const TOPIC_AUTHENTICATE: &str = "mdm.Authenticate";
pub const TOPIC_TOKEN_UPDATE: &str = "mdm.TokenUpdate";
pub const TOPIC_CHECK_OUT: &str = "mdm.CheckOut";
pub const TOPIC_CONNECT: &str = "mdm.Connect";

/// One webhook delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub topic: String,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkin_event: Option<CheckinEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledge_event: Option<AcknowledgeEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckinEvent {
    pub udid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub enrollment_id: String,
    pub url_params: BTreeMap<String, String>,
    #[serde(with = "base64_bytes")]
    pub raw_payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcknowledgeEvent {
    pub udid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub enrollment_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command_uuid: String,
    pub url_params: BTreeMap<String, String>,
    #[serde(with = "base64_bytes")]
    pub raw_payload: Vec<u8>,
}

impl Event {
    fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event_id: Uuid::new_v4(),
            created_at: Utc::now(),
            checkin_event: None,
            acknowledge_event: None,
        }
    }

    /// Event for a check-in message.
    pub fn checkin(topic: &str, req: &Request, enrollment: &Enrollment, raw: &[u8]) -> Self {
        let mut event = Self::new(topic);
        event.checkin_event = Some(CheckinEvent {
            udid: enrollment.udid.clone().unwrap_or_default(),
            enrollment_id: enrollment.enrollment_id.clone().unwrap_or_default(),
            url_params: req.params.clone(),
            raw_payload: raw.to_vec(),
        });
        event
    }

    /// Event for a command report.
    pub fn acknowledge(
        req: &Request,
        enrollment: &Enrollment,
        status: &str,
        command_uuid: Option<&str>,
        raw: &[u8],
    ) -> Self {
        let mut event = Self::new(TOPIC_CONNECT);
        event.acknowledge_event = Some(AcknowledgeEvent {
            udid: enrollment.udid.clone().unwrap_or_default(),
            enrollment_id: enrollment.enrollment_id.clone().unwrap_or_default(),
            status: status.to_string(),
            command_uuid: command_uuid.unwrap_or_default().to_string(),
            url_params: req.params.clone(),
            raw_payload: raw.to_vec(),
        });
        event
    }

    /// Enrollment the event is about, for error messages.
    pub fn enrollment_label(&self) -> &str {
        let (udid, enrollment_id) = match (&self.checkin_event, &self.acknowledge_event) {
            (Some(c), _) => (c.udid.as_str(), c.enrollment_id.as_str()),
            (None, Some(a)) => (a.udid.as_str(), a.enrollment_id.as_str()),
            (None, None) => ("", ""),
        };
        if udid.is_empty() {
            enrollment_id
        } else {
            udid
        }
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// Decode a `raw_payload` value. Used by receivers and tests.
pub fn decode_payload(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use certbind_core::Enrollment;

    #[test]
    fn test_checkin_event_shape() {
        let req = Request::new(None).with_param("group", "lab");
        let enrollment = Enrollment::device("UDID-1");
        let event = Event::checkin(TOPIC_AUTHENTICATE, &req, &enrollment, b"<plist/>");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "mdm.Authenticate");
        assert!(json.get("acknowledge_event").is_none());

        let checkin = &json["checkin_event"];
        assert_eq!(checkin["udid"], "UDID-1");
        assert!(checkin.get("enrollment_id").is_none());
        assert_eq!(checkin["url_params"]["group"], "lab");
        let raw = decode_payload(checkin["raw_payload"].as_str().unwrap()).unwrap();
        assert_eq!(raw, b"<plist/>");

        assert!(Uuid::parse_str(json["event_id"].as_str().unwrap()).is_ok());
        assert!(DateTime::parse_from_rfc3339(json["created_at"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_acknowledge_event_shape() {
        let req = Request::new(None);
        let enrollment = Enrollment {
            enrollment_id: Some("BYOD-1".into()),
            ..Default::default()
        };
        let event = Event::acknowledge(&req, &enrollment, "Acknowledged", Some("cmd-1"), b"x");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], TOPIC_CONNECT);
        let ack = &json["acknowledge_event"];
        assert_eq!(ack["enrollment_id"], "BYOD-1");
        assert_eq!(ack["status"], "Acknowledged");
        assert_eq!(ack["command_uuid"], "cmd-1");
        assert_eq!(ack["raw_payload"], "eA==");
        assert_eq!(event.enrollment_label(), "BYOD-1");
    }

    #[test]
    fn test_event_ids_are_unique() {
        let req = Request::new(None);
        let enrollment = Enrollment::device("U");
        let a = Event::checkin(TOPIC_CHECK_OUT, &req, &enrollment, b"");
        let b = Event::checkin(TOPIC_CHECK_OUT, &req, &enrollment, b"");
        assert_ne!(a.event_id, b.event_id);
    }
}
