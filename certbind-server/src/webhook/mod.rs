//! Downstream stage that forwards check-ins and command reports to an HTTP
//! webhook.

mod event;

pub use event::{
    decode_payload, AcknowledgeEvent, CheckinEvent, Event, TOPIC_AUTHENTICATE, TOPIC_CHECK_OUT,
    TOPIC_CONNECT, TOPIC_TOKEN_UPDATE,
};

use std::time::Duration;

use async_trait::async_trait;
use certbind_auth::{CheckinAndCommandService, ServiceError};
use certbind_core::{Authenticate, CheckOut, Command, CommandResults, Request, TokenUpdate};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// Posts every message as an [`Event`] and never returns a next command.
#[derive(Debug, Clone)]
pub struct WebhookService {
    url: String,
    http: reqwest::Client,
}

impl WebhookService {
    pub fn new(url: impl Into<String>) -> Result<Self, WebhookError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(WebhookError::Transport)?;
        Ok(Self::with_client(url, http))
    }

    pub fn with_client(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            http,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver one event. Anything but `200 OK` is an error.
    pub async fn post_event(&self, event: &Event) -> Result<(), WebhookError> {
        let body = serde_json::to_vec_pretty(event)?;

        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(WebhookError::UnexpectedStatus {
                status,
                url: self.url.clone(),
                topic: event.topic.clone(),
                enrollment: event.enrollment_label().to_string(),
            });
        }

        tracing::debug!(topic = %event.topic, event_id = %event.event_id, "webhook event delivered");
        Ok(())
    }

    async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.post_event(&event).await.map_err(ServiceError::handler)
    }
}

#[async_trait]
impl CheckinAndCommandService for WebhookService {
    async fn authenticate(&self, req: &Request, msg: &Authenticate) -> Result<(), ServiceError> {
        self.send(Event::checkin(TOPIC_AUTHENTICATE, req, &msg.enrollment, &msg.raw))
            .await
    }

    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> Result<(), ServiceError> {
        self.send(Event::checkin(TOPIC_TOKEN_UPDATE, req, &msg.enrollment, &msg.raw))
            .await
    }

    async fn check_out(&self, req: &Request, msg: &CheckOut) -> Result<(), ServiceError> {
        self.send(Event::checkin(TOPIC_CHECK_OUT, req, &msg.enrollment, &msg.raw))
            .await
    }

    async fn command_and_report_results(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> Result<Option<Command>, ServiceError> {
        let event = Event::acknowledge(
            req,
            &results.enrollment,
            results.status.as_str(),
            results.command_uuid.as_deref(),
            &results.raw,
        );
        self.send(event).await?;
        Ok(None)
    }
}

/// Webhook delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("webhook request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected HTTP status {status} from {url} for {topic} ({enrollment})")]
    UnexpectedStatus {
        status: StatusCode,
        url: String,
        topic: String,
        enrollment: String,
    },
}
