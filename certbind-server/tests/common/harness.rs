//! Test harnesses for cert auth E2E tests.
//!
//! Stores run on in-memory SQLite, certificates come from rcgen, and the
//! webhook receiver is an axum router on a local TCP port.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::post;
use axum::{Json, Router};
use certbind_auth::{CheckinAndCommandService, ServiceError};
use certbind_core::{
    Authenticate, CertHash, CheckOut, Command, CommandResults, EnrollId, EnrollType, Enrollment,
    Request, TokenUpdate,
};
use certbind_server::SqliteCertAuthStore;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A generated client identity.
pub struct TestCert {
    pub der: Vec<u8>,
    pub pem: String,
}

impl TestCert {
    pub fn new(name: &str) -> Self {
        let key = rcgen::generate_simple_self_signed(vec![name.to_string()])
            .expect("Failed to generate certificate");
        Self {
            der: key.cert.der().to_vec(),
            pem: key.cert.pem(),
        }
    }

    pub fn certificate(&self) -> certbind_core::Certificate {
        certbind_core::Certificate::from_der(self.der.clone()).expect("Invalid test certificate")
    }

    pub fn hash(&self) -> CertHash {
        self.certificate().hash()
    }

    /// Request carrying this certificate.
    pub fn request(&self) -> Request {
        Request::new(Some(self.certificate()))
    }
}

/// Store on a fresh in-memory database.
///
/// One connection: every connection to `sqlite::memory:` is its own database.
pub async fn sqlite_store() -> SqliteCertAuthStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    SqliteCertAuthStore::new(pool)
        .await
        .expect("Failed to initialize store")
}

pub fn device_id(udid: &str) -> EnrollId {
    EnrollId::new(udid, EnrollType::Device)
}

pub fn authenticate(enrollment: Enrollment) -> Authenticate {
    Authenticate {
        enrollment,
        topic: "com.apple.mgmt.External.test".into(),
        ..Default::default()
    }
}

pub fn token_update(enrollment: Enrollment) -> TokenUpdate {
    TokenUpdate {
        enrollment,
        topic: "com.apple.mgmt.External.test".into(),
        push_magic: "magic".into(),
        token: vec![0xAB; 32],
        unlock_token: None,
        raw: b"<plist>TokenUpdate</plist>".to_vec(),
    }
}

pub fn check_out(enrollment: Enrollment) -> CheckOut {
    CheckOut {
        enrollment,
        topic: "com.apple.mgmt.External.test".into(),
        raw: b"<plist>CheckOut</plist>".to_vec(),
    }
}

/// Next stage that records the requests it was handed.
#[derive(Default)]
pub struct RecordingService {
    calls: Mutex<Vec<(String, Request)>>,
}

impl RecordingService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(String, Request)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn push(&self, name: &str, req: &Request) {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), req.clone()));
    }
}

#[async_trait]
impl CheckinAndCommandService for RecordingService {
    async fn authenticate(&self, req: &Request, _msg: &Authenticate) -> Result<(), ServiceError> {
        self.push("authenticate", req);
        Ok(())
    }

    async fn token_update(&self, req: &Request, _msg: &TokenUpdate) -> Result<(), ServiceError> {
        self.push("token_update", req);
        Ok(())
    }

    async fn check_out(&self, req: &Request, _msg: &CheckOut) -> Result<(), ServiceError> {
        self.push("check_out", req);
        Ok(())
    }

    async fn command_and_report_results(
        &self,
        req: &Request,
        _results: &CommandResults,
    ) -> Result<Option<Command>, ServiceError> {
        self.push("command_and_report_results", req);
        Ok(None)
    }
}

/// One HTTP request seen by [`WebhookReceiver`].
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Clone)]
struct ReceiverState {
    status: StatusCode,
    requests: mpsc::UnboundedSender<ReceivedRequest>,
}

async fn receive(
    State(state): State<ReceiverState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let _ = state.requests.send(ReceivedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        content_type,
        body,
    });
    state.status
}

/// Local webhook endpoint answering every request with a fixed status.
pub struct WebhookReceiver {
    pub url: String,
    requests: mpsc::UnboundedReceiver<ReceivedRequest>,
}

impl WebhookReceiver {
    pub async fn start(status: u16) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = ReceiverState {
            status: StatusCode::from_u16(status).expect("Invalid status code"),
            requests: tx,
        };
        let app = Router::new()
            .route("/webhook", post(receive))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind webhook listener");
        let addr = listener.local_addr().expect("No local address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://{}/webhook", addr),
            requests: rx,
        }
    }

    pub async fn next_request(&mut self) -> ReceivedRequest {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.requests.recv())
            .await
            .expect("Timed out waiting for webhook request")
            .expect("Webhook receiver closed")
    }

    pub fn try_next_request(&mut self) -> Option<ReceivedRequest> {
        self.requests.try_recv().ok()
    }
}
