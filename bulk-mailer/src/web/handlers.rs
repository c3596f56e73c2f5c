//! Control plane endpoint handlers.
//!
//! At most one campaign runs at a time. Starting a campaign returns
//! immediately; the run continues on a background task and is observed
//! through `GET /campaign`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::campaign::{Campaign, RecipientRow};
use crate::dispatch::{DispatchEngine, RunContext};
use crate::message::{AttachmentDir, Sender};
use crate::transport::TransportClient;
use crate::web::auth::is_authorized;
use crate::web::status::{CampaignStatus, StatusBoard};
use crate::Config;

/// The most recent campaign and its background task.
struct ActiveCampaign {
    engine: Arc<DispatchEngine>,
    board: Arc<StatusBoard>,
    task: JoinHandle<()>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub transport: Arc<dyn TransportClient>,
    active: Arc<Mutex<Option<ActiveCampaign>>>,
}

impl AppState {
    pub fn new(config: Config, transport: Arc<dyn TransportClient>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            active: Arc::new(Mutex::new(None)),
        }
    }

    fn sender(&self) -> Sender {
        Sender::new(&self.config.sender_name, &self.config.sender_email)
    }

    /// Cancel the running campaign, if any, and wait for its task to end.
    ///
    /// Called once the server stops accepting requests so an in-flight send
    /// finishes and the summary is recorded before the process exits.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        let Some(campaign) = active.as_mut() else {
            return;
        };
        if campaign.task.is_finished() {
            return;
        }

        info!("campaign_cancel_on_shutdown");
        campaign.engine.request_cancel();
        if let Err(e) = (&mut campaign.task).await {
            error!(error = %e, "campaign_task_join_failed");
        }
        info!(
            state = ?campaign.engine.state(),
            "campaign_stopped_on_shutdown"
        );
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Campaign Control
// =============================================================================

/// Campaign start request.
///
/// Recipient values may be strings, numbers or booleans; nulls are dropped.
#[derive(Debug, Deserialize)]
pub struct StartCampaignRequest {
    pub subject: String,
    pub html: String,
    pub recipients: Vec<HashMap<String, Value>>,
    #[serde(default)]
    pub defaults: HashMap<String, String>,
}

/// Control response.
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    fn status(status: &'static str) -> Self {
        Self {
            status,
            recipients: None,
            error: None,
        }
    }

    fn error(status: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            recipients: None,
            error: Some(error.into()),
        }
    }
}

fn to_row(fields: HashMap<String, Value>) -> Option<RecipientRow> {
    let fields = fields
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            Value::Null => None,
            other => Some((key, other.to_string())),
        })
        .collect();
    RecipientRow::from_fields(fields).ok()
}

/// Start a campaign endpoint.
///
/// This endpoint:
/// 1. Verifies the control token (if configured)
/// 2. Rejects the request while another campaign is still running
/// 3. Builds the campaign and spawns the dispatch run
/// 4. Returns 202 Accepted with the de-duplicated recipient count
pub async fn start_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StartCampaignRequest>,
) -> impl IntoResponse {
    info!(
        rows = request.recipients.len(),
        subject = %request.subject,
        html_length = request.html.len(),
        "campaign_start_requested"
    );

    if !is_authorized(state.config.control_auth_token.as_deref(), &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ControlResponse::status("unauthorized")),
        );
    }

    let row_count = request.recipients.len();
    let rows: Vec<RecipientRow> = request.recipients.into_iter().filter_map(to_row).collect();
    if rows.len() != row_count {
        warn!(
            rows = row_count,
            valid = rows.len(),
            "campaign_rows_without_email"
        );
        return (
            StatusCode::BAD_REQUEST,
            Json(ControlResponse::error(
                "invalid_recipients",
                "every recipient needs a non-empty 'email'",
            )),
        );
    }

    let mut campaign =
        Campaign::new(request.subject, &request.html, rows).with_defaults(request.defaults);
    if let Some(dir) = &state.config.attachment_dir {
        campaign = campaign.with_attachment_dir(AttachmentDir::new(dir));
    }
    let total = campaign.len();

    let mut active = state.active.lock().await;
    if active.as_ref().is_some_and(|a| !a.task.is_finished()) {
        warn!("campaign_already_running");
        return (
            StatusCode::CONFLICT,
            Json(ControlResponse::status("already_running")),
        );
    }

    let board = Arc::new(StatusBoard::new(total));
    let engine = Arc::new(DispatchEngine::new(
        Arc::clone(&state.transport),
        state.sender(),
        RunContext::new(state.config.rate_limit_per_second, state.config.concurrency),
        board.clone(),
    ));

    let task = {
        let engine = Arc::clone(&engine);
        let board = Arc::clone(&board);
        tokio::spawn(async move {
            if let Err(e) = engine.run(campaign).await {
                error!(error = %e, "campaign_run_failed");
                board.set_error(e.to_string());
            }
        })
    };

    *active = Some(ActiveCampaign {
        engine,
        board,
        task,
    });

    info!(recipients = total, "campaign_accepted");

    (
        StatusCode::ACCEPTED,
        Json(ControlResponse {
            status: "started",
            recipients: Some(total),
            error: None,
        }),
    )
}

/// Cancel the running campaign endpoint.
///
/// The in-flight send completes; no new recipient is started.
pub async fn cancel_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !is_authorized(state.config.control_auth_token.as_deref(), &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ControlResponse::status("unauthorized")),
        );
    }

    let active = state.active.lock().await;
    match active.as_ref() {
        Some(campaign) if !campaign.task.is_finished() => {
            campaign.engine.request_cancel();
            (StatusCode::ACCEPTED, Json(ControlResponse::status("cancelling")))
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(ControlResponse::status("not_running")),
        ),
    }
}

/// Campaign status endpoint.
pub async fn campaign_status(
    State(state): State<AppState>,
) -> Result<Json<CampaignStatus>, (StatusCode, Json<ControlResponse>)> {
    let active = state.active.lock().await;
    match active.as_ref() {
        Some(campaign) => Ok(Json(campaign.board.snapshot(campaign.engine.state()))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ControlResponse::status("no_campaign")),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EngineState;
    use crate::transport::MockTransport;
    use std::time::Duration;

    fn config(token: Option<&str>) -> Config {
        Config {
            aws_region: "ap-south-1".to_string(),
            ses_endpoint: None,
            sender_name: "Team".to_string(),
            sender_email: "team@example.com".to_string(),
            rate_limit_per_second: 100,
            concurrency: 1,
            attachment_dir: None,
            request_timeout_ms: 1000,
            port: 0,
            control_auth_token: token.map(str::to_string),
        }
    }

    fn request(emails: &[&str]) -> StartCampaignRequest {
        StartCampaignRequest {
            subject: "Hello {{ name }}".to_string(),
            html: "<p>Hi {{ name }}</p>".to_string(),
            recipients: emails
                .iter()
                .map(|e| HashMap::from([("email".to_string(), Value::String(e.to_string()))]))
                .collect(),
            defaults: HashMap::from([("name".to_string(), "there".to_string())]),
        }
    }

    async fn wait_until_finished(state: &AppState) -> CampaignStatus {
        for _ in 0..100 {
            let Ok(Json(status)) = campaign_status(State(state.clone())).await else {
                panic!("campaign should exist");
            };
            if status.state.is_terminal() && status.summary.is_some() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("campaign did not finish");
    }

    #[tokio::test]
    async fn test_start_and_complete_campaign() {
        let transport = Arc::new(MockTransport::new());
        let state = AppState::new(config(None), transport.clone());

        let response = start_campaign(
            State(state.clone()),
            HeaderMap::new(),
            Json(request(&["a@x.com", "b@x.com", "a@x.com"])),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let status = wait_until_finished(&state).await;
        assert_eq!(status.state, EngineState::Completed);
        assert_eq!(status.processed, 2);
        assert_eq!(status.summary.unwrap().sent_count, 2);
        assert_eq!(transport.attempted_recipients(), vec!["a@x.com", "b@x.com"]);
    }

    #[tokio::test]
    async fn test_start_requires_token_when_configured() {
        let state = AppState::new(config(Some("s3cret")), Arc::new(MockTransport::new()));

        let response = start_campaign(State(state), HeaderMap::new(), Json(request(&["a@x.com"])))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_start_rejects_rows_without_email() {
        let state = AppState::new(config(None), Arc::new(MockTransport::new()));
        let mut req = request(&["a@x.com"]);
        req.recipients
            .push(HashMap::from([("name".to_string(), Value::String("Bob".to_string()))]));

        let response = start_campaign(State(state), HeaderMap::new(), Json(req))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_second_start_conflicts_while_running() {
        let transport = Arc::new(MockTransport::new().with_latency(Duration::from_millis(200)));
        let state = AppState::new(config(None), transport);

        let first = start_campaign(
            State(state.clone()),
            HeaderMap::new(),
            Json(request(&["a@x.com", "b@x.com"])),
        )
        .await
        .into_response();
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let second = start_campaign(
            State(state.clone()),
            HeaderMap::new(),
            Json(request(&["c@x.com"])),
        )
        .await
        .into_response();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let cancel = cancel_campaign(State(state.clone()), HeaderMap::new())
            .await
            .into_response();
        assert_eq!(cancel.status(), StatusCode::ACCEPTED);

        let status = wait_until_finished(&state).await;
        assert_eq!(status.state, EngineState::Cancelled);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_waits_for_running_campaign() {
        let transport = Arc::new(MockTransport::new().with_latency(Duration::from_millis(200)));
        let state = AppState::new(config(None), transport.clone());

        let response = start_campaign(
            State(state.clone()),
            HeaderMap::new(),
            Json(request(&["a@x.com", "b@x.com", "c@x.com"])),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        tokio::time::sleep(Duration::from_millis(50)).await;
        state.shutdown().await;

        // No polling: the task has already ended when shutdown returns.
        let Ok(Json(status)) = campaign_status(State(state.clone())).await else {
            panic!("campaign should exist");
        };
        assert_eq!(status.state, EngineState::Cancelled);
        let summary = status.summary.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.sent_count, 1);
        assert_eq!(transport.attempted_recipients(), vec!["a@x.com"]);
    }

    #[tokio::test]
    async fn test_shutdown_without_campaign_is_a_no_op() {
        let state = AppState::new(config(None), Arc::new(MockTransport::new()));
        state.shutdown().await;
        assert!(campaign_status(State(state)).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_without_campaign() {
        let state = AppState::new(config(None), Arc::new(MockTransport::new()));
        let response = cancel_campaign(State(state), HeaderMap::new())
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_to_row_stringifies_scalars() {
        let row = to_row(HashMap::from([
            ("email".to_string(), Value::String("a@x.com".to_string())),
            ("seat".to_string(), serde_json::json!(12)),
            ("note".to_string(), Value::Null),
        ]))
        .unwrap();

        assert_eq!(row.field("seat"), Some("12"));
        assert_eq!(row.field("note"), None);
    }
}
