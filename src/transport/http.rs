//! HTTP surface for the task dispatcher
//!
//! Routes:
//! - `POST /tasks` typed [`TaskRequest`] body
//! - `POST /message` free-text body, task detected from keywords
//! - `GET /.well-known/agent-card.json` discovery descriptor
//! - `GET /health`, `GET /live`, `GET /metrics`, `GET /` operational endpoints
//!
//! Every failure is answered with an [`ErrorResponse`] body and the status
//! from [`DispatchError::http_status`].

use crate::agent::detection::request_from_text;
use crate::agent::dispatcher::TaskDispatcher;
use crate::config::AnalystConfig;
use crate::error::{sanitize_error_message, DispatchError};
use crate::observability::metrics::metrics;
use crate::protocol::agent_card::AgentCard;
use crate::protocol::messages::{ErrorResponse, TaskRequest, TaskType, TextMessage};
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// Upper bound on the backend probe behind `GET /health`
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state behind every route
pub struct ServerState {
    dispatcher: TaskDispatcher,
    card: AgentCard,
    agent_id: String,
    request_deadline: Duration,
}

impl ServerState {
    pub fn new(config: &AnalystConfig, dispatcher: TaskDispatcher) -> Self {
        Self {
            dispatcher,
            card: AgentCard::from_config(config),
            agent_id: config.agent.id.clone(),
            request_deadline: config.server.request_deadline(),
        }
    }

    pub fn with_deadline(mut self, request_deadline: Duration) -> Self {
        self.request_deadline = request_deadline;
        self
    }

    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    agent_id: String,
    provider: String,
    model: String,
    supported_tasks: Vec<TaskType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    llm_error: Option<String>,
    uptime_seconds: u64,
    checked_at: String,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct ApiDocumentationResponse {
    endpoints: BTreeMap<&'static str, &'static str>,
}

type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> JsonReply {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn error_reply(error: &DispatchError) -> JsonReply {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = error.to_error_response();
    json_reply(&body, status)
}

async fn run_task(state: &ServerState, request: TaskRequest) -> JsonReply {
    match state
        .dispatcher
        .handle_with_deadline(&request, state.request_deadline)
        .await
    {
        Ok(result) => json_reply(&result, StatusCode::OK),
        Err(e) => error_reply(&e),
    }
}

async fn handle_task(body: Bytes, state: Arc<ServerState>) -> Result<JsonReply, Infallible> {
    let request = match serde_json::from_slice::<TaskRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejected task body: {}", e);
            return Ok(error_reply(&DispatchError::invalid_request(format!(
                "Request body is not a valid task request: {e}"
            ))));
        }
    };

    Ok(run_task(&state, request).await)
}

/// Reports `degraded` with 503 when the LLM backend fails its health check
async fn handle_health(state: Arc<ServerState>) -> Result<JsonReply, Infallible> {
    let llm = state.dispatcher.llm();
    let llm_error = match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, llm.provider().health_check())
        .await
    {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(sanitize_error_message(&e.to_string())),
        Err(_) => Some(format!(
            "health check timed out after {}s",
            HEALTH_CHECK_TIMEOUT.as_secs()
        )),
    };

    let (status, code) = match &llm_error {
        None => ("healthy", StatusCode::OK),
        Some(error) => {
            warn!(provider = llm.provider().name(), "LLM health check failed: {}", error);
            ("degraded", StatusCode::SERVICE_UNAVAILABLE)
        }
    };

    let response = HealthResponse {
        status,
        agent_id: state.agent_id.clone(),
        provider: llm.provider().name().to_string(),
        model: llm.options().model_name.clone(),
        supported_tasks: state.dispatcher.supported_task_types().to_vec(),
        llm_error,
        uptime_seconds: metrics().get_metrics().uptime_seconds,
        checked_at: chrono::Utc::now().to_rfc3339(),
        timestamp: current_timestamp(),
    };
    Ok(json_reply(&response, code))
}

/// Accepts `{"text": "..."}` or a bare UTF-8 body
fn message_text(body: &[u8]) -> Result<String, DispatchError> {
    if let Ok(message) = serde_json::from_slice::<TextMessage>(body) {
        return Ok(message.text);
    }

    let text = std::str::from_utf8(body)
        .map_err(|_| DispatchError::invalid_request("Message body is not UTF-8 text"))?;
    Ok(text.to_string())
}

async fn handle_message(body: Bytes, state: Arc<ServerState>) -> Result<JsonReply, Infallible> {
    let text = match message_text(&body) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            return Ok(error_reply(&DispatchError::invalid_request(
                "Message text is empty",
            )))
        }
        Err(e) => return Ok(error_reply(&e)),
    };

    let request = request_from_text(&text);
    debug!(task_type = %request.task_type, "Detected task from message text");
    Ok(run_task(&state, request).await)
}

/// All routes, ready to serve or to drive with `warp::test`
pub fn routes(
    state: Arc<ServerState>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_state = {
        let state = state.clone();
        warp::any().map(move || state.clone())
    };

    // POST /tasks
    let tasks_route = warp::path("tasks")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state.clone())
        .and_then(handle_task);

    // POST /message
    let message_route = warp::path("message")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state.clone())
        .and_then(handle_message);

    // GET /.well-known/agent-card.json
    let card_state = state.clone();
    let card_route = warp::path!(".well-known" / "agent-card.json")
        .and(warp::get())
        .map(move || warp::reply::json(&card_state.card));

    // GET /health
    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state.clone())
        .and_then(handle_health);

    // GET /live
    let live_route = warp::path("live")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&LivenessResponse {
                alive: true,
                timestamp: current_timestamp(),
            })
        });

    // GET /metrics
    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&metrics().get_metrics()));

    // GET / - endpoint index
    let root_route = warp::path::end().and(warp::get()).map(|| {
        let endpoints = BTreeMap::from([
            ("POST /tasks", "Run a typed task request"),
            ("POST /message", "Run a task described in free text"),
            ("GET /.well-known/agent-card.json", "Agent discovery card"),
            ("GET /health", "Agent status, configuration summary and LLM backend check"),
            ("GET /live", "Liveness probe"),
            ("GET /metrics", "Task and LLM call counters"),
        ]);
        warp::reply::json(&ApiDocumentationResponse { endpoints })
    });

    tasks_route
        .or(message_route)
        .or(card_route)
        .or(health_route)
        .or(live_route)
        .or(metrics_route)
        .or(root_route)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_methods(vec!["GET", "POST"])
                .allow_header("content-type"),
        )
}

/// Serve until `shutdown` resolves; in-flight requests are allowed to finish
pub async fn serve<F>(
    state: Arc<ServerState>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), warp::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown)?;

    info!(address = %bound, "HTTP server listening");
    server.await;
    info!("HTTP server stopped");

    Ok(())
}

fn current_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
