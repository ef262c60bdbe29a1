//! HTTP handlers implementing the Chat Facade's surface.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{http::StatusCode, Json};
use chrono::Utc;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use harvey_loop::{AgentLoop, ContextDocument, ToolContext};
use harvey_session::Session;
use harvey_types::{
    ItemKind, ItemOrigin, PricingContextItem, RequestError, Role, SessionId,
};

use crate::error::ApiError;
use crate::state::AppState;

const SYSTEM_PROMPT: &str = "You are Harvey, an assistant that answers pricing-strategy \
questions by calling the iPricing, summary, subscriptions, optimal, validate and filter tools. \
Always ground filters against the authoritative YAML already in scope before calling a tool \
that accepts them, and never guess at feature or usage-limit names.";

/// How long a `/chat` call waits for a pricing URL it just submitted to
/// resolve before proceeding with whatever is ready.
const IMMEDIATE_RESOLUTION_BUDGET: Duration = Duration::from_millis(1500);

/// `POST /chat` request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Existing session to continue, or omitted to start a new one.
    pub session_id: Option<String>,
    /// The user's natural-language question.
    pub question: String,
    /// A single pricing URL to resolve into context.
    pub pricing_url: Option<String>,
    /// Multiple pricing URLs to resolve into context.
    #[serde(default)]
    pub pricing_urls: Vec<String>,
    /// Raw YAML to place directly into context.
    pub pricing_yaml: Option<String>,
    /// Multiple raw YAML documents to place into context.
    #[serde(default)]
    pub pricing_yamls: Vec<String>,
}

/// One step of the response's `plan`, summarizing what the loop did.
#[derive(Debug, Serialize)]
pub struct PlanStep {
    index: u32,
    thought: String,
    tools_called: Vec<String>,
}

/// `POST /chat` response body.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    session_id: String,
    answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<Vec<PlanStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
}

fn collect_urls(req: &ChatRequest) -> Vec<String> {
    let mut urls = req.pricing_urls.clone();
    if let Some(url) = &req.pricing_url {
        urls.push(url.clone());
    }
    urls
}

fn collect_yamls(req: &ChatRequest) -> Vec<String> {
    let mut yamls = req.pricing_yamls.clone();
    if let Some(yaml) = &req.pricing_yaml {
        yamls.push(yaml.clone());
    }
    yamls
}

/// Attempt to resolve one URL context item within [`IMMEDIATE_RESOLUTION_BUDGET`].
///
/// Always spawns the cache resolution as its own task so a caller that
/// gives up on the budget doesn't cancel the in-flight transformation
/// out from under other waiters: a dropped follower must never
/// cancel the leader. The task updates the session's context item
/// itself once it finishes, which is how a slow transformation's YAML
/// surfaces on a later turn.
async fn resolve_with_budget(
    state: &AppState,
    session: &Arc<Session>,
    session_id: &SessionId,
    item_id: harvey_types::ItemId,
    url: String,
) -> Option<String> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let cache = state.cache.clone();
    let session_for_task = session.clone();
    let sid = session_id.clone();
    let url_for_task = url.clone();
    let item_id_for_task = item_id.clone();

    tokio::spawn(async move {
        let outcome = cache.resolve(&url_for_task, &sid).await;
        match &outcome {
            Ok(_) => session_for_task.resolve_item(&item_id_for_task, harvey_types::TransformState::Done, None),
            Err(cause) => session_for_task.resolve_item(
                &item_id_for_task,
                harvey_types::TransformState::Failed { cause: cause.to_string() },
                None,
            ),
        }
        let _ = tx.send(outcome);
    });

    match tokio::time::timeout(IMMEDIATE_RESOLUTION_BUDGET, rx).await {
        Ok(Ok(Ok(yaml))) => Some(yaml),
        Ok(Ok(Err(cause))) => {
            tracing::warn!(%url, %cause, "pricing url resolution failed");
            None
        }
        Ok(Err(_)) => None,
        Err(_) => {
            tracing::debug!(%url, "pricing url resolution still in flight, continuing without it");
            None
        }
    }
}

/// Build the turn's context documents: every `kind=yaml` item verbatim,
/// plus a best-effort resolution attempt for every `kind=url` item
/// (old and new), so a transformation that finished between turns
/// surfaces without the caller doing anything special.
async fn gather_context_documents(
    state: &AppState,
    session: &Arc<Session>,
    session_id: &SessionId,
) -> Vec<ContextDocument> {
    let mut docs = Vec::new();
    for item in session.context_items() {
        match item.kind {
            ItemKind::Yaml => docs.push(ContextDocument {
                label: item.label.clone().unwrap_or_else(|| item.id.to_string()),
                yaml: item.value.clone(),
            }),
            ItemKind::Url => {
                if let Some(yaml) = resolve_with_budget(state, session, session_id, item.id.clone(), item.value.clone()).await {
                    docs.push(ContextDocument { label: item.value.clone(), yaml });
                }
            }
        }
    }
    docs
}

/// `POST /chat`.
pub async fn post_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.question.trim().is_empty() {
        return Err(ApiError::Request(RequestError::BadRequest(
            "question must not be empty".to_string(),
        )));
    }

    let now = Utc::now();
    let session_id = req
        .session_id
        .clone()
        .map(SessionId::new)
        .unwrap_or_else(|| SessionId::new(harvey_types::new_opaque_id()));
    let session = state.sessions.get_or_create(&session_id, now);

    for url in collect_urls(&req) {
        session.add_context_item(PricingContextItem::from_url(
            harvey_types::ItemId::new(harvey_types::new_opaque_id()),
            ItemOrigin::User,
            url,
        ));
    }
    for yaml in collect_yamls(&req) {
        session.add_context_item(PricingContextItem::from_yaml(
            harvey_types::ItemId::new(harvey_types::new_opaque_id()),
            ItemOrigin::User,
            yaml,
        ));
    }

    let context_docs = gather_context_documents(&state, &session, &session_id).await;
    let history = session.messages();

    let agent_loop = AgentLoop::new(
        state.provider.clone(),
        state.cache.clone(),
        state.analysis.clone(),
        state.loop_config.clone(),
    );
    let tool_ctx = ToolContext {
        session: session_id.clone(),
        cancellation: session.cancellation_token(),
    };

    let outcome = agent_loop
        .run(&tool_ctx, SYSTEM_PROMPT, &history, &context_docs, &req.question)
        .await;

    session.append_message(Role::User, req.question.clone(), now);
    let completed_at = Utc::now();
    session.append_message(Role::Assistant, outcome.final_answer.clone(), completed_at);

    let plan: Vec<PlanStep> = outcome
        .steps
        .iter()
        .map(|step| PlanStep {
            index: step.index,
            thought: step.thought.clone(),
            tools_called: step.tool_calls.iter().map(|c| c.name.clone()).collect(),
        })
        .collect();

    let result = outcome.steps.iter().rev().find_map(|step| {
        step.observations.iter().find_map(|obs| match obs {
            harvey_types::Observation::Result { value } => Some(value.clone()),
            harvey_types::Observation::Error { .. } => None,
        })
    });

    match outcome.exit_reason {
        harvey_types::ExitReason::Failed => Err(ApiError::Internal(
            outcome
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "agent loop failed".to_string()),
        )),
        _ => Ok(Json(ChatResponse {
            session_id: session_id.to_string(),
            answer: outcome.final_answer,
            plan: if plan.is_empty() { None } else { Some(plan) },
            result,
        })),
    }
}

/// Query parameters accepted by `GET /events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    session_id: Option<String>,
}

/// `GET /events`: an SSE stream of `url_transform` events scoped to a
/// session, derived from a `session_id` query parameter.
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = query
        .session_id
        .map(SessionId::new)
        .ok_or_else(|| ApiError::Request(RequestError::BadRequest("missing session_id".to_string())))?;

    let subscription = state.notify.subscribe(session_id).await;
    let stream = ReceiverStream::new(subscription.rx).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event("url_transform").data(json))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `POST /upload` (multipart, field `file`): store YAML into the blob
/// store and return a handle.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    filename: String,
    relative_url: String,
}

/// Handle the upload itself.
pub async fn post_upload(
    State(state): State<AppState>,
    mut multipart: axum::extract::Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Request(RequestError::BadRequest(e.to_string())))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().unwrap_or("text/plain").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Request(RequestError::BadRequest(e.to_string())))?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| ApiError::Request(RequestError::BadRequest("upload is not valid UTF-8".to_string())))?;

        let id = state.blobs.put(text, &content_type).await?;
        let filename = harvey_blob::blob_filename(&id);
        return Ok(Json(UploadResponse {
            relative_url: format!("/static/{}", id.as_str()),
            filename,
        }));
    }

    Err(ApiError::Request(RequestError::BadRequest(
        "multipart body missing required field \"file\"".to_string(),
    )))
}

/// `DELETE /pricing/{id}` → 204.
pub async fn delete_pricing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let blob_id = harvey_blob::parse_blob_id(&id)?;
    state.blobs.delete(&blob_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /static/{id}` → raw YAML.
pub async fn get_static(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let blob_id = harvey_blob::parse_blob_id(&id)?;
    let yaml = state.blobs.get(&blob_id).await?;
    Ok(([("content-type", "application/yaml")], yaml))
}

/// `GET /health` → `{status: "UP"}` liveness endpoint.
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}
