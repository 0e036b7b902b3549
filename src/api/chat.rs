//! The chat turn endpoint: A2A `tasks/sendSubscribe` over POST, answered with
//! an SSE stream of JSON-RPC envelopes.
//!
//! Everything that can fail cheaply (validation, project lookup) fails as a
//! plain HTTP error before the stream opens. Once streaming, failures travel
//! as one JSON-RPC `error` envelope followed by end-of-stream. The
//! subscription is taken out before `turn/send` goes to the child so no
//! notification can race past the listener, and a client abort merely drops
//! the subscription; the in-flight turn keeps running on the child.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gateway::a2a::{self, A2aRequest};
use crate::gateway::client::ClientEvent;
use crate::gateway::tool::ToolKind;
use crate::gateway::ToolGateway;
use crate::server::state::AppState;

pub async fn handler(State(state): State<AppState>, Json(request): Json<A2aRequest>) -> Response {
    match prepare(&state, &request).await {
        Ok((gateway, cwd)) => {
            use futures::StreamExt;
            let stream = turn_envelopes(gateway, cwd, request)
                .map(|envelope| Ok::<_, Infallible>(Event::default().data(envelope.to_string())));
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Resolve the target gateway and working directory, or fail with a plain
/// HTTP error before any stream is opened.
async fn prepare(state: &AppState, request: &A2aRequest) -> Result<(Arc<ToolGateway>, String)> {
    request.validate()?;
    if request.texts().is_empty() {
        return Err(Error::InvalidArgument(
            "message has no text parts".to_string(),
        ));
    }

    let (tool, cwd) = if let Some(project_id) = &request.params.project_id {
        let id: Uuid = project_id
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("Invalid projectId: {project_id}")))?;
        let project = state.store.get_project(id).await?;
        let _ = state.store.touch_project_started(id).await;
        (project.tool_kind, project.workspace_path)
    } else if let Some(cwd) = &request.params.cwd {
        let tool = request.params.tool_kind.unwrap_or(ToolKind::Codex);
        (tool, cwd.clone())
    } else {
        return Err(Error::InvalidArgument(
            "either projectId or cwd is required".to_string(),
        ));
    };

    let gateway = state.gateways.get(tool).await?;
    Ok((gateway, cwd))
}

/// The turn itself: thread, subscribe, send, forward until `final`. Yields
/// the JSON-RPC envelopes that become SSE `data:` payloads.
pub fn turn_envelopes(
    gateway: Arc<ToolGateway>,
    cwd: String,
    request: A2aRequest,
) -> impl Stream<Item = serde_json::Value> {
    let task_id = request.params.task_id.clone();
    let context_id = request.params.context_id.clone();
    let texts = request.texts();

    async_stream::stream! {
        let tool = gateway.client.tool();

        let binding = match gateway.threads.get_or_create(&context_id, &cwd).await {
            Ok(binding) => binding,
            Err(e) => {
                yield a2a::error_envelope(&task_id, &e.to_string());
                return;
            }
        };

        // One turn at a time per session: the child's deltas carry no turn
        // marker, so an overlapping turn on the same thread would bleed into
        // this stream. The guard releases on drop, client aborts included.
        let _turn = gateway.threads.turn_guard(&context_id).await;

        // Subscribe before the turn is sent; notifications cannot race past.
        let mut sub = gateway.client.subscribe();
        let agent_msg_id = a2a::agent_message_id(&task_id);

        let params = tool.turn_send_params(&binding.thread_id, &cwd, &texts);
        if let Err(e) = gateway.client.call(tool.turn_send_method(), Some(params)).await {
            yield a2a::error_envelope(&task_id, &e.to_string());
            return;
        }

        loop {
            match sub.recv().await {
                Some(ClientEvent::Notification(notification)) => {
                    let Some(update) = a2a::status_update(
                        tool,
                        &notification,
                        &task_id,
                        &context_id,
                        &binding.thread_id,
                        &agent_msg_id,
                    ) else {
                        continue;
                    };
                    let is_final = update.is_final;
                    yield a2a::status_envelope(&task_id, update.payload);
                    if is_final {
                        break;
                    }
                }
                Some(ClientEvent::Stderr(line)) => {
                    tracing::debug!(%line, "agent stderr during turn");
                }
                Some(ClientEvent::Exit { code }) => {
                    let message = match code {
                        Some(code) => format!("agent process exited with code {code}"),
                        None => "agent process exited".to_string(),
                    };
                    yield a2a::error_envelope(&task_id, &message);
                    break;
                }
                None => break,
            }
        }
    }
}
