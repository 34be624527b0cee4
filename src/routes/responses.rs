use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use chrono::NaiveDateTime;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::db::feed::ResponseEvent;
use crate::db::models::ParticipantResponse;
use crate::error::{AppError, AppResult};
use crate::scheduling::heatmap::{heat_map, SlotSummary};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id/responses", get(list_responses).put(upsert_response))
        .route("/:id/live", get(live_updates))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpsertResponseRequest {
    pub name: String,
    pub availability: Vec<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsesView {
    pub responses: Vec<ParticipantResponse>,
    pub heat_map: Vec<SlotSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveUpdate {
    pub kind: &'static str,
    pub name: String,
    pub heat_map: Vec<SlotSummary>,
}

// ============================================================================
// Handlers
// ============================================================================

/// All responses for an event, plus the aggregated heat map over its slots.
async fn list_responses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ResponsesView>> {
    let event = state
        .store
        .get_event(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    let responses = state.store.list_responses(&id).await?;
    let heat_map = heat_map(&responses, &event.times);

    Ok(Json(ResponsesView {
        responses,
        heat_map,
    }))
}

/// Record or replace a participant's availability. Names are the identity
/// key, matched exactly; re-submitting replaces the previous selection.
async fn upsert_response(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpsertResponseRequest>,
) -> AppResult<Json<ResponsesView>> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name must not be blank".to_string()));
    }

    let event = state
        .store
        .get_event(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    state
        .store
        .upsert_response(&id, name, request.availability)
        .await?;

    let responses = state.store.list_responses(&id).await?;
    let heat_map = heat_map(&responses, &event.times);

    Ok(Json(ResponsesView {
        responses,
        heat_map,
    }))
}

/// Server-sent events: an initial heat-map snapshot, then one message per
/// response change on this event with the recomputed heat map. The
/// subscription is taken before the snapshot is built so no change between
/// fetch and subscribe is lost.
async fn live_updates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let event = state
        .store
        .get_event(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    let rx = state.feed.subscribe();
    let times = event.times;

    let responses = state.store.list_responses(&id).await?;
    let snapshot = LiveUpdate {
        kind: "snapshot",
        name: String::new(),
        heat_map: heat_map(&responses, &times),
    };
    let snapshot = SseEvent::default()
        .json_data(&snapshot)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("encode snapshot: {e}")))?;

    let changes = futures::stream::unfold(
        (rx, state, id, times),
        |(mut rx, state, id, times)| async move {
            loop {
                let change = match rx.recv().await {
                    Ok(change) => change,
                    // A lagged receiver skips ahead; the next frame carries
                    // the full recomputed heat map anyway.
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                };

                if change.event_id() != id {
                    continue;
                }

                let (kind, name) = match &change {
                    ResponseEvent::Added { name, .. } => ("added", name.clone()),
                    ResponseEvent::Updated { name, .. } => ("updated", name.clone()),
                };

                let responses = match state.store.list_responses(&id).await {
                    Ok(responses) => responses,
                    Err(e) => {
                        tracing::warn!("Dropping live update for {}: {:?}", id, e);
                        continue;
                    }
                };

                let update = LiveUpdate {
                    kind,
                    name,
                    heat_map: heat_map(&responses, &times),
                };

                let frame = match SseEvent::default().json_data(&update) {
                    Ok(frame) => Ok(frame),
                    Err(e) => {
                        tracing::warn!("Failed to encode live update: {:?}", e);
                        continue;
                    }
                };

                return Some((frame, (rx, state, id, times)));
            }
        },
    );

    let stream = futures::stream::iter([Ok(snapshot)]).chain(changes);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
