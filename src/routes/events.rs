use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::db::models::Event;
use crate::error::{AppError, AppResult};
use crate::scheduling::draft::EventDraft;
use crate::scheduling::slots::{group_by_date, unique_times_of_day};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_event))
        .route("/code/:code", get(resolve_access_code))
        .route("/:id", get(get_event))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// The grid axes a calendar view needs: which dates appear, and which
/// times of day, deduplicated across the whole event.
#[derive(Debug, Serialize)]
pub struct GridAxes {
    pub dates: Vec<NaiveDate>,
    pub times: Vec<NaiveTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    #[serde(flatten)]
    pub event: Event,
    pub share_link: String,
    pub grid: GridAxes,
}

impl EventResponse {
    fn new(event: Event, share_link: String) -> Self {
        let grid = GridAxes {
            dates: group_by_date(&event.times).into_keys().collect(),
            times: unique_times_of_day(&event.times),
        };
        Self {
            event,
            share_link,
            grid,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create an event from an explicit draft. This is the confirmation
/// affordance: the chat flow steers here once the draft is complete, but
/// clients can also call it directly.
async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<EventDraft>,
) -> AppResult<Json<EventResponse>> {
    if !draft.is_complete() {
        return Err(AppError::Validation(
            "Event needs a name, a date range and a time window".to_string(),
        ));
    }

    let event = state.dialogue.persist_draft(&draft).await?;
    tracing::info!("Created event {} ({})", event.id, event.name);

    let link = state.dialogue.share_link(&event.id);
    Ok(Json(EventResponse::new(event, link)))
}

/// Fetch an event by id, with the grid axes a calendar view needs.
async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<EventResponse>> {
    let event = state
        .store
        .get_event(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    let link = state.dialogue.share_link(&event.id);
    Ok(Json(EventResponse::new(event, link)))
}

/// Resolve an access code to an event. Matching is case-insensitive and
/// falls back to the legacy id-prefix scheme for old events.
async fn resolve_access_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<Json<EventResponse>> {
    let event = state
        .access_codes
        .resolve(&code)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(
                "No event matches that access code; check the code or create a new event"
                    .to_string(),
            )
        })?;

    let link = state.dialogue.share_link(&event.id);
    Ok(Json(EventResponse::new(event, link)))
}
