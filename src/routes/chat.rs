use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::AppResult;
use crate::scheduling::draft::EventDraft;
use crate::services::extraction::ChatMessage;
use crate::services::dialogue::TurnOutcome;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/turn", post(chat_turn))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// The client owns conversation state and sends it back with every turn.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub message: String,
    #[serde(default)]
    pub draft: EventDraft,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Overridable for clients in other time zones; defaults to the
    /// server's UTC date.
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Run one conversational turn through the dialogue controller.
async fn chat_turn(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TurnRequest>,
) -> AppResult<Json<TurnOutcome>> {
    let today = request
        .today
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let outcome = state
        .dialogue
        .handle_turn(&request.message, request.draft, request.history, today)
        .await;

    Ok(Json(outcome))
}
