//! One conversational turn, end to end: extraction, draft merging, and the
//! create/join branching. State (draft + history) is owned by the caller and
//! passed through explicitly; a turn either fully advances it or leaves it
//! untouched apart from the appended user message.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::models::NewEvent;
use crate::db::store::EventStore;
use crate::error::{AppError, AppResult};
use crate::scheduling::draft::EventDraft;
use crate::scheduling::slots::generate_slots;
use crate::services::access_code::AccessCodeService;
use crate::services::extraction::{build_system_prompt, ChatMessage, Extractor};

pub const REPLY_EXTRACTION_TROUBLE: &str =
    "I'm having trouble processing your request. Please try again in a moment.";
pub const REPLY_CONNECTION_TROUBLE: &str =
    "I'm having trouble connecting. Please check your connection and try again.";
pub const REPLY_NOT_CONFIGURED: &str =
    "I'm not properly configured yet. Please ask the administrator to set up the assistant.";
pub const REPLY_JOIN_FOUND: &str = "Great! I found your event. Use the button below to join.";
pub const REPLY_JOIN_NOT_FOUND: &str = "I couldn't find an event with that access code. Please \
     check the code and try again, or let me know if you'd like to create a new event instead.";
pub const REPLY_JOIN_ERROR: &str = "Sorry, I ran into an error while looking up that event. \
     Please try again, or let me know if you'd like to create a new event instead.";
pub const REPLY_CONFIRM_PROMPT: &str =
    "Please review the event details and use the create button to confirm.";
pub const REPLY_CREATE_FAILED: &str =
    "I encountered an error while creating the event. Please try again.";

/// Result of one turn. `draft_complete` is reported here, synchronously, so
/// the caller can decide whether to surface the confirmation affordance; no
/// ambient signaling is involved.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub draft: EventDraft,
    pub history: Vec<ChatMessage>,
    pub draft_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined_event_id: Option<String>,
}

impl TurnOutcome {
    fn new(reply: impl Into<String>, draft: EventDraft, history: Vec<ChatMessage>) -> Self {
        let draft_complete = draft.is_complete();
        Self {
            reply: reply.into(),
            draft,
            history,
            draft_complete,
            created_event_id: None,
            joined_event_id: None,
        }
    }
}

pub struct DialogueController {
    store: Arc<dyn EventStore>,
    extractor: Arc<dyn Extractor>,
    access_codes: AccessCodeService,
    frontend_url: String,
}

impl DialogueController {
    pub fn new(
        store: Arc<dyn EventStore>,
        extractor: Arc<dyn Extractor>,
        frontend_url: String,
    ) -> Self {
        let access_codes = AccessCodeService::new(store.clone());
        Self {
            store,
            extractor,
            access_codes,
            frontend_url,
        }
    }

    /// Drive one turn. `today` is injected so relative date expressions in
    /// the extraction resolve against the caller's clock, not the model's.
    pub async fn handle_turn(
        &self,
        user_text: &str,
        draft: EventDraft,
        mut history: Vec<ChatMessage>,
        today: NaiveDate,
    ) -> TurnOutcome {
        history.push(ChatMessage::user(user_text));

        let mut request = Vec::with_capacity(history.len() + 1);
        request.push(build_system_prompt(&draft, today));
        request.extend(history.iter().cloned());

        let outcome = match self.extractor.extract(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Recoverable: the appended user turn is kept, everything
                // else stays as it was.
                tracing::warn!("Extraction failed: {:?}", e);
                let reply = match e {
                    AppError::Config(_) => REPLY_NOT_CONFIGURED,
                    AppError::Request(_) => REPLY_CONNECTION_TROUBLE,
                    _ => REPLY_EXTRACTION_TROUBLE,
                };
                return TurnOutcome::new(reply, draft, history);
            }
        };

        if let Some(analysis) = &outcome.analysis {
            tracing::debug!("Extraction analysis: {analysis}");
        }

        // Join short-circuits: no merging or creation in the same turn.
        if outcome.should_join_event {
            if let Some(code) = outcome
                .updates
                .as_ref()
                .and_then(|u| u.access_code.as_deref())
            {
                return self.join_event(code, draft, history).await;
            }
        }

        let merged = match &outcome.updates {
            Some(updates) => draft.merge(updates),
            None => draft,
        };

        // Creation requires the extractor's intent flag AND an explicit
        // affirmative phrase in the user's own words AND a complete draft.
        // Completeness alone never creates anything.
        if outcome.should_create_event && wants_creation(user_text) && merged.is_complete() {
            return self.create_event(merged, history).await;
        }

        let reply = if merged.is_complete() {
            // Steer to the confirmation affordance instead of free text.
            REPLY_CONFIRM_PROMPT.to_string()
        } else {
            outcome.message
        };
        history.push(ChatMessage::assistant(&reply));
        TurnOutcome::new(reply, merged, history)
    }

    async fn join_event(
        &self,
        code: &str,
        draft: EventDraft,
        mut history: Vec<ChatMessage>,
    ) -> TurnOutcome {
        match self.access_codes.resolve(code).await {
            Ok(Some(event)) => {
                history.push(ChatMessage::assistant(REPLY_JOIN_FOUND));
                let mut outcome = TurnOutcome::new(REPLY_JOIN_FOUND, draft, history);
                outcome.joined_event_id = Some(event.id);
                outcome
            }
            Ok(None) => {
                history.push(ChatMessage::assistant(REPLY_JOIN_NOT_FOUND));
                TurnOutcome::new(REPLY_JOIN_NOT_FOUND, draft, history)
            }
            Err(e) => {
                tracing::error!("Access code resolution failed: {:?}", e);
                history.push(ChatMessage::assistant(REPLY_JOIN_ERROR));
                TurnOutcome::new(REPLY_JOIN_ERROR, draft, history)
            }
        }
    }

    async fn create_event(&self, draft: EventDraft, mut history: Vec<ChatMessage>) -> TurnOutcome {
        match self.persist_draft(&draft).await {
            Ok(event) => {
                let link = self.share_link(&event.id);
                let reply = format!(
                    "Perfect! I've created your event \"{}\". Here's your event link:\n\n{}\n\n\
                     Share it with participants, or hand out the access code {}.",
                    event.name, link, event.access_code
                );
                history.push(ChatMessage::assistant(&reply));
                // Draft is only cleared on confirmed success.
                let mut outcome = TurnOutcome::new(reply, EventDraft::default(), history);
                outcome.created_event_id = Some(event.id);
                outcome
            }
            Err(AppError::Validation(msg)) => {
                tracing::warn!("Draft rejected at creation: {msg}");
                let window = draft.time_window.clone().unwrap_or_default();
                let reply = format!(
                    "I couldn't make sense of the time window \"{window}\". Could you rephrase \
                     it, for example \"9 AM - 5 PM\"?"
                );
                history.push(ChatMessage::assistant(&reply));
                TurnOutcome::new(reply, draft, history)
            }
            Err(e) => {
                tracing::error!("Event creation failed: {:?}", e);
                history.push(ChatMessage::assistant(REPLY_CREATE_FAILED));
                TurnOutcome::new(REPLY_CREATE_FAILED, draft, history)
            }
        }
    }

    /// Materialize a complete draft into a persisted event. Public because
    /// the explicit confirmation endpoint goes through the same path.
    pub async fn persist_draft(&self, draft: &EventDraft) -> AppResult<crate::db::models::Event> {
        let name = draft
            .name
            .clone()
            .ok_or_else(|| AppError::Validation("Draft is missing a name".into()))?;
        let date_range = draft
            .date_range
            .clone()
            .ok_or_else(|| AppError::Validation("Draft is missing a date range".into()))?;

        let times = generate_slots(&date_range, draft.time_window.as_deref())?;

        let code = self.access_codes.generate().await?;
        self.store
            .create_event(
                NewEvent {
                    name,
                    description: draft.description.clone(),
                    date_range,
                    times,
                    allow_anonymous: draft.allow_anonymous.unwrap_or(false),
                },
                code,
            )
            .await
    }

    pub fn share_link(&self, event_id: &str) -> String {
        format!("{}/event/{}", self.frontend_url.trim_end_matches('/'), event_id)
    }
}

/// The user's own words must contain both an affirmation and a creation
/// token. This keeps an assistant summary that merely mentions "create"
/// from triggering persistence.
fn wants_creation(user_text: &str) -> bool {
    let lower = user_text.to_lowercase();
    lower.contains("yes") && lower.contains("create")
}
