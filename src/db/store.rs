//! The persistence contract and its two interchangeable backends.
//!
//! Core logic only ever sees the [`EventStore`] trait; which backend backs
//! it is decided once, at startup, from configuration. The sqlite backend
//! keeps structured fields as JSON text columns, the in-memory backend keeps
//! native structs; both normalize to the same domain types at the boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::feed::{ResponseEvent, ResponseFeed};
use crate::db::models::{Event, NewEvent, ParticipantResponse};
use crate::db::repository::{EventRepository, ResponseRepository};
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event under the given (already unique) access code.
    /// Fails validation if the materialized slot list is empty.
    async fn create_event(&self, new: NewEvent, access_code: String) -> AppResult<Event>;

    async fn get_event(&self, id: &str) -> AppResult<Option<Event>>;

    /// Exact access-code lookup; expects an uppercased code.
    async fn get_event_by_access_code(&self, code: &str) -> AppResult<Option<Event>>;

    /// Legacy id-prefix lookup for events that predate random codes.
    async fn find_by_legacy_code(&self, code: &str) -> AppResult<Option<Event>>;

    async fn access_code_exists(&self, code: &str) -> AppResult<bool>;

    async fn list_responses(&self, event_id: &str) -> AppResult<Vec<ParticipantResponse>>;

    /// Insert-or-replace by `(event_id, name)`, last write wins. Publishes a
    /// change-feed event on success and returns the response id.
    async fn upsert_response(
        &self,
        event_id: &str,
        name: &str,
        availability: Vec<NaiveDateTime>,
    ) -> AppResult<String>;
}

fn validate_new_event(new: &NewEvent) -> AppResult<()> {
    if new.name.trim().is_empty() {
        return Err(AppError::Validation("Event name must not be empty".into()));
    }
    if new.times.is_empty() {
        return Err(AppError::Validation(
            "Event must have at least one time slot".into(),
        ));
    }
    Ok(())
}

// ============================================================================
// Sqlite backend
// ============================================================================

pub struct SqliteEventStore {
    pool: SqlitePool,
    feed: ResponseFeed,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool, feed: ResponseFeed) -> Self {
        Self { pool, feed }
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn create_event(&self, new: NewEvent, access_code: String) -> AppResult<Event> {
        validate_new_event(&new)?;

        let event = Event {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            description: new.description,
            date_range: new.date_range,
            times: new.times,
            allow_anonymous: new.allow_anonymous,
            access_code,
            created_at: Utc::now().naive_utc(),
        };

        EventRepository::insert(&self.pool, &event).await?;
        tracing::info!(event_id = %event.id, code = %event.access_code, "Created event");

        Ok(event)
    }

    async fn get_event(&self, id: &str) -> AppResult<Option<Event>> {
        EventRepository::find_by_id(&self.pool, id).await
    }

    async fn get_event_by_access_code(&self, code: &str) -> AppResult<Option<Event>> {
        EventRepository::find_by_access_code(&self.pool, code).await
    }

    async fn find_by_legacy_code(&self, code: &str) -> AppResult<Option<Event>> {
        EventRepository::find_by_legacy_prefix(&self.pool, code).await
    }

    async fn access_code_exists(&self, code: &str) -> AppResult<bool> {
        EventRepository::access_code_exists(&self.pool, code).await
    }

    async fn list_responses(&self, event_id: &str) -> AppResult<Vec<ParticipantResponse>> {
        ResponseRepository::list_by_event(&self.pool, event_id).await
    }

    async fn upsert_response(
        &self,
        event_id: &str,
        name: &str,
        availability: Vec<NaiveDateTime>,
    ) -> AppResult<String> {
        let (id, created) =
            ResponseRepository::upsert(&self.pool, event_id, name, &availability).await?;

        self.feed.publish(if created {
            ResponseEvent::Added {
                event_id: event_id.to_string(),
                name: name.to_string(),
            }
        } else {
            ResponseEvent::Updated {
                event_id: event_id.to_string(),
                name: name.to_string(),
            }
        });

        Ok(id)
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Default)]
struct MemoryState {
    events: HashMap<String, Event>,
    // event_id -> responses, ordered by first save
    responses: HashMap<String, Vec<ParticipantResponse>>,
}

pub struct MemoryEventStore {
    state: RwLock<MemoryState>,
    feed: ResponseFeed,
}

impl MemoryEventStore {
    pub fn new(feed: ResponseFeed) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            feed,
        }
    }

    /// Seed an event directly, bypassing code generation. Test-oriented
    /// helper for exercising legacy-code resolution paths.
    pub async fn insert_event_raw(&self, event: Event) {
        self.state.write().await.events.insert(event.id.clone(), event);
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn create_event(&self, new: NewEvent, access_code: String) -> AppResult<Event> {
        validate_new_event(&new)?;

        let event = Event {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            description: new.description,
            date_range: new.date_range,
            times: new.times,
            allow_anonymous: new.allow_anonymous,
            access_code,
            created_at: Utc::now().naive_utc(),
        };

        self.state
            .write()
            .await
            .events
            .insert(event.id.clone(), event.clone());

        Ok(event)
    }

    async fn get_event(&self, id: &str) -> AppResult<Option<Event>> {
        Ok(self.state.read().await.events.get(id).cloned())
    }

    async fn get_event_by_access_code(&self, code: &str) -> AppResult<Option<Event>> {
        Ok(self
            .state
            .read()
            .await
            .events
            .values()
            .find(|e| e.access_code == code)
            .cloned())
    }

    async fn find_by_legacy_code(&self, code: &str) -> AppResult<Option<Event>> {
        Ok(self
            .state
            .read()
            .await
            .events
            .values()
            .find(|e| {
                e.id.len() >= 6 && e.id[..6].to_uppercase() == code
            })
            .cloned())
    }

    async fn access_code_exists(&self, code: &str) -> AppResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .events
            .values()
            .any(|e| e.access_code == code))
    }

    async fn list_responses(&self, event_id: &str) -> AppResult<Vec<ParticipantResponse>> {
        Ok(self
            .state
            .read()
            .await
            .responses
            .get(event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_response(
        &self,
        event_id: &str,
        name: &str,
        availability: Vec<NaiveDateTime>,
    ) -> AppResult<String> {
        // Single write lock makes the read-modify-write atomic.
        let mut state = self.state.write().await;
        let responses = state.responses.entry(event_id.to_string()).or_default();

        let (id, created) = match responses.iter_mut().find(|r| r.name == name) {
            Some(existing) => {
                existing.availability = availability;
                (existing.id.clone(), false)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                responses.push(ParticipantResponse {
                    id: id.clone(),
                    event_id: event_id.to_string(),
                    name: name.to_string(),
                    availability,
                });
                (id, true)
            }
        };
        drop(state);

        self.feed.publish(if created {
            ResponseEvent::Added {
                event_id: event_id.to_string(),
                name: name.to_string(),
            }
        } else {
            ResponseEvent::Updated {
                event_id: event_id.to_string(),
                name: name.to_string(),
            }
        });

        Ok(id)
    }
}
