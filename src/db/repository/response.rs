use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use sqlx::Row;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::ParticipantResponse;
use crate::error::{AppError, AppResult};

// ============================================================================
// Response Repository
// ============================================================================

pub struct ResponseRepository;

impl ResponseRepository {
    pub async fn list_by_event(
        pool: &SqlitePool,
        event_id: &str,
    ) -> AppResult<Vec<ParticipantResponse>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, name, availability
            FROM responses
            WHERE event_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter()
            .map(|r| {
                let availability: String = r.get("availability");
                let availability: Vec<NaiveDateTime> = serde_json::from_str(&availability)
                    .context("decode availability column")
                    .map_err(AppError::Internal)?;
                Ok(ParticipantResponse {
                    id: r.get("id"),
                    event_id: r.get("event_id"),
                    name: r.get("name"),
                    availability,
                })
            })
            .collect()
    }

    /// Insert or replace the availability for `(event_id, name)`.
    ///
    /// Runs in a single transaction so concurrent saves under the same name
    /// are strictly last-write-wins with no interleaved state. Returns the
    /// response id and whether the row is new.
    pub async fn upsert(
        pool: &SqlitePool,
        event_id: &str,
        name: &str,
        availability: &[NaiveDateTime],
    ) -> AppResult<(String, bool)> {
        let availability = serde_json::to_string(availability)
            .context("serialize availability")
            .map_err(AppError::Internal)?;
        let now = Utc::now().naive_utc();

        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let existing = sqlx::query("SELECT id FROM responses WHERE event_id = ? AND name = ?")
            .bind(event_id)
            .bind(name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        let (id, created) = match existing {
            Some(row) => {
                let id: String = row.get("id");
                sqlx::query("UPDATE responses SET availability = ?, updated_at = ? WHERE id = ?")
                    .bind(&availability)
                    .bind(now)
                    .bind(&id)
                    .execute(&mut *tx)
                    .await
                    .map_err(AppError::Database)?;
                (id, false)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                sqlx::query(
                    r#"
                    INSERT INTO responses (id, event_id, name, availability, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(event_id)
                .bind(name)
                .bind(&availability)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(AppError::Database)?;
                (id, true)
            }
        };

        tx.commit().await.map_err(AppError::Database)?;

        Ok((id, created))
    }
}
