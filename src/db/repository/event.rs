use anyhow::Context;
use sqlx::Row;
use sqlx::SqlitePool;

use crate::db::models::{DateRange, Event};
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Repository
// ============================================================================
//
// The sqlite backend stores `date_range` and `times` as JSON text columns.
// That encoding never leaks past this file: rows are decoded into the domain
// `Event` before anything else sees them.

pub struct EventRepository;

impl EventRepository {
    pub async fn insert(pool: &SqlitePool, event: &Event) -> AppResult<()> {
        let date_range = serde_json::to_string(&event.date_range)
            .context("serialize date_range")
            .map_err(AppError::Internal)?;
        let times = serde_json::to_string(&event.times)
            .context("serialize times")
            .map_err(AppError::Internal)?;

        sqlx::query(
            r#"
            INSERT INTO events (id, name, description, date_range, times, allow_anonymous, access_code, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.name)
        .bind(&event.description)
        .bind(date_range)
        .bind(times)
        .bind(event.allow_anonymous)
        .bind(&event.access_code)
        .bind(event.created_at)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Event>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, date_range, times, allow_anonymous, access_code, created_at
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        row.map(row_to_event).transpose()
    }

    /// Exact match on the stored access code (callers uppercase the input).
    pub async fn find_by_access_code(pool: &SqlitePool, code: &str) -> AppResult<Option<Event>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, date_range, times, allow_anonymous, access_code, created_at
            FROM events
            WHERE access_code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        row.map(row_to_event).transpose()
    }

    /// Legacy lookup for events created before codes were randomly generated:
    /// those derived their code from the first six characters of the id.
    /// Read-only compatibility path; new codes are never minted this way.
    pub async fn find_by_legacy_prefix(pool: &SqlitePool, code: &str) -> AppResult<Option<Event>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, date_range, times, allow_anonymous, access_code, created_at
            FROM events
            WHERE UPPER(SUBSTR(id, 1, 6)) = ?
            "#,
        )
        .bind(code)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        row.map(row_to_event).transpose()
    }

    pub async fn access_code_exists(pool: &SqlitePool, code: &str) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM events WHERE access_code = ? LIMIT 1")
            .bind(code)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row.is_some())
    }
}

fn row_to_event(r: sqlx::sqlite::SqliteRow) -> AppResult<Event> {
    let date_range: String = r.get("date_range");
    let times: String = r.get("times");

    let date_range: DateRange = serde_json::from_str(&date_range)
        .context("decode date_range column")
        .map_err(AppError::Internal)?;
    let times: Vec<chrono::NaiveDateTime> = serde_json::from_str(&times)
        .context("decode times column")
        .map_err(AppError::Internal)?;

    Ok(Event {
        id: r.get("id"),
        name: r.get("name"),
        description: r.get("description"),
        date_range,
        times,
        allow_anonymous: r.get("allow_anonymous"),
        access_code: r.get("access_code"),
        created_at: r.get("created_at"),
    })
}
