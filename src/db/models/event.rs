use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Inclusive calendar date range. Normalized at the extraction boundary so
/// nothing downstream has to care whether the model produced strings or an
/// object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// A persisted event. `times` is always materialized: even a flexible
/// window is expanded to concrete slots before the event is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub date_range: DateRange,
    pub times: Vec<NaiveDateTime>,
    pub allow_anonymous: bool,
    pub access_code: String,
    pub created_at: NaiveDateTime,
}

/// Everything needed to insert an event; id, access code and timestamp are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub description: Option<String>,
    pub date_range: DateRange,
    pub times: Vec<NaiveDateTime>,
    pub allow_anonymous: bool,
}
