use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One participant's availability for one event. Upserted by
/// `(event_id, name)` with exact, case-sensitive name matching; later saves
/// replace the availability set wholesale.
///
/// The set is deliberately not validated against the event's slot grid: a
/// participant who submitted before the grid changed keeps their stale
/// selections, and the aggregator simply never asks about them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub availability: Vec<NaiveDateTime>,
}
