//! The in-progress event description filled in over the course of a
//! conversation, and the merge rules for folding extraction results into it.

use serde::{Deserialize, Serialize};

use crate::db::models::DateRange;

/// An unpersisted event being assembled conversationally. Created empty at
/// conversation start, mutated only through [`EventDraft::merge`], and reset
/// after a successful creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventDraft {
    pub name: Option<String>,
    pub description: Option<String>,
    pub date_range: Option<DateRange>,
    /// Free text or a normalized `"HH:MM - HH:MM"` range; `None` means the
    /// window is flexible and the full day is expanded at creation time.
    /// On the wire this keeps the extraction contract's name.
    #[serde(rename = "timesThatWork", alias = "timeWindow")]
    pub time_window: Option<String>,
    pub allow_anonymous: Option<bool>,
}

/// Partial update extracted from one user message. Every field is optional;
/// `None` leaves the corresponding draft field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DraftUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub date_range: Option<DateRange>,
    /// The extraction contract calls this `timesThatWork`.
    #[serde(rename = "timesThatWork", alias = "timeWindow")]
    pub time_window: Option<String>,
    pub allow_anonymous: Option<bool>,
    /// Present when the user is trying to join an existing event.
    pub access_code: Option<String>,
}

impl EventDraft {
    /// Fold `updates` into this draft, returning a new draft.
    ///
    /// Every field is first-write-wins: once the user has pinned a name or a
    /// date range, a later extraction never silently replaces it. The one
    /// exception is `description`, which is refined continuously and so is
    /// last-write-wins.
    pub fn merge(&self, updates: &DraftUpdate) -> EventDraft {
        EventDraft {
            name: self.name.clone().or_else(|| updates.name.clone()),
            description: updates
                .description
                .clone()
                .or_else(|| self.description.clone()),
            date_range: self.date_range.clone().or_else(|| updates.date_range.clone()),
            time_window: self
                .time_window
                .clone()
                .or_else(|| updates.time_window.clone()),
            allow_anonymous: self.allow_anonymous.or(updates.allow_anonymous),
        }
    }

    /// The single gate for showing the create-confirmation affordance and
    /// for allowing persistence: name, dates and a time window must all be
    /// known. Description and anonymity are optional extras.
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.date_range.is_some() && self.time_window.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_range() -> DateRange {
        DateRange {
            start: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 6, 4).unwrap(),
        }
    }

    #[test]
    fn empty_draft_is_incomplete() {
        assert!(!EventDraft::default().is_complete());
    }

    #[test]
    fn completeness_ignores_optional_fields() {
        let draft = EventDraft {
            name: Some("Team Sync".into()),
            date_range: Some(sample_range()),
            time_window: Some("9 AM - 11 AM".into()),
            ..Default::default()
        };
        assert!(draft.is_complete());

        let missing_window = EventDraft {
            time_window: None,
            description: Some("weekly".into()),
            allow_anonymous: Some(true),
            ..draft.clone()
        };
        assert!(!missing_window.is_complete());
    }

    #[test]
    fn first_write_wins_for_name() {
        let draft = EventDraft::default().merge(&DraftUpdate {
            name: Some("X".into()),
            ..Default::default()
        });
        assert_eq!(draft.name.as_deref(), Some("X"));

        let unchanged = draft.merge(&DraftUpdate {
            name: Some("Y".into()),
            ..Default::default()
        });
        assert_eq!(unchanged.name.as_deref(), Some("X"));
    }

    #[test]
    fn merge_is_idempotent_on_set_fields() {
        let draft = EventDraft {
            name: Some("X".into()),
            ..Default::default()
        };
        let merged = draft.merge(&DraftUpdate {
            name: Some("X".into()),
            ..Default::default()
        });
        assert_eq!(merged, draft);
    }

    #[test]
    fn description_is_last_write_wins() {
        let draft = EventDraft {
            description: Some("A".into()),
            ..Default::default()
        };
        let merged = draft.merge(&DraftUpdate {
            description: Some("B".into()),
            ..Default::default()
        });
        assert_eq!(merged.description.as_deref(), Some("B"));
    }

    #[test]
    fn none_fields_leave_draft_untouched() {
        let draft = EventDraft {
            name: Some("X".into()),
            date_range: Some(sample_range()),
            time_window: Some("9 - 17".into()),
            description: Some("A".into()),
            allow_anonymous: Some(false),
        };
        let merged = draft.merge(&DraftUpdate::default());
        assert_eq!(merged, draft);
    }

    #[test]
    fn merge_returns_new_draft() {
        let draft = EventDraft::default();
        let merged = draft.merge(&DraftUpdate {
            name: Some("X".into()),
            ..Default::default()
        });
        assert!(draft.name.is_none());
        assert!(merged.name.is_some());
    }
}
