//! Per-slot availability aggregation for the heat-map grid.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::db::models::ParticipantResponse;

/// Availability of one slot across all respondents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotInfo {
    pub count: usize,
    pub names: Vec<String>,
    pub fraction: f64,
    pub band: HeatBand,
}

/// Color banding for the grid. Thresholds are inclusive on their upper end:
/// a slot every respondent picked lands in `Band4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatBand {
    None,
    Band1,
    Band2,
    Band3,
    Band4,
}

impl HeatBand {
    pub fn from_fraction(fraction: f64) -> Self {
        if fraction <= 0.0 {
            HeatBand::None
        } else if fraction <= 0.25 {
            HeatBand::Band1
        } else if fraction <= 0.5 {
            HeatBand::Band2
        } else if fraction <= 0.75 {
            HeatBand::Band3
        } else {
            HeatBand::Band4
        }
    }
}

/// Who can make `slot`, and what share of all respondents that is.
/// O(respondents) per call; cheap enough to rerun on every feed tick.
/// The fraction is always 0 when nobody has responded yet.
pub fn slot_info(responses: &[ParticipantResponse], slot: NaiveDateTime) -> SlotInfo {
    let names: Vec<String> = responses
        .iter()
        .filter(|r| r.availability.contains(&slot))
        .map(|r| r.name.clone())
        .collect();

    let count = names.len();
    let fraction = if responses.is_empty() {
        0.0
    } else {
        count as f64 / responses.len() as f64
    };

    SlotInfo {
        count,
        names,
        band: HeatBand::from_fraction(fraction),
        fraction,
    }
}

/// One heat-map entry per candidate slot, in the order the slots were given.
#[derive(Debug, Clone, Serialize)]
pub struct SlotSummary {
    pub slot: NaiveDateTime,
    #[serde(flatten)]
    pub info: SlotInfo,
}

pub fn heat_map(responses: &[ParticipantResponse], slots: &[NaiveDateTime]) -> Vec<SlotSummary> {
    slots
        .iter()
        .map(|&slot| SlotSummary {
            slot,
            info: slot_info(responses, slot),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        s.parse().unwrap()
    }

    fn response(name: &str, slots: &[&str]) -> ParticipantResponse {
        ParticipantResponse {
            id: format!("resp-{name}"),
            event_id: "evt".into(),
            name: name.into(),
            availability: slots.iter().map(|s| ts(s)).collect(),
        }
    }

    #[test]
    fn counts_and_fractions() {
        let t1 = "2024-06-03T09:00:00";
        let t2 = "2024-06-03T10:00:00";
        let responses = vec![response("alice", &[t1, t2]), response("bob", &[t1])];

        let info = slot_info(&responses, ts(t1));
        assert_eq!(info.count, 2);
        assert_eq!(info.fraction, 1.0);
        assert_eq!(info.names, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(info.band, HeatBand::Band4);

        let info = slot_info(&responses, ts(t2));
        assert_eq!(info.count, 1);
        assert_eq!(info.fraction, 0.5);
        assert_eq!(info.band, HeatBand::Band2);
    }

    #[test]
    fn zero_respondents_means_zero_fraction() {
        let info = slot_info(&[], ts("2024-06-03T09:00:00"));
        assert_eq!(info.count, 0);
        assert_eq!(info.fraction, 0.0);
        assert_eq!(info.band, HeatBand::None);
    }

    #[test]
    fn fraction_is_monotonic_in_count() {
        let t = "2024-06-03T09:00:00";
        let mut responses = vec![
            response("a", &[]),
            response("b", &[]),
            response("c", &[]),
            response("d", &[]),
        ];
        let mut last = -1.0;
        for i in 0..responses.len() {
            responses[i].availability.push(ts(t));
            let info = slot_info(&responses, ts(t));
            assert_eq!(info.count, i + 1);
            assert!(info.fraction > last);
            last = info.fraction;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn band_thresholds() {
        assert_eq!(HeatBand::from_fraction(0.0), HeatBand::None);
        assert_eq!(HeatBand::from_fraction(0.25), HeatBand::Band1);
        assert_eq!(HeatBand::from_fraction(0.26), HeatBand::Band2);
        assert_eq!(HeatBand::from_fraction(0.5), HeatBand::Band2);
        assert_eq!(HeatBand::from_fraction(0.75), HeatBand::Band3);
        assert_eq!(HeatBand::from_fraction(0.76), HeatBand::Band4);
        assert_eq!(HeatBand::from_fraction(1.0), HeatBand::Band4);
    }

    #[test]
    fn heat_map_covers_all_slots_in_order() {
        let slots = vec![ts("2024-06-03T09:00:00"), ts("2024-06-03T10:00:00")];
        let responses = vec![response("alice", &["2024-06-03T10:00:00"])];
        let map = heat_map(&responses, &slots);
        assert_eq!(map.len(), 2);
        assert_eq!(map[0].slot, slots[0]);
        assert_eq!(map[0].info.count, 0);
        assert_eq!(map[1].info.count, 1);
    }
}
