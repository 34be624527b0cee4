//! Slot generation: expanding a date range + time-of-day window into the
//! concrete hour-aligned timestamps participants can book, plus the inverse
//! groupings that build the availability grid's axes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::db::models::DateRange;
use crate::error::{AppError, AppResult};

/// Markers the extraction layer may hand us instead of a concrete window.
const FLEXIBLE_MARKERS: &[&str] = &["flexible", "any time", "anytime", "any"];

/// A parsed time-of-day window. `end <= start` means the window crosses
/// midnight and spills its tail hours into the following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourWindow {
    FullDay,
    Range { start: u32, end: u32 },
}

impl HourWindow {
    /// Parse a free-text window like `"9 AM - 11 AM"`, `"22:00 to 2:00"` or
    /// `"9 - 17"`. `None` and flexible markers expand to the full day.
    /// Anything else that does not parse is a hard validation error; callers
    /// are expected to ask the user to clarify rather than create a
    /// zero-slot event.
    pub fn parse(raw: Option<&str>) -> AppResult<Self> {
        let raw = match raw {
            None => return Ok(HourWindow::FullDay),
            Some(r) => r.trim(),
        };
        if raw.is_empty() || FLEXIBLE_MARKERS.contains(&raw.to_lowercase().as_str()) {
            return Ok(HourWindow::FullDay);
        }

        let (start_tok, end_tok) = split_window(raw)
            .ok_or_else(|| AppError::Validation(format!("Unparseable time window: {raw:?}")))?;

        let start = parse_hour_token(&start_tok)
            .ok_or_else(|| AppError::Validation(format!("Unparseable start hour: {start_tok:?}")))?;
        let end = parse_hour_token(&end_tok)
            .ok_or_else(|| AppError::Validation(format!("Unparseable end hour: {end_tok:?}")))?;

        Ok(HourWindow::Range { start, end })
    }

    pub fn spans_midnight(&self) -> bool {
        matches!(self, HourWindow::Range { start, end } if end <= start)
    }
}

/// Split `"X - Y"` or `"X to Y"` (case-insensitive) into its two hour tokens.
fn split_window(raw: &str) -> Option<(String, String)> {
    if let Some(idx) = find_to_separator(raw) {
        let (a, b) = raw.split_at(idx);
        return Some((a.trim().to_string(), b[4..].trim().to_string()));
    }
    if let Some(idx) = raw.find('-') {
        let (a, b) = raw.split_at(idx);
        return Some((a.trim().to_string(), b[1..].trim().to_string()));
    }
    None
}

/// Byte offset of a `" to "` separator, matched ASCII-case-insensitively.
/// The scan stays on `raw`'s own bytes: an index taken from a lowercased
/// copy can differ in length and land inside a multi-byte character.
fn find_to_separator(raw: &str) -> Option<usize> {
    raw.as_bytes().windows(4).position(|w| {
        w[0] == b' '
            && w[1].eq_ignore_ascii_case(&b't')
            && w[2].eq_ignore_ascii_case(&b'o')
            && w[3] == b' '
    })
}

/// Parse one hour token (`"9"`, `"9 AM"`, `"12pm"`, `"21:30"`) to 0-23.
/// `12 AM` maps to 0 and `12 PM` to 12; minutes are accepted but dropped
/// since slots are hour-aligned.
fn parse_hour_token(token: &str) -> Option<u32> {
    let mut t = token.trim().to_lowercase();

    let meridiem = if let Some(stripped) = t.strip_suffix("am") {
        t = stripped.trim().to_string();
        Some(false)
    } else if let Some(stripped) = t.strip_suffix("pm") {
        t = stripped.trim().to_string();
        Some(true)
    } else {
        None
    };

    let hour_part = match t.split_once(':') {
        Some((h, m)) => {
            // Minutes must at least look like minutes for the token to count
            // as HH:MM.
            let minutes: u32 = m.trim().parse().ok()?;
            if minutes > 59 {
                return None;
            }
            h.trim()
        }
        None => t.as_str(),
    };

    let mut hour: u32 = hour_part.parse().ok()?;

    match meridiem {
        Some(pm) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            if pm {
                if hour != 12 {
                    hour += 12;
                }
            } else if hour == 12 {
                hour = 0;
            }
        }
        None => {
            if hour > 23 {
                return None;
            }
        }
    }

    Some(hour)
}

/// Expand a calendar date range and a time-of-day window into the ordered
/// list of bookable slots, one per hour, seconds always zero.
///
/// The range is inclusive on both ends and swapped if given reversed. A
/// midnight-spanning window emits `[start, 24)` on each day and carries
/// `[0, end)` over to the next day only while that day is still inside the
/// range.
pub fn generate_slots(range: &DateRange, window: Option<&str>) -> AppResult<Vec<NaiveDateTime>> {
    let window = HourWindow::parse(window)?;

    let (first, last) = if range.start <= range.end {
        (range.start, range.end)
    } else {
        (range.end, range.start)
    };

    let mut slots = Vec::new();
    let mut day = first;
    while day <= last {
        match window {
            HourWindow::FullDay => push_hours(&mut slots, day, 0, 24),
            HourWindow::Range { start, end } if end <= start => {
                // The tail of the previous day's window lands on this day.
                if day > first {
                    push_hours(&mut slots, day, 0, end);
                }
                push_hours(&mut slots, day, start, 24);
            }
            HourWindow::Range { start, end } => push_hours(&mut slots, day, start, end),
        }
        day += Duration::days(1);
    }

    Ok(slots)
}

fn push_hours(slots: &mut Vec<NaiveDateTime>, day: NaiveDate, from: u32, to: u32) {
    for hour in from..to {
        if let Some(ts) = day.and_hms_opt(hour, 0, 0) {
            slots.push(ts);
        }
    }
}

/// Group slots by calendar date, ascending in both keys and values.
/// Idempotent: regrouping the flattened result yields the same map.
pub fn group_by_date(slots: &[NaiveDateTime]) -> BTreeMap<NaiveDate, Vec<NaiveDateTime>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<NaiveDateTime>> = BTreeMap::new();
    for slot in slots {
        grouped.entry(slot.date()).or_default().push(*slot);
    }
    for times in grouped.values_mut() {
        times.sort();
    }
    grouped
}

/// Distinct times of day across all slots, ascending. These become the
/// grid's row axis; `group_by_date` keys become the columns.
pub fn unique_times_of_day(slots: &[NaiveDateTime]) -> Vec<NaiveTime> {
    let set: BTreeSet<NaiveTime> = slots.iter().map(|s| s.time()).collect();
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange {
            start: date(start),
            end: date(end),
        }
    }

    #[test]
    fn parses_plain_hours() {
        assert_eq!(parse_hour_token("9"), Some(9));
        assert_eq!(parse_hour_token("0"), Some(0));
        assert_eq!(parse_hour_token("23"), Some(23));
        assert_eq!(parse_hour_token("24"), None);
    }

    #[test]
    fn parses_meridiem_hours() {
        assert_eq!(parse_hour_token("9 AM"), Some(9));
        assert_eq!(parse_hour_token("9am"), Some(9));
        assert_eq!(parse_hour_token("12 AM"), Some(0));
        assert_eq!(parse_hour_token("12 PM"), Some(12));
        assert_eq!(parse_hour_token("1 pm"), Some(13));
        assert_eq!(parse_hour_token("13 PM"), None);
        assert_eq!(parse_hour_token("0 AM"), None);
    }

    #[test]
    fn parses_clock_format() {
        assert_eq!(parse_hour_token("09:00"), Some(9));
        assert_eq!(parse_hour_token("21:30"), Some(21));
        assert_eq!(parse_hour_token("9:30 pm"), Some(21));
        assert_eq!(parse_hour_token("9:75"), None);
    }

    #[test]
    fn window_separators() {
        assert_eq!(
            HourWindow::parse(Some("9 AM - 11 AM")).unwrap(),
            HourWindow::Range { start: 9, end: 11 }
        );
        assert_eq!(
            HourWindow::parse(Some("9 to 17")).unwrap(),
            HourWindow::Range { start: 9, end: 17 }
        );
        assert_eq!(
            HourWindow::parse(Some("2 PM TO 5 PM")).unwrap(),
            HourWindow::Range { start: 14, end: 17 }
        );
    }

    #[test]
    fn flexible_markers_expand_to_full_day() {
        assert_eq!(HourWindow::parse(None).unwrap(), HourWindow::FullDay);
        assert_eq!(
            HourWindow::parse(Some("Flexible")).unwrap(),
            HourWindow::FullDay
        );
        assert_eq!(
            HourWindow::parse(Some("anytime")).unwrap(),
            HourWindow::FullDay
        );
    }

    #[test]
    fn garbage_window_is_rejected() {
        assert!(HourWindow::parse(Some("whenever works")).is_err());
        assert!(HourWindow::parse(Some("late - later")).is_err());
    }

    #[test]
    fn multibyte_tokens_are_rejected_not_panicked() {
        // Tokens whose lowercase form has a different byte length must fail
        // as plain validation errors.
        assert!(matches!(
            HourWindow::parse(Some("ẞ to 5")),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            HourWindow::parse(Some("İstanbul to 5")),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            HourWindow::parse(Some("ẞ - 5")),
            Err(AppError::Validation(_))
        ));
        // The separator itself still matches in any ASCII case.
        assert_eq!(
            HourWindow::parse(Some("9 TO 17")).unwrap(),
            HourWindow::Range { start: 9, end: 17 }
        );
    }

    #[test]
    fn non_spanning_count_and_alignment() {
        // 2 days x (17 - 9) hours
        let slots = generate_slots(&range("2024-06-03", "2024-06-04"), Some("9 - 17")).unwrap();
        assert_eq!(slots.len(), 16);
        for pair in slots.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for slot in &slots {
            assert_eq!(slot.minute(), 0);
            assert_eq!(slot.second(), 0);
        }
    }

    #[test]
    fn morning_window_scenario() {
        let slots =
            generate_slots(&range("2024-06-03", "2024-06-04"), Some("9 AM - 11 AM")).unwrap();
        let expected: Vec<NaiveDateTime> = [
            "2024-06-03T09:00:00",
            "2024-06-03T10:00:00",
            "2024-06-04T09:00:00",
            "2024-06-04T10:00:00",
        ]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
        assert_eq!(slots, expected);
    }

    #[test]
    fn midnight_spanning_window() {
        let slots = generate_slots(&range("2024-06-01", "2024-06-02"), Some("22:00 - 2:00")).unwrap();
        let expected: Vec<NaiveDateTime> = [
            "2024-06-01T22:00:00",
            "2024-06-01T23:00:00",
            "2024-06-02T00:00:00",
            "2024-06-02T01:00:00",
            "2024-06-02T22:00:00",
            "2024-06-02T23:00:00",
        ]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
        // The 00:00/01:00 tail of June 2nd's evening falls outside the range
        // and must not appear.
        assert_eq!(slots, expected);
    }

    #[test]
    fn reversed_range_is_swapped() {
        let forward = generate_slots(&range("2024-06-03", "2024-06-05"), Some("9 - 10")).unwrap();
        let reversed = generate_slots(&range("2024-06-05", "2024-06-03"), Some("9 - 10")).unwrap();
        assert_eq!(forward, reversed);
        assert_eq!(forward.len(), 3);
    }

    #[test]
    fn full_day_expansion() {
        let slots = generate_slots(&range("2024-06-03", "2024-06-03"), None).unwrap();
        assert_eq!(slots.len(), 24);
        assert_eq!(slots[0].time(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(slots[23].time(), NaiveTime::from_hms_opt(23, 0, 0).unwrap());
    }

    #[test]
    fn grouping_axes() {
        let slots =
            generate_slots(&range("2024-06-03", "2024-06-04"), Some("9 AM - 11 AM")).unwrap();
        let by_date = group_by_date(&slots);
        assert_eq!(by_date.len(), 2);
        assert_eq!(by_date[&date("2024-06-03")].len(), 2);

        let times = unique_times_of_day(&slots);
        assert_eq!(
            times,
            vec![
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            ]
        );

        // Idempotent: regrouping the flattened groups changes nothing.
        let flat: Vec<NaiveDateTime> = by_date.values().flatten().copied().collect();
        assert_eq!(group_by_date(&flat), by_date);
    }

    #[test]
    fn equal_bounds_are_treated_as_spanning() {
        let window = HourWindow::parse(Some("9 - 9")).unwrap();
        assert!(window.spans_midnight());
    }
}
