//! Short human-typable codes that resolve to events.
//!
//! Codes are always randomly generated with a uniqueness check against the
//! store. Events created before that policy derived their code from the
//! first six characters of their id; `resolve` still honors those as a
//! read-only fallback so old share links keep working.

use std::sync::Arc;

use rand::Rng;

use crate::db::models::Event;
use crate::db::store::EventStore;
use crate::error::{AppError, AppResult};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 5;

/// The code space is ~60M against at most thousands of events, so collisions
/// are vanishingly rare; the cap only guards against a pathological loop.
const MAX_GENERATION_ATTEMPTS: u32 = 1000;

#[derive(Clone)]
pub struct AccessCodeService {
    store: Arc<dyn EventStore>,
}

impl AccessCodeService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    fn random_code() -> String {
        let mut rng = rand::thread_rng();
        (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    /// Draw codes until one is unused.
    pub async fn generate(&self) -> AppResult<String> {
        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let code = Self::random_code();
            if !self.store.access_code_exists(&code).await? {
                return Ok(code);
            }
            tracing::debug!("Access code collision on attempt {attempt}, retrying");
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "Could not generate a unique access code after {MAX_GENERATION_ATTEMPTS} attempts"
        )))
    }

    /// Case-insensitive lookup: exact stored code first, then the legacy
    /// id-prefix derivation.
    pub async fn resolve(&self, code: &str) -> AppResult<Option<Event>> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Ok(None);
        }

        if let Some(event) = self.store.get_event_by_access_code(&code).await? {
            return Ok(Some(event));
        }

        self.store.find_by_legacy_code(&code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::feed::ResponseFeed;
    use crate::db::models::{DateRange, NewEvent};
    use crate::db::store::MemoryEventStore;
    use chrono::NaiveDate;

    fn sample_new_event(name: &str) -> NewEvent {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        };
        let times = crate::scheduling::slots::generate_slots(&range, Some("9 - 10")).unwrap();
        NewEvent {
            name: name.into(),
            description: None,
            date_range: range,
            times,
            allow_anonymous: false,
        }
    }

    fn service() -> (AccessCodeService, Arc<MemoryEventStore>) {
        let store = Arc::new(MemoryEventStore::new(ResponseFeed::default()));
        (AccessCodeService::new(store.clone()), store)
    }

    #[test]
    fn codes_use_the_fixed_alphabet() {
        for _ in 0..100 {
            let code = AccessCodeService::random_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test]
    async fn generated_codes_avoid_existing_ones() {
        let (codes, store) = service();
        let first = codes.generate().await.unwrap();
        store
            .create_event(sample_new_event("a"), first.clone())
            .await
            .unwrap();

        // The new code must never equal a bound one.
        for _ in 0..20 {
            let next = codes.generate().await.unwrap();
            assert_ne!(next, first);
        }
    }

    #[tokio::test]
    async fn resolve_is_case_insensitive() {
        let (codes, store) = service();
        let event = store
            .create_event(sample_new_event("a"), "AB3DE".into())
            .await
            .unwrap();

        let lower = codes.resolve("ab3de").await.unwrap().unwrap();
        let upper = codes.resolve("AB3DE").await.unwrap().unwrap();
        assert_eq!(lower.id, event.id);
        assert_eq!(upper.id, event.id);
    }

    #[tokio::test]
    async fn resolve_falls_back_to_legacy_prefix() {
        let (codes, store) = service();
        // Simulate a pre-switch event whose code was its id prefix.
        let legacy = crate::db::models::Event {
            id: "abc123-legacy-event".into(),
            name: "Legacy".into(),
            description: None,
            date_range: DateRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            },
            times: vec![NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap()],
            allow_anonymous: false,
            access_code: String::new(),
            created_at: chrono::Utc::now().naive_utc(),
        };
        store.insert_event_raw(legacy).await;

        let resolved = codes.resolve("abc123").await.unwrap().unwrap();
        assert_eq!(resolved.name, "Legacy");
        assert!(codes.resolve("zzzzz").await.unwrap().is_none());
    }
}
