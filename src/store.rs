//! Period log store interface
//!
//! The engine only ever talks to persistence through [`PeriodLogStore`]. The
//! statistics cache write lives behind the same narrow trait so tests can make
//! it fail without touching the calculation.

use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::dates::format_date;
use crate::error::StoreError;
use crate::models::{CachedStats, CycleEvent, CycleStatsSummary};

/// Read/write access to logged periods and the derived statistics cache
pub trait PeriodLogStore: Send + Sync {
    /// All events for a user, newest start first
    fn list_events(&self, user_id: &str) -> Result<Vec<CycleEvent>, StoreError>;

    /// Insert a new event; fails with `Duplicate` if the start date is taken
    fn insert_event(&self, event: &CycleEvent) -> Result<(), StoreError>;

    /// Attach an end date; returns `false` when no such start exists
    fn set_end_date(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, StoreError>;

    /// Replace the cached statistics for a user (last writer wins)
    fn upsert_stats_cache(
        &self,
        user_id: &str,
        summary: &CycleStatsSummary,
    ) -> Result<(), StoreError>;

    /// Last cached statistics, if any
    fn load_stats_cache(&self, user_id: &str) -> Result<Option<CachedStats>, StoreError>;
}

#[derive(Default)]
struct MemoryTables {
    // user -> start_date text -> event
    events: HashMap<String, BTreeMap<String, CycleEvent>>,
    stats: HashMap<String, CachedStats>,
}

/// In-process store used by tests and embedders without a database
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
    fail_cache_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw records without validation, including malformed dates.
    /// A record with an already-present start date replaces the earlier one.
    pub fn with_events(events: Vec<CycleEvent>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.lock();
            for event in events {
                tables
                    .events
                    .entry(event.user_id.clone())
                    .or_default()
                    .insert(event.start_date.clone(), event);
            }
        }
        store
    }

    /// Make every cache upsert fail with `Unavailable`
    pub fn set_fail_cache_writes(&self, fail: bool) {
        self.fail_cache_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every event listing fail with `Unavailable`
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTables> {
        // A panic while holding the lock cannot leave the maps half-written
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PeriodLogStore for MemoryStore {
    fn list_events(&self, user_id: &str) -> Result<Vec<CycleEvent>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "reads disabled".to_string(),
            });
        }

        let tables = self.lock();
        Ok(tables
            .events
            .get(user_id)
            .map(|events| events.values().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn insert_event(&self, event: &CycleEvent) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let user_events = tables.events.entry(event.user_id.clone()).or_default();

        if user_events.contains_key(&event.start_date) {
            return Err(StoreError::Duplicate {
                user_id: event.user_id.clone(),
                start_date: event.start_date.clone(),
            });
        }

        user_events.insert(event.start_date.clone(), event.clone());
        Ok(())
    }

    fn set_end_date(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let event = tables
            .events
            .get_mut(user_id)
            .and_then(|events| events.get_mut(&format_date(start)));

        match event {
            Some(event) => {
                event.end_date = Some(format_date(end));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn upsert_stats_cache(
        &self,
        user_id: &str,
        summary: &CycleStatsSummary,
    ) -> Result<(), StoreError> {
        if self.fail_cache_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "cache writes disabled".to_string(),
            });
        }

        self.lock().stats.insert(
            user_id.to_string(),
            CachedStats {
                user_id: user_id.to_string(),
                summary: summary.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn load_stats_cache(&self, user_id: &str) -> Result<Option<CachedStats>, StoreError> {
        Ok(self.lock().stats.get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_insert_and_list_newest_first() {
        let store = MemoryStore::new();
        store.insert_event(&CycleEvent::new("alice", date(2024, 1, 1))).unwrap();
        store.insert_event(&CycleEvent::new("alice", date(2024, 1, 29))).unwrap();
        store.insert_event(&CycleEvent::new("bob", date(2024, 1, 15))).unwrap();

        let events = store.list_events("alice").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start_date, "2024-01-29");
        assert!(store.list_events("carol").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let store = MemoryStore::new();
        let event = CycleEvent::new("alice", date(2024, 1, 1));
        store.insert_event(&event).unwrap();

        let err = store.insert_event(&event).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[test]
    fn test_set_end_date() {
        let store = MemoryStore::new();
        store.insert_event(&CycleEvent::new("alice", date(2024, 1, 1))).unwrap();

        assert!(store.set_end_date("alice", date(2024, 1, 1), date(2024, 1, 5)).unwrap());
        assert!(!store.set_end_date("alice", date(2024, 2, 1), date(2024, 2, 5)).unwrap());

        let events = store.list_events("alice").unwrap();
        assert_eq!(events[0].end_date.as_deref(), Some("2024-01-05"));
    }

    #[test]
    fn test_cache_write_switch() {
        let store = MemoryStore::new();
        let summary = CycleStatsSummary::default();

        store.upsert_stats_cache("alice", &summary).unwrap();
        assert!(store.load_stats_cache("alice").unwrap().is_some());

        store.set_fail_cache_writes(true);
        assert!(store.upsert_stats_cache("bob", &summary).is_err());
        assert!(store.load_stats_cache("bob").unwrap().is_none());
    }
}
