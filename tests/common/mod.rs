#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use trip_count_cache::memory::MemoryFactStore;
use trip_count_cache::memory::TripRecord;
use trip_count_cache::prelude::*;

#[derive(Debug, thiserror::Error)]
#[error("fact store is down")]
pub struct StoreDown;

/// Memory store that records how it is being queried and can be switched into failure mode.
#[derive(Debug, Default)]
pub struct CountingStore {
    pub store:         MemoryFactStore,
    pub by_keys_calls: AtomicUsize,
    pub all_calls:     AtomicUsize,
    pub requested:     Mutex<Vec<(Vec<String>, Day)>>,
    pub failing:       AtomicBool,
    /// Extra rows returned by every by-keys query, whether asked for or not.
    pub extra_rows:    Mutex<Vec<TripCountEntry>>,
    pub delay:         Option<Duration>,
}

impl CountingStore {
    pub fn new(trips: Vec<TripRecord>) -> Self {
        Self {
            store: trips.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn by_keys_calls(&self) -> usize {
        self.by_keys_calls.load(Ordering::SeqCst)
    }

    pub fn all_calls(&self) -> usize {
        self.all_calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn last_request(&self) -> Option<(Vec<String>, Day)> {
        self.requested.lock().last().cloned()
    }
}

#[async_trait]
impl FactStore for CountingStore {
    type Error = StoreDown;

    async fn aggregate_by_keys(&self, cab_ids: &[String], day: Day) -> Result<Vec<TripCountEntry>, Self::Error> {
        self.by_keys_calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push((cab_ids.to_vec(), day));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreDown);
        }
        let mut rows = self.store.aggregate_by_keys(cab_ids, day).await.unwrap();
        rows.extend(self.extra_rows.lock().iter().cloned());
        Ok(rows)
    }

    async fn aggregate_all(&self) -> Result<Vec<TripCountEntry>, Self::Error> {
        self.all_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreDown);
        }
        Ok(self.store.aggregate_all().await.unwrap())
    }
}

pub fn day(y: i32, m: u32, d: u32) -> Day {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(day: Day, h: u32, m: u32) -> NaiveDateTime {
    day.and_hms_opt(h, m, 0).unwrap()
}

/// `count` trips of `cab_id` on `day`, spread over the day.
pub fn trips(cab_id: &str, day: Day, count: u32) -> Vec<TripRecord> {
    (0..count)
        .map(|n| TripRecord::new(cab_id, at(day, n % 24, (n * 7) % 60)))
        .collect()
}

/// Cab A makes 5 trips and cab C makes 3 on 2013-12-01; cab A makes 2 trips on 2013-12-02. Cab B never drives.
pub fn sample_trips() -> Vec<TripRecord> {
    let mut all = trips("A", day(2013, 12, 1), 5);
    all.extend(trips("C", day(2013, 12, 1), 3));
    all.extend(trips("A", day(2013, 12, 2), 2));
    all
}
