//! Fact store over raw trip records kept in memory.
use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::convert::Infallible;

use crate::prelude::*;

/// One raw trip as it would be found in the trips table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripRecord {
    pub cab_id:          String,
    pub pickup_datetime: NaiveDateTime,
}

impl TripRecord {
    pub fn new<S: Into<String>>(cab_id: S, pickup_datetime: NaiveDateTime) -> Self {
        Self {
            cab_id: cab_id.into(),
            pickup_datetime,
        }
    }

    pub fn pickup_day(&self) -> Day {
        self.pickup_datetime.date()
    }
}

/// Answers aggregate queries by grouping the records it holds. Every query scans all records.
#[derive(Debug, Default)]
pub struct MemoryFactStore {
    trips: RwLock<Vec<TripRecord>>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trip(&self, trip: TripRecord) {
        self.trips.write().push(trip);
    }

    pub fn add_trips<I: IntoIterator<Item = TripRecord>>(&self, trips: I) {
        self.trips.write().extend(trips);
    }

    pub fn trip_count(&self) -> usize {
        self.trips.read().len()
    }

    fn group<'a>(trips: impl Iterator<Item = &'a TripRecord>) -> Vec<TripCountEntry> {
        let mut groups = BTreeMap::<(&str, Day), u32>::new();
        for trip in trips {
            *groups.entry((trip.cab_id.as_str(), trip.pickup_day())).or_default() += 1;
        }
        groups
            .into_iter()
            .map(|((cab_id, day), count)| TripCountEntry::new(cab_id, day, count))
            .collect()
    }
}

impl FromIterator<TripRecord> for MemoryFactStore {
    fn from_iter<T: IntoIterator<Item = TripRecord>>(iter: T) -> Self {
        Self {
            trips: RwLock::new(iter.into_iter().collect()),
        }
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    type Error = Infallible;

    async fn aggregate_by_keys(&self, cab_ids: &[String], day: Day) -> Result<Vec<TripCountEntry>, Self::Error> {
        let wanted = cab_ids.iter().map(String::as_str).collect::<HashSet<_>>();
        let trips = self.trips.read();
        Ok(Self::group(
            trips
                .iter()
                .filter(|t| t.pickup_day() == day && wanted.contains(t.cab_id.as_str())),
        ))
    }

    async fn aggregate_all(&self) -> Result<Vec<TripCountEntry>, Self::Error> {
        Ok(Self::group(self.trips.read().iter()))
    }
}
