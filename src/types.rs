use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Calendar day a trip count belongs to. Time of day is never part of a key.
pub type Day = NaiveDate;

/// Wire and display format of a [`Day`].
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// A single aggregate fact: cab `cab_id` made `count` trips on `day`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripCountEntry {
    pub cab_id: String,
    pub day:    Day,
    pub count:  u32,
}

impl TripCountEntry {
    pub fn new<S: Into<String>>(cab_id: S, day: Day, count: u32) -> Self {
        Self {
            cab_id: cab_id.into(),
            day,
            count,
        }
    }
}

impl Display for TripCountEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[cab_id='{}', day='{}', count={}]", self.cab_id, self.day.format(DAY_FORMAT), self.count)
    }
}

/// Trip counts per day of a single cab.
pub type TripsPerDay = BTreeMap<Day, u32>;

/// Cab ID to day to trip count mapping.
///
/// This is both the state of [`TripCountCache`](crate::TripCountCache) and the payload of every response it
/// produces. Serializes as `{"<cab_id>": {"YYYY-MM-DD": <count>}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripCountIndex(BTreeMap<String, TripsPerDay>);

impl TripCountIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached count for the cab/day pair, if the pair is known.
    pub fn count(&self, cab_id: &str, day: &Day) -> Option<u32> {
        self.0.get(cab_id).and_then(|days| days.get(day).copied())
    }

    pub fn contains(&self, cab_id: &str, day: &Day) -> bool {
        self.count(cab_id, day).is_some()
    }

    /// Set the count of a cab/day pair, replacing any previous value.
    pub fn insert<S: Into<String>>(&mut self, cab_id: S, day: Day, count: u32) -> Option<u32> {
        self.0.entry(cab_id.into()).or_default().insert(day, count)
    }

    pub fn insert_entry(&mut self, entry: TripCountEntry) -> Option<u32> {
        self.insert(entry.cab_id, entry.day, entry.count)
    }

    /// Copy every pair of `other` into this index. Pairs present in both take the value from `other`.
    pub fn merge(&mut self, other: &TripCountIndex) {
        for (cab_id, days) in other.0.iter() {
            match self.0.entry(cab_id.clone()) {
                btree_map::Entry::Occupied(mut entry) => {
                    entry.get_mut().extend(days.iter().map(|(day, count)| (*day, *count)));
                }
                btree_map::Entry::Vacant(entry) => {
                    entry.insert(days.clone());
                }
            }
        }
    }

    pub fn trips_of(&self, cab_id: &str) -> Option<&TripsPerDay> {
        self.0.get(cab_id)
    }

    /// Number of distinct cabs.
    pub fn cab_count(&self) -> usize {
        self.0.len()
    }

    /// Number of cab/day pairs.
    pub fn entry_count(&self) -> usize {
        self.0.values().map(|days| days.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cab_ids(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Iterate over all pairs as flat entries, ordered by cab ID and then by day.
    pub fn entries(&self) -> impl Iterator<Item = TripCountEntry> + '_ {
        self.0.iter().flat_map(|(cab_id, days)| {
            days.iter()
                .map(move |(day, count)| TripCountEntry::new(cab_id.clone(), *day, *count))
        })
    }
}

impl FromIterator<TripCountEntry> for TripCountIndex {
    fn from_iter<T: IntoIterator<Item = TripCountEntry>>(iter: T) -> Self {
        let mut index = Self::new();
        index.extend(iter);
        index
    }
}

impl Extend<TripCountEntry> for TripCountIndex {
    fn extend<T: IntoIterator<Item = TripCountEntry>>(&mut self, iter: T) {
        for entry in iter {
            self.insert_entry(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> Day {
        NaiveDate::from_ymd_opt(2013, 12, d).unwrap()
    }

    #[test]
    fn merge_overrides_and_extends() {
        let mut index: TripCountIndex = [
            TripCountEntry::new("A", day(1), 5),
            TripCountEntry::new("B", day(1), 0),
        ]
        .into_iter()
        .collect();

        let update: TripCountIndex = [
            TripCountEntry::new("A", day(1), 7),
            TripCountEntry::new("A", day(2), 1),
            TripCountEntry::new("C", day(1), 3),
        ]
        .into_iter()
        .collect();

        index.merge(&update);

        assert_eq!(index.count("A", &day(1)), Some(7));
        assert_eq!(index.count("A", &day(2)), Some(1));
        assert_eq!(index.count("B", &day(1)), Some(0));
        assert_eq!(index.count("C", &day(1)), Some(3));
        assert_eq!(index.cab_count(), 3);
        assert_eq!(index.entry_count(), 4);
        assert_eq!(index.cab_ids().collect::<Vec<_>>(), ["A", "B", "C"]);
        assert_eq!(
            index.entries().map(|e| e.to_string()).collect::<Vec<_>>()[..2],
            ["[cab_id='A', day='2013-12-01', count=7]", "[cab_id='A', day='2013-12-02', count=1]"]
        );
    }

    #[test]
    fn serializes_as_nested_map() {
        let index: TripCountIndex = [TripCountEntry::new("A", day(1), 5)].into_iter().collect();
        assert_eq!(
            serde_json::to_string(&index).unwrap(),
            r#"{"A":{"2013-12-01":5}}"#
        );
    }
}
