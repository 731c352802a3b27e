//! # trip-count-cache
//!
//! In-process cache for "how many trips did cab X make on day Y" aggregates over a large trip fact table.
//!
//! Counting trips per cab and day means grouping over millions of rows. The result for a past day doesn't change,
//! so once computed it is kept in memory and served from there until the cache is explicitly cleared.
//!
//! # The Basics
//!
//! The crate is built around three parts:
//!
//! - [`FactStore`]: the system of record. It knows how to answer two aggregate queries: trip counts of some cabs on a
//!   particular day, and trip counts of all cabs on all days. [`db::fact_store::SqlFactStore`] implements it over a
//!   SeaORM connection, [`memory::MemoryFactStore`] over a list of trip records.
//! - [`TripCountCache`]: decides for every requested cab whether its count is already known. Known counts are
//!   served from memory, the rest are fetched from the store in a single query and remembered. A cab the store has
//!   no trips for on that day is remembered as having zero trips.
//! - [`TripCountService`](service::TripCountService): validates transport-level requests and translates cache
//!   results and failures into responses.
//!
//! ```ignore
//! let cache = TripCountCache::builder()
//!     .fact_store(Arc::new(SqlFactStore::new(connection)))
//!     .build()?;
//! let service = TripCountService::new(cache);
//!
//! let response = service
//!     .get_trip_counts_for_cab_ids(TripCountsRequest {
//!         cab_ids:      vec!["D7D598CD99978BD012A87A76A7C891B7".into()],
//!         pickup_date:  "2013-12-01".into(),
//!         ignore_cache: false,
//!     })
//!     .await;
//! ```
//!
//! There is no expiration: a cached count stays until [`TripCountCache::clear`] is called, or until it gets
//! re-fetched by a lookup with `force_refresh` set.
//!
//! # Features
//!
//! - `sqlite`, `mysql`, `pg`: the [`db`] module with the corresponding database driver.
//! - `cli`: the `trip-counts` command line application, see [`app`].

#[cfg(feature = "cli")]
pub mod app;
pub mod cache;
#[cfg(feature = "db")]
pub mod db;
pub mod memory;
pub mod service;
pub mod traits;
pub mod types;

#[doc(inline)]
pub use cache::TripCountCache;
#[doc(inline)]
pub use traits::FactStore;

pub mod prelude {
    pub use crate::cache::TripCountCache;
    pub use crate::traits::FactStore;
    pub use crate::types::*;
}
