use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::types::Day;
use crate::types::TripCountEntry;

// For types that are in charge of answering aggregate queries against the system of record.
#[async_trait]
pub trait FactStore: Debug + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Count trips of the given cabs on `day`.
    ///
    /// One entry per cab that has at least one trip on that day. Cabs without trips are not reported at all, it is
    /// up to the caller to interpret their absence.
    async fn aggregate_by_keys(&self, cab_ids: &[String], day: Day) -> Result<Vec<TripCountEntry>, Self::Error>;

    /// Count trips of every cab on every day on record. One entry per distinct cab/day pair.
    async fn aggregate_all(&self) -> Result<Vec<TripCountEntry>, Self::Error>;
}

#[async_trait]
impl<FS> FactStore for Arc<FS>
where
    FS: FactStore,
{
    type Error = FS::Error;

    async fn aggregate_by_keys(&self, cab_ids: &[String], day: Day) -> Result<Vec<TripCountEntry>, Self::Error> {
        (**self).aggregate_by_keys(cab_ids, day).await
    }

    async fn aggregate_all(&self) -> Result<Vec<TripCountEntry>, Self::Error> {
        (**self).aggregate_all().await
    }
}
