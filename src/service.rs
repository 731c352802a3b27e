//! Request/response front of the cache.
//!
//! The types here mirror what a transport layer would carry: requests are plain data with string-typed dates, and
//! failures travel in the response's `error` field rather than as a Rust error.
use garde::Validate;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("fact store failure: {0}")]
    Store(String),
}

/// Trip counts of the listed cabs on a single day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TripCountsRequest {
    #[garde(length(min = 1), inner(length(min = 1)))]
    pub cab_ids:     Vec<String>,
    /// Day in `YYYY-MM-DD` format.
    #[garde(custom(day_format))]
    pub pickup_date: String,
    #[serde(default)]
    #[garde(skip)]
    pub ignore_cache: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllCabTripsRequest {
    #[serde(default)]
    pub ignore_cache: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCacheRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripCountsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cab_trips_per_day: Option<TripCountIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error:             Option<ServiceError>,
}

impl TripCountsResponse {
    fn from_result<E: std::error::Error>(result: Result<TripCountIndex, E>) -> Self {
        match result {
            Ok(index) => Self {
                cab_trips_per_day: Some(index),
                error:             None,
            },
            Err(err) => Self::failed(ServiceError::Store(err.to_string())),
        }
    }

    fn failed(error: ServiceError) -> Self {
        Self {
            cab_trips_per_day: None,
            error:             Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCacheResponse {
    pub cache_cleared: bool,
}

/// A request addressed to one of the service methods, as it comes off the wire:
/// `{"method": "get_all_cab_trips", "params": {"ignore_cache": true}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum ServiceRequest {
    GetTripCountsForCabIds(TripCountsRequest),
    GetAllCabTrips(AllCabTripsRequest),
    ClearCache(ClearCacheRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceResponse {
    ClearCache(ClearCacheResponse),
    TripCounts(TripCountsResponse),
}

/// Validates requests and hands them over to a shared [`TripCountCache`].
#[derive(Debug)]
pub struct TripCountService<FS: FactStore> {
    cache: Arc<TripCountCache<FS>>,
}

impl<FS: FactStore> Clone for TripCountService<FS> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<FS: FactStore> TripCountService<FS> {
    pub fn new(cache: Arc<TripCountCache<FS>>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<TripCountCache<FS>> {
        &self.cache
    }

    pub async fn get_trip_counts_for_cab_ids(&self, request: TripCountsRequest) -> TripCountsResponse {
        log::info!("get_trip_counts_for_cab_ids: request={request:?}");

        if let Err(report) = request.validate() {
            log::info!("get_trip_counts_for_cab_ids: rejected: {report}");
            return TripCountsResponse::failed(ServiceError::InvalidArgument(report.to_string()));
        }

        let pickup_date = match parse_day(&request.pickup_date) {
            Ok(day) => day,
            Err(msg) => return TripCountsResponse::failed(ServiceError::InvalidArgument(msg)),
        };

        TripCountsResponse::from_result(
            self.cache
                .lookup_by_keys(request.cab_ids, pickup_date, request.ignore_cache)
                .await,
        )
    }

    pub async fn get_all_cab_trips(&self, request: AllCabTripsRequest) -> TripCountsResponse {
        log::info!("get_all_cab_trips: request={request:?}");
        TripCountsResponse::from_result(self.cache.lookup_all(request.ignore_cache).await)
    }

    pub async fn clear_cache(&self, _request: ClearCacheRequest) -> ClearCacheResponse {
        ClearCacheResponse {
            cache_cleared: self.cache.clear().await,
        }
    }

    pub async fn dispatch(&self, request: ServiceRequest) -> ServiceResponse {
        match request {
            ServiceRequest::GetTripCountsForCabIds(req) => {
                ServiceResponse::TripCounts(self.get_trip_counts_for_cab_ids(req).await)
            }
            ServiceRequest::GetAllCabTrips(req) => ServiceResponse::TripCounts(self.get_all_cab_trips(req).await),
            ServiceRequest::ClearCache(req) => ServiceResponse::ClearCache(self.clear_cache(req).await),
        }
    }
}

/// Parse a `YYYY-MM-DD` day.
pub fn parse_day(value: &str) -> Result<Day, String> {
    Day::parse_from_str(value, DAY_FORMAT)
        .map_err(|err| format!("wrong date format for [{value}], expecting 'YYYY-MM-DD': {err}"))
}

/// `garde` rule for `YYYY-MM-DD` day fields.
#[allow(clippy::ptr_arg)]
pub fn day_format(value: &String, _: &()) -> garde::Result {
    parse_day(value).map(|_| ()).map_err(|msg| garde::Error::new(msg))
}
