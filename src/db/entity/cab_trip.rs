use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::NotSet;
use sea_orm::ActiveValue::Set;
use sea_orm::TransactionTrait;
use serde::Deserialize;
use serde::Serialize;
use tracing::instrument;

use crate::memory::TripRecord;

// Keeps a single multi-row INSERT well below the bind parameter limits of all supported backends.
const INSERT_CHUNK: usize = 1_000;

/// A single recorded trip. Only the columns the aggregation cares about, plus a few for context.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cab_trip_data")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id:               i32,
    /// The cab ID.
    pub medallion:        String,
    /// Driver's license.
    pub hack_license:     Option<String>,
    pub pickup_datetime:  DateTime,
    pub dropoff_datetime: Option<DateTime>,
    pub passenger_count:  Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&TripRecord> for ActiveModel {
    fn from(trip: &TripRecord) -> Self {
        ActiveModel {
            id:               NotSet,
            medallion:        Set(trip.cab_id.clone()),
            hack_license:     Set(None),
            pickup_datetime:  Set(trip.pickup_datetime),
            dropoff_datetime: Set(None),
            passenger_count:  Set(None),
        }
    }
}

/// Bulk insert trips within a single transaction. Returns the number of rows inserted.
#[instrument(level = "trace", skip(db, trips), fields(count = trips.len()))]
pub async fn insert_trips(db: &DatabaseConnection, trips: Vec<ActiveModel>) -> Result<usize, DbErr> {
    if trips.is_empty() {
        return Ok(0);
    }

    let transaction = db.begin().await?;

    for chunk in trips.chunks(INSERT_CHUNK) {
        Entity::insert_many(chunk.to_vec())
            .exec_without_returning(&transaction)
            .await?;
    }

    transaction.commit().await?;

    Ok(trips.len())
}
