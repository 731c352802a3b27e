use async_trait::async_trait;
use chrono::NaiveTime;
use fieldx::fxstruct;
use sea_orm::ConnectionTrait;
use sea_orm::DatabaseBackend;
use sea_orm::DatabaseConnection;
use sea_orm::DbErr;
use sea_orm::FromQueryResult;
use sea_orm::Statement;
use sea_orm::Value;
use tokio_stream::StreamExt;
use tracing::instrument;

use crate::prelude::*;

// Upper bound of cab IDs bound into a single `IN (...)` list. Larger requests are split into several queries.
const KEYS_PER_QUERY: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("aggregate query failed: {0}")]
    Query(#[from] DbErr),
    #[error("malformed aggregate row for cab '{cab_id}': {reason}")]
    MalformedRow { cab_id: String, reason: String },
}

// Shape of a row produced by both aggregate queries.
#[derive(Debug, FromQueryResult)]
struct TripCountRow {
    cab_id:      String,
    pickup_date: String,
    trip_count:  i64,
}

impl TryFrom<TripCountRow> for TripCountEntry {
    type Error = StoreError;

    fn try_from(row: TripCountRow) -> Result<Self, Self::Error> {
        let day = Day::parse_from_str(&row.pickup_date, DAY_FORMAT).map_err(|err| StoreError::MalformedRow {
            cab_id: row.cab_id.clone(),
            reason: format!("bad pickup date '{}': {err}", row.pickup_date),
        })?;
        let count = u32::try_from(row.trip_count).map_err(|_| StoreError::MalformedRow {
            cab_id: row.cab_id.clone(),
            reason: format!("trip count {} is out of range", row.trip_count),
        })?;
        Ok(TripCountEntry::new(row.cab_id, day, count))
    }
}

/// [`FactStore`] over the `cab_trip_data` table.
///
/// Works with any backend SeaORM is built with. The pickup day is rendered as `YYYY-MM-DD` text by the database
/// itself, so the result decodes the same way regardless of how the backend represents dates.
#[derive(Debug, Clone)]
#[fxstruct(sync, no_new)]
pub struct SqlFactStore {
    #[fieldx(get(clone))]
    connection: DatabaseConnection,
}

impl SqlFactStore {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    fn backend(&self) -> DatabaseBackend {
        self.connection.get_database_backend()
    }

    fn day_expr(&self) -> &'static str {
        match self.backend() {
            DatabaseBackend::Sqlite => "DATE(pickup_datetime)",
            DatabaseBackend::MySql => "CAST(DATE(pickup_datetime) AS CHAR)",
            DatabaseBackend::Postgres => "TO_CHAR(pickup_datetime, 'YYYY-MM-DD')",
            #[allow(unreachable_patterns)]
            _ => "DATE(pickup_datetime)",
        }
    }

    // Bind parameter placeholder number `n`, 1-based.
    fn placeholder(&self, n: usize) -> String {
        match self.backend() {
            DatabaseBackend::Postgres => format!("${n}"),
            _ => "?".to_string(),
        }
    }

    fn by_keys_statement(&self, cab_ids: &[String], day: Day) -> Statement {
        let day_expr = self.day_expr();
        let in_list = (1..=cab_ids.len())
            .map(|n| self.placeholder(n))
            .collect::<Vec<_>>()
            .join(", ");
        let from = self.placeholder(cab_ids.len() + 1);
        let to = self.placeholder(cab_ids.len() + 2);

        // Filtering on the raw column rather than on the day expression lets the database use the
        // (medallion, pickup_datetime) index.
        let sql = format!(
            "SELECT medallion AS cab_id, {day_expr} AS pickup_date, COUNT(*) AS trip_count \
             FROM cab_trip_data \
             WHERE medallion IN ({in_list}) AND pickup_datetime >= {from} AND pickup_datetime < {to} \
             GROUP BY medallion, {day_expr}"
        );

        let start = day.and_time(NaiveTime::MIN);
        let end = start + chrono::Duration::days(1);

        let mut values: Vec<Value> = cab_ids.iter().map(|id| Value::from(id.clone())).collect();
        values.push(Value::from(start));
        values.push(Value::from(end));

        Statement::from_sql_and_values(self.backend(), sql, values)
    }

    fn all_statement(&self) -> Statement {
        let day_expr = self.day_expr();
        Statement::from_string(
            self.backend(),
            format!(
                "SELECT medallion AS cab_id, {day_expr} AS pickup_date, COUNT(*) AS trip_count \
                 FROM cab_trip_data \
                 GROUP BY medallion, {day_expr}"
            ),
        )
    }
}

#[async_trait]
impl FactStore for SqlFactStore {
    type Error = StoreError;

    #[instrument(level = "trace", skip(self))]
    async fn aggregate_by_keys(&self, cab_ids: &[String], day: Day) -> Result<Vec<TripCountEntry>, Self::Error> {
        if cab_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for chunk in cab_ids.chunks(KEYS_PER_QUERY) {
            let statement = self.by_keys_statement(chunk, day);
            log::debug!("running query: [{}]", statement.sql);

            for row in TripCountRow::find_by_statement(statement).all(&self.connection).await? {
                entries.push(TripCountEntry::try_from(row)?);
            }
        }

        Ok(entries)
    }

    #[instrument(level = "trace", skip(self))]
    async fn aggregate_all(&self) -> Result<Vec<TripCountEntry>, Self::Error> {
        let statement = self.all_statement();
        log::debug!("running query: [{}]", statement.sql);

        let mut rows = TripCountRow::find_by_statement(statement)
            .stream(&self.connection)
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await {
            entries.push(TripCountEntry::try_from(row?)?);
        }

        Ok(entries)
    }
}
