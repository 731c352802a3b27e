#![cfg(feature = "sqlite")]

mod common;

use common::*;
use sea_orm::EntityTrait;
use sea_orm::PaginatorTrait;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use trip_count_cache::db::driver::sqlite::Sqlite;
use trip_count_cache::db::entity::cab_trip;
use trip_count_cache::db::prelude::*;
use trip_count_cache::prelude::*;

async fn seeded_db(dir: &tempfile::TempDir) -> Result<Sqlite, Box<dyn std::error::Error>> {
    let db = Sqlite::connect(&dir.path().join("trips.sqlite"), 2).await?;
    db.configure().await?;
    Migrator::up(&db.connection(), None).await?;

    let mut records = sample_trips();
    // Trips around midnight must land on their own day.
    records.push(trip_count_cache::memory::TripRecord::new("C", at(day(2013, 11, 30), 23, 59)));
    records.push(trip_count_cache::memory::TripRecord::new("C", at(day(2013, 12, 2), 0, 0)));

    let inserted = cab_trip::insert_trips(
        &db.connection(),
        records.iter().map(cab_trip::ActiveModel::from).collect(),
    )
    .await?;
    assert_eq!(inserted, records.len());
    assert_eq!(CabTrips::find().count(&db.connection()).await?, records.len() as u64);

    let first: Option<CabTrip> = CabTrips::find_by_id(1).one(&db.connection()).await?;
    assert_eq!(first.map(|trip| trip.medallion), Some(records[0].cab_id.clone()));

    Ok(db)
}

#[tokio::test]
async fn aggregate_by_keys_counts_requested_day() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db = seeded_db(&dir).await?;
    let store = SqlFactStore::new(db.connection());
    let d1 = day(2013, 12, 1);

    let mut rows = store
        .aggregate_by_keys(&["A".to_string(), "B".to_string(), "C".to_string()], d1)
        .await?;
    rows.sort_by(|a, b| a.cab_id.cmp(&b.cab_id));

    assert_eq!(
        rows,
        vec![TripCountEntry::new("A", d1, 5), TripCountEntry::new("C", d1, 3)],
        "cabs without trips are not reported"
    );

    assert!(store.aggregate_by_keys(&[], d1).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn aggregate_by_keys_handles_long_key_lists() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db = seeded_db(&dir).await?;
    let store = SqlFactStore::new(db.connection());
    let d1 = day(2013, 12, 1);

    // Known cabs end up in different batches.
    let mut cab_ids: Vec<String> = (0..1_200).map(|n| format!("GHOST{n:04}")).collect();
    cab_ids.insert(0, "A".to_string());
    cab_ids.push("C".to_string());

    let mut rows = store.aggregate_by_keys(&cab_ids, d1).await?;
    rows.sort_by(|a, b| a.cab_id.cmp(&b.cab_id));

    assert_eq!(rows, vec![TripCountEntry::new("A", d1, 5), TripCountEntry::new("C", d1, 3)]);

    Ok(())
}

#[tokio::test]
async fn aggregate_all_groups_by_cab_and_day() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db = seeded_db(&dir).await?;
    let store = SqlFactStore::new(db.connection());

    let index: TripCountIndex = store.aggregate_all().await?.into_iter().collect();

    assert_eq!(index.count("A", &day(2013, 12, 1)), Some(5));
    assert_eq!(index.count("A", &day(2013, 12, 2)), Some(2));
    assert_eq!(index.count("C", &day(2013, 12, 1)), Some(3));
    assert_eq!(index.count("C", &day(2013, 11, 30)), Some(1));
    assert_eq!(index.count("C", &day(2013, 12, 2)), Some(1));
    assert_eq!(index.entry_count(), 5);

    Ok(())
}

#[tokio::test]
async fn cache_over_sql_store() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db = seeded_db(&dir).await?;
    let d1 = day(2013, 12, 1);

    let cache = TripCountCache::builder()
        .fact_store(Arc::new(SqlFactStore::new(db.connection())))
        .name("sqlite")
        .build()?;

    let counts = cache.lookup_by_keys(["A", "B", "C"], d1, false).await?;
    assert_eq!(counts.count("A", &d1), Some(5));
    assert_eq!(counts.count("B", &d1), Some(0));
    assert_eq!(counts.count("C", &d1), Some(3));

    let all = cache.lookup_all(true).await?;
    assert_eq!(all.count("B", &d1), Some(0));
    assert_eq!(all.entry_count(), 6);

    Ok(())
}
