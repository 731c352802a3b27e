#![cfg(all(feature = "cli", feature = "sqlite"))]

mod common;

use common::*;
use serde_json::json;
use serde_json::Value;
use std::sync::Arc;
use trip_count_cache::app::handle_request_line;
use trip_count_cache::app::TripCountsApp;
use trip_count_cache::db::driver::sqlite::Sqlite;
use trip_count_cache::db::prelude::*;
use trip_count_cache::prelude::*;
use trip_count_cache::service::TripCountService;

fn app(db_path: &str, action: &[&str]) -> Result<Arc<TripCountsApp>, Box<dyn std::error::Error>> {
    let mut args = vec!["trip-counts", "--backend", "sqlite", "--sqlite-path", db_path];
    args.extend_from_slice(action);
    Ok(TripCountsApp::from_args(args)?)
}

#[tokio::test]
async fn migrate_seed_and_query() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("cli.sqlite");
    let db_path = db_path.to_str().expect("temp path is UTF-8");

    app(db_path, &["migrate"])?.execute().await?;
    app(
        db_path,
        &["seed", "--cabs=5", "--days=3", "--start-date=2014-01-01", "--max-trips=4", "--rng-seed=42"],
    )?
    .execute()
    .await?;

    app(db_path, &["trip-counts", "--cab-ids=X,Y", "--pickup-date=2014-01-02"])?
        .execute()
        .await?;
    app(db_path, &["all-trips", "--ignore-cache"])?.execute().await?;

    // Seeded data is readable through the store directly.
    let db = Sqlite::connect(&dir.path().join("cli.sqlite"), 1).await?;
    let all: TripCountIndex = SqlFactStore::new(db.connection())
        .aggregate_all()
        .await?
        .into_iter()
        .collect();
    assert!(all.cab_count() <= 5);
    for entry in all.entries() {
        assert!(entry.day >= day(2014, 1, 1) && entry.day <= day(2014, 1, 3), "{entry}");
        assert!(entry.count <= 4, "{entry}");
    }

    Ok(())
}

#[tokio::test]
async fn bad_date_fails_the_command() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("bad.sqlite");
    let db_path = db_path.to_str().expect("temp path is UTF-8");

    app(db_path, &["migrate"])?.execute().await?;
    let result = app(db_path, &["trip-counts", "--cab-ids=X", "--pickup-date=2014/01/02"])?
        .execute()
        .await;
    assert!(result.is_err());

    assert!(app(db_path, &["seed", "--start-date=yesterday"])?.execute().await.is_err());

    Ok(())
}

#[test]
fn unknown_backend_is_a_parse_error() {
    assert!(TripCountsApp::from_args(["trip-counts", "--backend", "oracle", "migrate"]).is_err());
    assert!(TripCountsApp::from_args(["trip-counts"]).is_err(), "an action is required");
}

#[tokio::test]
async fn request_lines() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(CountingStore::new(sample_trips()));
    let service = TripCountService::new(TripCountCache::builder().fact_store(store).build()?);

    let reply: Value = serde_json::from_str(
        &handle_request_line(
            &service,
            r#"{"id": 7, "method": "get_trip_counts_for_cab_ids", "params": {"cab_ids": ["C"], "pickup_date": "2013-12-01"}}"#,
        )
        .await?,
    )?;
    assert_eq!(
        reply,
        json!({"id": 7, "result": {"cab_trips_per_day": {"C": {"2013-12-01": 3}}}})
    );

    let reply: Value = serde_json::from_str(
        &handle_request_line(&service, r#"{"id": "x", "method": "clear_cache", "params": {}}"#).await?,
    )?;
    assert_eq!(reply, json!({"id": "x", "result": {"cache_cleared": true}}));

    let reply: Value =
        serde_json::from_str(&handle_request_line(&service, r#"{"id": 8, "method": "drop_tables"}"#).await?)?;
    assert_eq!(reply["id"], json!(8));
    assert!(reply["error"].as_str().unwrap().starts_with("malformed request"));

    let reply: Value = serde_json::from_str(&handle_request_line(&service, "not json").await?)?;
    assert_eq!(reply["id"], Value::Null);
    assert!(reply.get("error").is_some());

    Ok(())
}
