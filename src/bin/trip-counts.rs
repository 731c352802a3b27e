use trip_count_cache::app::TripCountsApp;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    TripCountsApp::run().await
}
