//! The `trip-counts` command line application.
//!
//! Connects to the trips database, and either prepares it (`migrate`, `seed`) or answers requests through
//! [`TripCountService`]. The `serve` action keeps a single cache alive for the whole session and reads JSON-lines
//! requests from the standard input:
//!
//! ```text
//! {"id": 1, "method": "get_trip_counts_for_cab_ids", "params": {"cab_ids": ["D7D5..."], "pickup_date": "2013-12-01"}}
//! {"id": 2, "method": "get_all_cab_trips", "params": {"ignore_cache": false}}
//! {"id": 3, "method": "clear_cache", "params": {}}
//! ```
//!
//! Every request is answered with a single line `{"id": 1, "result": {...}}`. Requests are processed concurrently,
//! the replies may come out of order.
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use anyhow::Result;
use chrono::Duration;
use chrono::NaiveTime;
use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use fieldx::fxstruct;
use garde::Validate;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use sea_orm_migration::MigratorTrait;
use serde::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::info;
use tracing::instrument;

#[cfg(feature = "mysql")]
use crate::db::driver::mysql::MySql;
#[cfg(feature = "pg")]
use crate::db::driver::pg::Pg;
#[cfg(feature = "sqlite")]
use crate::db::driver::sqlite::Sqlite;
use crate::db::entity::cab_trip;
use crate::db::prelude::*;
use crate::memory::TripRecord;
use crate::prelude::*;
use crate::service::day_format;
use crate::service::parse_day;
use crate::service::AllCabTripsRequest;
use crate::service::ServiceRequest;
use crate::service::ServiceResponse;
use crate::service::TripCountService;
use crate::service::TripCountsRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Sqlite,
    Mysql,
    Pg,
}

impl Backend {
    fn feature(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Pg => "pg",
        }
    }

    fn is_enabled(&self) -> bool {
        match self {
            Self::Sqlite => cfg!(feature = "sqlite"),
            Self::Mysql => cfg!(feature = "mysql"),
            Self::Pg => cfg!(feature = "pg"),
        }
    }
}

#[cfg(feature = "mysql")]
const MYSQL_PORT: u16 = 3306;
#[cfg(feature = "pg")]
const PG_PORT: u16 = 5432;

#[derive(Debug, Clone, clap::Parser, Validate)]
#[fxstruct(no_new, get(copy))]
#[clap(about, version, author, name = "trip-counts")]
pub struct Cli {
    /// Database backend holding the trips table.
    #[clap(long, env = "TRIPCACHE_BACKEND", value_enum, default_value_t = Backend::Sqlite)]
    #[garde(custom(Self::backend_enabled))]
    backend: Backend,

    /// Path to the SQLite database file. Created if missing.
    #[clap(long, env = "TRIPCACHE_SQLITE_PATH", default_value = "trip_counts.sqlite")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    sqlite_path: PathBuf,

    #[clap(long, env = "TRIPCACHE_DB_HOST", default_value = "localhost")]
    #[fieldx(get(clone))]
    #[garde(length(min = 1))]
    db_host: String,

    /// Database server port. The backend's standard port if omitted.
    #[clap(long, env = "TRIPCACHE_DB_PORT")]
    #[garde(skip)]
    db_port: Option<u16>,

    #[clap(long, env = "TRIPCACHE_DB_USER", default_value = "root")]
    #[fieldx(get(clone))]
    #[garde(length(min = 1))]
    db_user: String,

    #[clap(long, env = "TRIPCACHE_DB_PASSWORD", hide_env_values = true, default_value = "")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    db_password: String,

    /// Database (schema) name.
    #[clap(long, env = "TRIPCACHE_DB_SCHEMA", default_value = "ny_cab_data")]
    #[fieldx(get(clone))]
    #[garde(length(min = 1))]
    db_schema: String,

    #[clap(long, env = "TRIPCACHE_DB_MAX_CONNECTIONS", default_value_t = 10)]
    #[garde(range(min = 1))]
    db_max_connections: u32,

    /// File to send log into. Standard error if omitted.
    #[clap(long, env = "TRIPCACHE_LOG_FILE")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    log_file: Option<PathBuf>,

    /// Name of the cache as it appears in the log.
    #[clap(long, env = "TRIPCACHE_CACHE_NAME", default_value = "trip-counts")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    cache_name: String,

    #[clap(subcommand)]
    #[fieldx(get(clone))]
    #[garde(skip)]
    action: Action,
}

impl Cli {
    fn backend_enabled(value: &Backend, _: &()) -> garde::Result {
        if value.is_enabled() {
            Ok(())
        }
        else {
            Err(garde::Error::new(format!(
                "Build feature '{}' must be enabled to use this backend.",
                value.feature()
            )))
        }
    }
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Action {
    /// Create the trips table and its indexes.
    Migrate,
    /// Fill the trips table with generated trips.
    Seed(SeedArgs),
    /// Print trip counts of the given cabs on a single day.
    TripCounts(TripCountsArgs),
    /// Print trip counts of every cab on every day.
    AllTrips(AllTripsArgs),
    /// Answer JSON-lines requests from the standard input until it is closed.
    Serve,
}

#[derive(Debug, Clone, clap::Args, Validate)]
pub struct SeedArgs {
    /// Number of cabs to generate.
    #[clap(long, default_value_t = 20)]
    #[garde(range(min = 1, max = 100_000))]
    pub cabs:       u32,
    /// Number of consecutive days to generate trips for.
    #[clap(long, default_value_t = 31)]
    #[garde(range(min = 1, max = 3660))]
    pub days:       u32,
    /// The first day, `YYYY-MM-DD`.
    #[clap(long, default_value = "2013-12-01")]
    #[garde(custom(day_format))]
    pub start_date: String,
    /// Upper bound of trips a cab makes per day. The actual number is uniformly distributed in `0..=max-trips`.
    #[clap(long, default_value_t = 30)]
    #[garde(range(max = 10_000))]
    pub max_trips:  u32,
    /// Seed of the random generator, for reproducible data sets.
    #[clap(long)]
    #[garde(skip)]
    pub rng_seed:   Option<u64>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct TripCountsArgs {
    /// Comma-separated list of cab IDs (medallions).
    #[clap(long, value_delimiter = ',', required = true)]
    pub cab_ids:      Vec<String>,
    /// Pickup day, `YYYY-MM-DD`.
    #[clap(long)]
    pub pickup_date:  String,
    /// Ignore cached data and query the database.
    #[clap(long, default_value_t = false)]
    pub ignore_cache: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct AllTripsArgs {
    /// Ignore cached data and query the database.
    #[clap(long, default_value_t = false)]
    pub ignore_cache: bool,
}

// One line of `serve` output.
#[derive(Debug, Serialize)]
struct Reply {
    id:     serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ServiceResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error:  Option<String>,
}

impl Reply {
    fn failed(id: serde_json::Value, error: String) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Decode a JSON request line, run it through the service, and return the JSON reply line (without a trailing
/// newline). Undecodable requests get a reply with an `error` field.
pub async fn handle_request_line<FS: FactStore>(service: &TripCountService<FS>, line: &str) -> Result<String> {
    let reply = match serde_json::from_str::<serde_json::Value>(line) {
        Err(err) => Reply::failed(serde_json::Value::Null, format!("malformed request: {err}")),
        Ok(value) => {
            let id = value.get("id").cloned().unwrap_or(serde_json::Value::Null);
            match serde_json::from_value::<ServiceRequest>(value) {
                Ok(request) => Reply {
                    id,
                    result: Some(service.dispatch(request).await),
                    error: None,
                },
                Err(err) => Reply::failed(id, format!("malformed request: {err}")),
            }
        }
    };

    Ok(serde_json::to_string(&reply)?)
}

// Random trips of a single new cab: up to `max_trips` per day over `days` days starting at `start_date`.
fn cab_trips(rng: &mut StdRng, start_date: Day, days: u32, max_trips: u32) -> Vec<TripRecord> {
    let medallion = format!("{:032X}", rng.random::<u128>());
    let mut trips = Vec::new();

    for offset in 0..days {
        let midnight = (start_date + Duration::days(offset as i64)).and_time(NaiveTime::MIN);
        for _ in 0..rng.random_range(0..=max_trips) {
            let pickup = midnight + Duration::seconds(rng.random_range(0..86_400));
            trips.push(TripRecord::new(medallion.clone(), pickup));
        }
    }

    trips
}

#[fxstruct(sync, rc, no_new, builder)]
pub struct TripCountsApp {
    #[fieldx(get(clone))]
    cli: Cli,
}

impl TripCountsApp {
    /// Build the application from explicit command line arguments. The first item is the program name.
    pub fn from_args<I, T>(args: I) -> Result<Arc<Self>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::builder().cli(Cli::try_parse_from(args)?).build()?)
    }

    /// Entry point of the binary: parse the process arguments, report bad ones the clap way, execute.
    pub async fn run() -> Result<()> {
        let cli = Cli::parse();

        if let Err(report) = cli.validate() {
            let mut cmd = Cli::command();
            cmd.error(ErrorKind::InvalidValue, report).exit();
        }

        Self::builder()
            .cli(cli)
            .build()?
            .execute()
            .await
            .inspect_err(|err| log::error!("Application errored out: {err:#}"))
    }

    pub async fn execute(&self) -> Result<()> {
        let cli = self.cli();
        cli.validate().map_err(|report| anyhow!("invalid arguments: {report}"))?;

        self.setup_tracing()?;

        let driver = self.connect().await?;
        info!("Connected to {} database", driver.name());

        match cli.action() {
            Action::Migrate => self.migrate(driver.as_ref()).await,
            Action::Seed(args) => self.seed(driver.as_ref(), &args).await,
            Action::TripCounts(args) => self.trip_counts(driver.as_ref(), &args).await,
            Action::AllTrips(args) => self.all_trips(driver.as_ref(), &args).await,
            Action::Serve => self.serve(driver.as_ref()).await,
        }
    }

    fn setup_tracing(&self) -> Result<()> {
        use std::io;
        use tracing_subscriber::fmt::format::FmtSpan;
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let cli = self.cli();

        let dest_writer = std::sync::Mutex::new(if let Some(log_file) = cli.log_file() {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)?;
            Box::new(file) as Box<dyn io::Write + Send>
        }
        else {
            // Standard output is reserved for results.
            Box::new(io::stderr()) as Box<dyn io::Write + Send>
        });

        let registry = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(dest_writer)
                    .with_ansi(cli.log_file().is_none())
                    .with_span_events(FmtSpan::CLOSE),
            );

        // Executing more than one application in a process (like tests do) must not fail on this.
        if let Err(err) = registry.try_init() {
            log::debug!("Tracing is already set up: {err}");
        }
        else {
            info!("Tracing initialized");
        }

        Ok(())
    }

    async fn connect(&self) -> Result<Arc<dyn DatabaseDriver>> {
        let cli = self.cli();

        let driver: Arc<dyn DatabaseDriver> = match cli.backend() {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite => Arc::new(Sqlite::connect(&cli.sqlite_path(), cli.db_max_connections()).await?),
            #[cfg(feature = "mysql")]
            Backend::Mysql => {
                let db = MySql::builder()
                    .host(cli.db_host())
                    .port(cli.db_port().unwrap_or(MYSQL_PORT))
                    .user(cli.db_user())
                    .password(cli.db_password())
                    .schema(cli.db_schema())
                    .max_connections(cli.db_max_connections())
                    .build()?;
                db.connect().await?;
                db
            }
            #[cfg(feature = "pg")]
            Backend::Pg => {
                let db = Pg::builder()
                    .host(cli.db_host())
                    .port(cli.db_port().unwrap_or(PG_PORT))
                    .user(cli.db_user())
                    .password(cli.db_password())
                    .database(cli.db_schema())
                    .max_connections(cli.db_max_connections())
                    .build()?;
                db.connect().await?;
                db
            }
            #[allow(unreachable_patterns)]
            backend => {
                return Err(anyhow!(
                    "Backend '{}' is not supported by this build",
                    backend.feature()
                ))
            }
        };

        driver.configure().await?;

        Ok(driver)
    }

    fn service(&self, driver: &dyn DatabaseDriver) -> Result<TripCountService<SqlFactStore>> {
        let cache = TripCountCache::builder()
            .fact_store(Arc::new(SqlFactStore::new(driver.connection())))
            .name(self.cli().cache_name())
            .build()?;
        Ok(TripCountService::new(cache))
    }

    #[instrument(level = "trace", skip(self, driver))]
    async fn migrate(&self, driver: &dyn DatabaseDriver) -> Result<()> {
        Migrator::up(&driver.connection(), None).await?;
        info!("Schema is up to date");
        Ok(())
    }

    #[instrument(level = "trace", skip(self, driver))]
    async fn seed(&self, driver: &dyn DatabaseDriver, args: &SeedArgs) -> Result<()> {
        args.validate()
            .map_err(|report| anyhow!("invalid seed parameters: {report}"))?;

        let start_date = parse_day(&args.start_date).map_err(|msg| anyhow!(msg))?;
        let mut rng = match args.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        // One cab at a time, so memory use is bounded by a single cab's trips.
        let mut inserted = 0;
        for _ in 0..args.cabs {
            let trips = cab_trips(&mut rng, start_date, args.days, args.max_trips);
            inserted +=
                cab_trip::insert_trips(&driver.connection(), trips.iter().map(cab_trip::ActiveModel::from).collect())
                    .await?;
        }

        info!("Seeded {inserted} trips of {} cabs over {} days", args.cabs, args.days);
        println!("{}", serde_json::json!({ "inserted": inserted }));

        Ok(())
    }

    async fn trip_counts(&self, driver: &dyn DatabaseDriver, args: &TripCountsArgs) -> Result<()> {
        let response = self
            .service(driver)?
            .get_trip_counts_for_cab_ids(TripCountsRequest {
                cab_ids:      args.cab_ids.clone(),
                pickup_date:  args.pickup_date.clone(),
                ignore_cache: args.ignore_cache,
            })
            .await;

        println!("{}", serde_json::to_string_pretty(&response)?);

        match response.error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    async fn all_trips(&self, driver: &dyn DatabaseDriver, args: &AllTripsArgs) -> Result<()> {
        let response = self
            .service(driver)?
            .get_all_cab_trips(AllCabTripsRequest {
                ignore_cache: args.ignore_cache,
            })
            .await;

        println!("{}", serde_json::to_string_pretty(&response)?);

        match response.error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    async fn serve(&self, driver: &dyn DatabaseDriver) -> Result<()> {
        let service = self.service(driver)?;
        let stdout = Arc::new(Mutex::new(tokio::io::stdout()));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut tasks = JoinSet::<Result<()>>::new();

        info!("Serving requests from the standard input");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line?
                    else {
                        break;
                    };

                    if line.trim().is_empty() {
                        continue;
                    }

                    let service = service.clone();
                    let stdout = Arc::clone(&stdout);
                    tasks.spawn(async move {
                        let mut reply = handle_request_line(&service, &line).await?;
                        reply.push('\n');
                        let mut out = stdout.lock().await;
                        out.write_all(reply.as_bytes()).await?;
                        out.flush().await?;
                        Ok(())
                    });
                }
                _ = signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    break;
                }
            }

            while let Some(done) = tasks.try_join_next() {
                done??;
            }
        }

        while let Some(done) = tasks.join_next().await {
            done??;
        }

        info!("Input closed; cached cabs={}", service.cache().cab_count().await);

        Ok(())
    }
}
