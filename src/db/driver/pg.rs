use std::time::Duration;

use async_trait::async_trait;
use fieldx::fxstruct;
use sea_orm::ConnectOptions;
use sea_orm::ConnectionTrait;
use sea_orm::DatabaseConnection;
use sea_orm::DbErr;

use super::DatabaseDriver;

#[derive(Debug)]
#[fxstruct(sync, rc, no_new, builder)]
pub struct Pg {
    host:            String,
    port:            u16,
    user:            String,
    password:        String,
    database:        String,
    max_connections: u32,
    #[fieldx(inner_mut, get(off), set, builder(off))]
    connection:      DatabaseConnection,
}

impl Pg {
    pub async fn connect(&self) -> Result<(), DbErr> {
        let url = format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        );
        let mut opts = ConnectOptions::new(&url);
        opts.max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(20))
            .max_lifetime(Duration::from_secs(60))
            .test_before_acquire(true);

        self.set_connection(sea_orm::Database::connect(opts).await.inspect_err(|e| {
            log::error!(
                "Error connecting to PostgreSQL database {} at {}:{}: {e}",
                self.database,
                self.host,
                self.port
            )
        })?);

        Ok(())
    }
}

#[async_trait]
impl DatabaseDriver for Pg {
    fn name(&self) -> &'static str {
        "pg"
    }

    fn connection(&self) -> DatabaseConnection {
        self.connection.read().clone()
    }

    /// The cache only reads; make sure a long aggregation doesn't get stuck behind a lock forever.
    async fn configure(&self) -> Result<(), DbErr> {
        self.connection()
            .execute_unprepared("SET lock_timeout = '30s';")
            .await?;

        Ok(())
    }
}
