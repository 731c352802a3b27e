use std::time::Duration;

use async_trait::async_trait;
use fieldx::fxstruct;
use sea_orm::ConnectOptions;
use sea_orm::DatabaseConnection;
use sea_orm::DbErr;

use super::DatabaseDriver;

/// MySQL/MariaDB server connection. This is where the NY cab trip data usually lives.
#[derive(Debug)]
#[fxstruct(sync, rc, no_new, builder)]
pub struct MySql {
    host:            String,
    port:            u16,
    user:            String,
    password:        String,
    schema:          String,
    max_connections: u32,
    #[fieldx(inner_mut, get(off), set, builder(off))]
    connection:      DatabaseConnection,
}

impl MySql {
    pub async fn connect(&self) -> Result<(), DbErr> {
        let url = format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.schema
        );
        let mut opts = ConnectOptions::new(&url);
        opts.max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(60))
            .test_before_acquire(true);

        self.set_connection(sea_orm::Database::connect(opts).await.inspect_err(|e| {
            log::error!(
                "Error connecting to MySQL database {} at {}:{}: {e}",
                self.schema,
                self.host,
                self.port
            )
        })?);

        Ok(())
    }
}

#[async_trait]
impl DatabaseDriver for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn connection(&self) -> DatabaseConnection {
        self.connection.read().clone()
    }

    async fn configure(&self) -> Result<(), DbErr> {
        Ok(())
    }
}
