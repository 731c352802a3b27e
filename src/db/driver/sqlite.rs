use std::path::Path;

use async_trait::async_trait;
use fieldx::fxstruct;
use sea_orm::ConnectOptions;
use sea_orm::ConnectionTrait;
use sea_orm::DatabaseConnection;
use sea_orm::DbErr;

use super::DatabaseDriver;

/// SQLite database stored in a single file. The file is created if it doesn't exist.
#[derive(Debug)]
#[fxstruct(sync, no_new)]
pub struct Sqlite {
    connection: DatabaseConnection,
}

impl Sqlite {
    pub async fn connect(db_path: &Path, max_connections: u32) -> Result<Self, DbErr> {
        let schema = format!("sqlite://{}?mode=rwc", db_path.display());
        let mut opts = ConnectOptions::new(&schema);
        opts.max_connections(max_connections).sqlx_logging(false);

        let db = sea_orm::Database::connect(opts)
            .await
            .inspect_err(|e| log::error!("Error connecting to database {schema}: {e}"))?;

        Ok(Self { connection: db })
    }
}

#[async_trait]
impl DatabaseDriver for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    /// Switches the database into WAL mode so that readers don't block on writers.
    async fn configure(&self) -> Result<(), DbErr> {
        let db = &self.connection;

        db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        db.execute_unprepared("PRAGMA synchronous=NORMAL;").await?;

        Ok(())
    }
}
