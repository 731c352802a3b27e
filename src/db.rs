//! Relational fact store support built on SeaORM.
//!
//! The trips live in the `cab_trip_data` table. [`SqlFactStore`](fact_store::SqlFactStore) runs the two aggregate
//! queries the cache needs; [`driver`] takes care of connecting to a particular backend, and [`migrations`] creates
//! the schema.
pub mod driver;
pub mod entity;
pub mod fact_store;
pub mod migrations;

pub mod prelude {
    pub use super::driver::DatabaseDriver;
    pub use super::entity::*;
    pub use super::fact_store::SqlFactStore;
    pub use super::fact_store::StoreError;
    pub use super::migrations::Migrator;
}
