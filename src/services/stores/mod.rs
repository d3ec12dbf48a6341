//! Record store abstraction
//!
//! Car reads go through a pluggable store so the recommendation logic never
//! knows whether it is talking to PostgreSQL directly, to the hosted
//! database's REST surface, or to an in-memory fixture.

use std::fmt::Display;

use crate::{
    error::AppResult,
    models::{Car, CarId, Query},
};

pub mod memory;
pub mod postgres;
pub mod rest;

pub use memory::MemoryStore;
pub use postgres::PgRecordStore;
pub use rest::RestRecordStore;

/// Tables a store can be asked to read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Cars,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Cars => "cars",
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for record stores
///
/// `find_many` applies the query's filter, drops excluded ids and returns at
/// most `limit` rows. Row order is whatever the backend yields.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch rows matching a query
    async fn find_many(&self, table: Table, query: Query) -> AppResult<Vec<Car>>;

    /// Fetch a single row by id, `None` when it does not exist
    async fn find_one(&self, table: Table, id: &CarId) -> AppResult<Option<Car>>;

    /// Store name for logging and debugging
    fn name(&self) -> &'static str;
}
