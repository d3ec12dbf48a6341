use std::path::Path;

use crate::{
    error::{AppError, AppResult},
    models::{Car, CarId, Query},
    services::stores::{RecordStore, Table},
};

/// In-memory record store
///
/// Rows are scanned in insertion order. Used for local runs without a
/// database (seeded from a JSON array of cars) and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    cars: Vec<Car>,
}

impl MemoryStore {
    pub fn new(cars: Vec<Car>) -> Self {
        Self { cars }
    }

    /// Loads a JSON array of cars from disk
    pub async fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Internal(format!("Failed to read seed file {}: {}", path.display(), e))
        })?;
        let cars: Vec<Car> = serde_json::from_str(&raw).map_err(|e| {
            AppError::Internal(format!("Invalid seed file {}: {}", path.display(), e))
        })?;

        tracing::info!(path = %path.display(), cars = cars.len(), "Loaded memory store seed");

        Ok(Self::new(cars))
    }

    pub fn len(&self) -> usize {
        self.cars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }

    fn rows(&self, table: Table) -> &[Car] {
        match table {
            Table::Cars => &self.cars,
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn find_many(&self, table: Table, query: Query) -> AppResult<Vec<Car>> {
        Ok(self
            .rows(table)
            .iter()
            .filter(|car| query.accepts(car))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn find_one(&self, table: Table, id: &CarId) -> AppResult<Option<Car>> {
        Ok(self.rows(table).iter().find(|car| &car.id == id).cloned())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
