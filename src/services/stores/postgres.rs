use serde_json::{Map, Value};
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use crate::{
    error::AppResult,
    models::{Car, CarField, CarId, Filter, FilterValue, Query},
    services::stores::{RecordStore, Table},
};

/// Typed columns are selected explicitly, every other column is folded into
/// `details` so descriptive fields pass through without a schema here.
const SELECT_CARS: &str = "SELECT c.id::text AS id, c.name, c.category, c.brand, \
     c.price_per_day::float8 AS price_per_day, \
     to_jsonb(c) - 'id' - 'name' - 'category' - 'brand' - 'price_per_day' AS details \
     FROM ";

#[derive(Debug, FromRow)]
struct CarRow {
    id: String,
    name: Option<String>,
    category: Option<String>,
    brand: Option<String>,
    price_per_day: Option<f64>,
    details: Json<Map<String, Value>>,
}

impl From<CarRow> for Car {
    fn from(row: CarRow) -> Self {
        Car {
            id: CarId::from(row.id),
            name: row.name.unwrap_or_default(),
            category: row.category,
            brand: row.brand.unwrap_or_default(),
            price_per_day: row.price_per_day.unwrap_or_default(),
            details: row.details.0,
        }
    }
}

/// Record store reading straight from PostgreSQL
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn column_expr(field: CarField) -> &'static str {
    match field {
        CarField::Category => "c.category",
        CarField::Brand => "c.brand",
        CarField::PricePerDay => "c.price_per_day::float8",
    }
}

fn select_cars(table: Table) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(SELECT_CARS);
    builder.push(table.as_str()).push(" AS c WHERE TRUE");
    builder
}

fn push_filter(builder: &mut QueryBuilder<'static, Postgres>, filter: &Filter) {
    match filter {
        Filter::Eq { field, value } => {
            builder.push(" AND ").push(column_expr(*field)).push(" = ");
            match value {
                FilterValue::Text(text) => builder.push_bind(text.clone()),
                FilterValue::Number(n) => builder.push_bind(*n),
            };
        }
        Filter::Between { field, low, high } => {
            builder
                .push(" AND ")
                .push(column_expr(*field))
                .push(" BETWEEN ")
                .push_bind(*low)
                .push(" AND ")
                .push_bind(*high);
        }
    }
}

/// Builds the statement behind `find_many`
fn build_find_many(table: Table, query: &Query) -> QueryBuilder<'static, Postgres> {
    let mut builder = select_cars(table);

    if let Some(filter) = &query.filter {
        push_filter(&mut builder, filter);
    }

    if !query.exclude_ids.is_empty() {
        let ids: Vec<String> = query
            .exclude_ids
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();
        builder
            .push(" AND NOT (c.id::text = ANY(")
            .push_bind(ids)
            .push("))");
    }

    builder.push(" LIMIT ").push_bind(query.limit as i64);
    builder
}

fn build_find_one(table: Table, id: &CarId) -> QueryBuilder<'static, Postgres> {
    let mut builder = select_cars(table);
    builder
        .push(" AND c.id::text = ")
        .push_bind(id.as_str().to_string())
        .push(" LIMIT 1");
    builder
}

#[async_trait::async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self), fields(store = "postgres"))]
    async fn find_many(&self, table: Table, query: Query) -> AppResult<Vec<Car>> {
        let rows: Vec<CarRow> = build_find_many(table, &query)
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(rows = rows.len(), "find_many completed");

        Ok(rows.into_iter().map(Car::from).collect())
    }

    #[instrument(skip(self), fields(store = "postgres"))]
    async fn find_one(&self, table: Table, id: &CarId) -> AppResult<Option<Car>> {
        let row: Option<CarRow> = build_find_one(table, id)
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Car::from))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_many_with_category_and_exclusions() {
        let query = Query::new(3)
            .with_filter(Filter::eq(CarField::Category, "SUV"))
            .excluding([CarId::from("42")]);

        let builder = build_find_many(Table::Cars, &query);
        let sql = builder.sql();

        assert!(sql.contains("FROM cars AS c WHERE TRUE"));
        assert!(sql.ends_with(
            " AND c.category = $1 AND NOT (c.id::text = ANY($2)) LIMIT $3"
        ));
    }

    #[test]
    fn test_find_many_price_band() {
        let query = Query::new(2).with_filter(Filter::between(CarField::PricePerDay, 70.0, 130.0));

        let builder = build_find_many(Table::Cars, &query);

        assert!(builder
            .sql()
            .ends_with(" AND c.price_per_day::float8 BETWEEN $1 AND $2 LIMIT $3"));
    }

    #[test]
    fn test_find_many_without_filter_only_limits() {
        let builder = build_find_many(Table::Cars, &Query::new(3));
        assert!(builder.sql().ends_with("WHERE TRUE LIMIT $1"));
    }

    #[test]
    fn test_find_one_by_id() {
        let builder = build_find_one(Table::Cars, &CarId::from("7"));
        assert!(builder.sql().ends_with(" AND c.id::text = $1 LIMIT 1"));
    }

    #[test]
    fn test_row_conversion_defaults_missing_columns() {
        let row = CarRow {
            id: "9".to_string(),
            name: None,
            category: None,
            brand: None,
            price_per_day: None,
            details: Json(Map::new()),
        };

        let car = Car::from(row);
        assert_eq!(car.id, CarId::from("9"));
        assert_eq!(car.brand, "");
        assert!(!car.has_known_price());
    }
}
