//! Hosted database REST store
//!
//! Talks to the PostgREST-style surface of the hosted database:
//!
//! - `GET /rest/v1/{table}?select=*&category=eq.SUV&id=not.in.("1","2")&limit=3`
//! - range filters become a `gte.` / `lte.` pair on the same column
//!
//! Every request carries the project key both as `apikey` and as a bearer
//! token, which is what the hosted service expects for anonymous reads.

use reqwest::Client as HttpClient;
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{Car, CarId, Filter, Query},
    services::stores::{RecordStore, Table},
};

#[derive(Clone)]
pub struct RestRecordStore {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
}

impl RestRecordStore {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url,
            api_key,
        }
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table)
    }

    async fn fetch(&self, table: Table, params: Vec<(String, String)>) -> AppResult<Vec<Car>> {
        let response = self
            .http_client
            .get(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                table = %table,
                status = %status,
                body = %body,
                "Record store request failed"
            );
            return Err(AppError::ExternalApi(format!(
                "Record store returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

/// PostgREST wraps list members in double quotes so ids containing commas
/// or parentheses survive
fn quote(id: &CarId) -> String {
    format!("\"{}\"", id.as_str().replace('\\', "\\\\").replace('"', "\\\""))
}

fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    match filter {
        Filter::Eq { field, value } => vec![(field.column().to_string(), format!("eq.{}", value))],
        Filter::Between { field, low, high } => vec![
            (field.column().to_string(), format!("gte.{}", low)),
            (field.column().to_string(), format!("lte.{}", high)),
        ],
    }
}

/// Query string for `find_many`
fn find_many_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];

    if let Some(filter) = &query.filter {
        params.extend(filter_params(filter));
    }

    if !query.exclude_ids.is_empty() {
        let ids: Vec<String> = query.exclude_ids.iter().map(quote).collect();
        params.push(("id".to_string(), format!("not.in.({})", ids.join(","))));
    }

    params.push(("limit".to_string(), query.limit.to_string()));
    params
}

fn find_one_params(id: &CarId) -> Vec<(String, String)> {
    vec![
        ("select".to_string(), "*".to_string()),
        ("id".to_string(), format!("eq.{}", id)),
        ("limit".to_string(), "1".to_string()),
    ]
}

#[async_trait::async_trait]
impl RecordStore for RestRecordStore {
    #[instrument(skip(self), fields(store = "rest"))]
    async fn find_many(&self, table: Table, query: Query) -> AppResult<Vec<Car>> {
        let mut cars = self.fetch(table, find_many_params(&query)).await?;
        cars.truncate(query.limit);
        Ok(cars)
    }

    #[instrument(skip(self), fields(store = "rest"))]
    async fn find_one(&self, table: Table, id: &CarId) -> AppResult<Option<Car>> {
        let cars = self.fetch(table, find_one_params(id)).await?;
        Ok(cars.into_iter().next())
    }

    fn name(&self) -> &'static str {
        "rest"
    }
}
