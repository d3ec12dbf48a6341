use chrono::Utc;
use redis::{AsyncCommands, Client};
use std::{cmp::Ordering, collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

use crate::{
    db::CacheKey,
    error::{AppError, AppResult},
    models::{Car, CarId, CarViewStat, CarViewsReport, ViewRecorded},
    services::stores::{RecordStore, Table},
};

/// Per-day counters are kept for a month
const DAILY_VIEWS_TTL: i64 = 60 * 60 * 24 * 30;

/// Counts car detail page views
#[async_trait::async_trait]
pub trait ViewCounter: Send + Sync {
    /// Adds one view and returns the car's new total
    async fn record_view(&self, car_id: &CarId) -> AppResult<u64>;

    /// All-time totals keyed by car
    async fn view_counts(&self) -> AppResult<HashMap<CarId, u64>>;

    fn name(&self) -> &'static str;
}

/// View counters kept in Redis hashes
pub struct RedisViewCounter {
    redis_client: Client,
}

impl RedisViewCounter {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }
}

#[async_trait::async_trait]
impl ViewCounter for RedisViewCounter {
    async fn record_view(&self, car_id: &CarId) -> AppResult<u64> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let total: u64 = conn
            .hincr(CacheKey::CarViewsTotal.to_string(), car_id.as_str(), 1)
            .await?;

        let daily_key = CacheKey::CarViewsDaily(Utc::now().date_naive()).to_string();
        let _: () = conn.hincr(&daily_key, car_id.as_str(), 1).await?;
        let _: () = conn.expire(&daily_key, DAILY_VIEWS_TTL).await?;

        Ok(total)
    }

    async fn view_counts(&self) -> AppResult<HashMap<CarId, u64>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let raw: HashMap<String, u64> = conn.hgetall(CacheKey::CarViewsTotal.to_string()).await?;

        Ok(raw.into_iter().map(|(id, n)| (CarId::from(id), n)).collect())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Process-local view counters, lost on restart
#[derive(Default)]
pub struct MemoryViewCounter {
    counts: RwLock<HashMap<CarId, u64>>,
}

impl MemoryViewCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ViewCounter for MemoryViewCounter {
    async fn record_view(&self, car_id: &CarId) -> AppResult<u64> {
        let mut counts = self.counts.write().await;
        let total = counts.entry(car_id.clone()).or_insert(0);
        *total += 1;
        Ok(*total)
    }

    async fn view_counts(&self) -> AppResult<HashMap<CarId, u64>> {
        Ok(self.counts.read().await.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Numeric ids sort as numbers ("9" before "10") and ahead of non-numeric
/// ids, which sort lexically
fn compare_ids(a: &CarId, b: &CarId) -> Ordering {
    match (a.as_str().parse::<i64>(), b.as_str().parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.as_str().cmp(b.as_str()),
    }
}

/// Car ids ordered by views descending, ties by id ascending
pub fn rank_views(counts: &HashMap<CarId, u64>) -> Vec<(CarId, u64)> {
    let mut ranked: Vec<(CarId, u64)> = counts
        .iter()
        .filter(|(_, views)| **views > 0)
        .map(|(id, views)| (id.clone(), *views))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| compare_ids(&a.0, &b.0)));
    ranked
}

/// Joins view counts with car records into the admin report
///
/// Cars absent from `cars` (deleted since they were viewed) still count
/// towards the totals but get no row.
pub fn build_report(counts: &HashMap<CarId, u64>, cars: &[Car], limit: usize) -> CarViewsReport {
    let by_id: HashMap<&CarId, &Car> = cars.iter().map(|car| (&car.id, car)).collect();

    let top = rank_views(counts)
        .into_iter()
        .filter_map(|(id, views)| {
            by_id.get(&id).map(|car| CarViewStat {
                car_id: id.clone(),
                name: car.name.clone(),
                brand: car.brand.clone(),
                category: car.category.clone(),
                views,
            })
        })
        .take(limit)
        .collect();

    CarViewsReport {
        total_views: counts.values().sum(),
        cars_viewed: counts.values().filter(|views| **views > 0).count(),
        top,
    }
}

/// Records views and builds the admin car-views report
#[derive(Clone)]
pub struct CarViewsService {
    store: Arc<dyn RecordStore>,
    counter: Arc<dyn ViewCounter>,
}

impl CarViewsService {
    pub fn new(store: Arc<dyn RecordStore>, counter: Arc<dyn ViewCounter>) -> Self {
        Self { store, counter }
    }

    /// Counts a view of an existing car
    pub async fn record(&self, car_id: &CarId) -> AppResult<ViewRecorded> {
        if self.store.find_one(Table::Cars, car_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Car {} not found", car_id)));
        }

        let views = self.counter.record_view(car_id).await?;

        tracing::debug!(car_id = %car_id, views, counter = self.counter.name(), "Recorded car view");

        Ok(ViewRecorded {
            car_id: car_id.clone(),
            views,
        })
    }

    /// Most viewed cars, at most `limit` rows
    pub async fn report(&self, limit: usize) -> AppResult<CarViewsReport> {
        let counts = self.counter.view_counts().await?;

        let mut cars = Vec::with_capacity(limit);
        for (id, _) in rank_views(&counts) {
            if cars.len() >= limit {
                break;
            }
            if let Some(car) = self.store.find_one(Table::Cars, &id).await? {
                cars.push(car);
            }
        }

        let report = build_report(&counts, &cars, limit);

        tracing::info!(
            total_views = report.total_views,
            cars_viewed = report.cars_viewed,
            rows = report.top.len(),
            "Built car views report"
        );

        Ok(report)
    }
}
