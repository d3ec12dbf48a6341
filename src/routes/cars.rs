use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    cached,
    db::CacheKey,
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{Car, CarField, CarId, Filter, Query as StoreQuery, ViewRecorded},
    routes::AppState,
    services::{RecommendationSet, Table},
};

const DEFAULT_PAGE_SIZE: usize = 12;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub limit: Option<usize>,
}

impl ListParams {
    /// Listing pages filter on one criterion at a time
    fn filter(&self) -> AppResult<Option<Filter>> {
        let price = match (self.min_price, self.max_price) {
            (None, None) => None,
            (Some(min), Some(max)) => {
                if !(min.is_finite() && max.is_finite()) || min < 0.0 || max < 0.0 {
                    return Err(AppError::InvalidInput(
                        "Price bounds must be non-negative numbers".to_string(),
                    ));
                }
                Some(Filter::between(CarField::PricePerDay, min, max))
            }
            _ => {
                return Err(AppError::InvalidInput(
                    "min_price and max_price must be given together".to_string(),
                ))
            }
        };

        let category = self
            .category
            .as_deref()
            .map(|c| Filter::eq(CarField::Category, c));
        let brand = self.brand.as_deref().map(|b| Filter::eq(CarField::Brand, b));

        let mut filters = [category, brand, price].into_iter().flatten();
        let filter = filters.next();
        if filters.next().is_some() {
            return Err(AppError::InvalidInput(
                "Filter by only one of category, brand or price range".to_string(),
            ));
        }

        Ok(filter)
    }

    fn limit(&self) -> AppResult<usize> {
        match self.limit.unwrap_or(DEFAULT_PAGE_SIZE) {
            0 => Err(AppError::InvalidInput("limit must be positive".to_string())),
            n if n > MAX_PAGE_SIZE => Err(AppError::InvalidInput(format!(
                "limit must be at most {}",
                MAX_PAGE_SIZE
            ))),
            n => Ok(n),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RelatedParams {
    pub category: Option<String>,
}

/// Loads a car, going through the Redis cache when one is configured
async fn load_car(state: &AppState, id: &CarId) -> AppResult<Car> {
    let fetch = async {
        state
            .store
            .find_one(Table::Cars, id)
            .await
            .and_then(|car| car.ok_or_else(|| AppError::NotFound(format!("Car {} not found", id))))
    };

    match &state.cache {
        Some(cache) => cached!(cache, CacheKey::CarDetail(id.clone()), state.car_cache_ttl, fetch),
        None => fetch.await,
    }
}

/// Handler for the car listing endpoint
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Vec<Car>>> {
    let mut query = StoreQuery::new(params.limit()?);
    if let Some(filter) = params.filter()? {
        query = query.with_filter(filter);
    }

    let cars = state.store.find_many(Table::Cars, query).await?;
    Ok(Json(cars))
}

/// Handler for the car detail endpoint
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Car>> {
    let car = load_car(&state, &CarId::from(id)).await?;
    Ok(Json(car))
}

/// Handler for the related cars endpoint
///
/// Always succeeds; an empty array tells the page to omit the section.
pub async fn related(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    Query(params): Query<RelatedParams>,
) -> Json<RecommendationSet> {
    let id = CarId::from(id);

    tracing::info!(
        request_id = %request_id,
        car_id = %id,
        category = ?params.category,
        "Resolving related cars"
    );

    Json(state.related.resolve(&id, params.category.as_deref()).await)
}

/// Handler for recording a car detail view
pub async fn record_view(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> AppResult<Json<ViewRecorded>> {
    let recorded = state.views.record(&CarId::from(id)).await?;

    tracing::debug!(
        request_id = %request_id,
        car_id = %recorded.car_id,
        views = recorded.views,
        "Car view recorded"
    );

    Ok(Json(recorded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_params_lists_unfiltered_default_page() {
        let params = ListParams::default();
        assert_eq!(params.filter().unwrap(), None);
        assert_eq!(params.limit().unwrap(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_single_filter_is_accepted() {
        let params = ListParams {
            brand: Some("Toyota".to_string()),
            ..Default::default()
        };
        assert_eq!(
            params.filter().unwrap(),
            Some(Filter::eq(CarField::Brand, "Toyota"))
        );
    }

    #[test]
    fn test_price_range_needs_both_bounds() {
        let params = ListParams {
            min_price: Some(50.0),
            ..Default::default()
        };
        assert!(params.filter().is_err());
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let params = ListParams {
            min_price: Some(-1.0),
            max_price: Some(50.0),
            ..Default::default()
        };
        assert!(params.filter().is_err());
    }

    #[test]
    fn test_two_filters_are_rejected() {
        let params = ListParams {
            category: Some("SUV".to_string()),
            min_price: Some(50.0),
            max_price: Some(150.0),
            ..Default::default()
        };
        assert!(matches!(params.filter(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_limit_bounds() {
        let zero = ListParams {
            limit: Some(0),
            ..Default::default()
        };
        let huge = ListParams {
            limit: Some(MAX_PAGE_SIZE + 1),
            ..Default::default()
        };
        assert!(zero.limit().is_err());
        assert!(huge.limit().is_err());
    }
}
