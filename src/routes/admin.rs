use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::CarViewsReport,
    routes::AppState,
};

const DEFAULT_REPORT_ROWS: usize = 10;
const MAX_REPORT_ROWS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub limit: Option<usize>,
}

/// Handler for the admin car-views analytics endpoint
pub async fn car_views(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<ReportParams>,
) -> AppResult<Json<CarViewsReport>> {
    let limit = params.limit.unwrap_or(DEFAULT_REPORT_ROWS);
    if limit == 0 || limit > MAX_REPORT_ROWS {
        return Err(AppError::InvalidInput(format!(
            "limit must be between 1 and {}",
            MAX_REPORT_ROWS
        )));
    }

    tracing::info!(request_id = %request_id, limit, "Building car views report");

    let report = state.views.report(limit).await?;
    Ok(Json(report))
}
