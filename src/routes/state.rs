use std::sync::Arc;

use crate::{
    db::Cache,
    services::{CarViewsService, RecordStore, RelatedCarsResolver, ViewCounter},
};

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub related: RelatedCarsResolver,
    pub views: CarViewsService,
    /// Car detail cache, absent when no Redis is configured
    pub cache: Option<Cache>,
    pub car_cache_ttl: u64,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        counter: Arc<dyn ViewCounter>,
        cache: Option<Cache>,
        car_cache_ttl: u64,
    ) -> Self {
        Self {
            related: RelatedCarsResolver::new(store.clone()),
            views: CarViewsService::new(store.clone(), counter),
            store,
            cache,
            car_cache_ttl,
        }
    }
}
