pub mod car_views;
pub mod related_cars;
pub mod stores;

pub use car_views::{CarViewsService, MemoryViewCounter, RedisViewCounter, ViewCounter};
pub use related_cars::{RecommendationSet, RelatedCarsResolver, MAX_RELATED};
pub use stores::{MemoryStore, PgRecordStore, RecordStore, RestRecordStore, Table};
