pub mod analytics;
pub mod car;
pub mod filter;

pub use analytics::{CarViewStat, CarViewsReport, ViewRecorded};
pub use car::{Car, CarId};
pub use filter::{CarField, Filter, FilterValue, Query};
