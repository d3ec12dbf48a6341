use serde::Serialize;

use super::CarId;

/// View total for one car on the admin analytics page
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CarViewStat {
    pub car_id: CarId,
    pub name: String,
    pub brand: String,
    pub category: Option<String>,
    pub views: u64,
}

/// Ranked car views, most viewed first
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CarViewsReport {
    /// Views across every counted car, including cars since removed
    pub total_views: u64,
    /// Distinct cars with at least one view
    pub cars_viewed: usize,
    pub top: Vec<CarViewStat>,
}

/// Response to recording a single view
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ViewRecorded {
    pub car_id: CarId,
    pub views: u64,
}
