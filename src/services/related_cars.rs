use serde::Serialize;
use std::{collections::HashSet, fmt::Display, sync::Arc};
use tracing::instrument;

use crate::{
    models::{Car, CarField, CarId, Filter, Query},
    services::stores::{RecordStore, Table},
};

/// Most cars shown next to a car detail page
pub const MAX_RELATED: usize = 3;

/// Price band around the target's daily rate, inclusive on both ends
const PRICE_BAND_LOW: f64 = 0.7;
const PRICE_BAND_HIGH: f64 = 1.3;

/// Band edges are snapped to micro-units so float noise never pulls an
/// exact cent bound inwards (25.40 * 1.3 is 33.019999999999996)
const PRICE_BAND_SCALE: f64 = 1_000_000.0;

/// Inclusive `(low, high)` daily-rate band around `rate`
pub fn price_band(rate: f64) -> (f64, f64) {
    let snap = |bound: f64| (bound * PRICE_BAND_SCALE).round() / PRICE_BAND_SCALE;
    (snap(rate * PRICE_BAND_LOW), snap(rate * PRICE_BAND_HIGH))
}

/// Stage of the fallback cascade, loosest last
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Category,
    Brand,
    PriceBand,
    Random,
}

impl Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Category => write!(f, "category"),
            Tier::Brand => write!(f, "brand"),
            Tier::PriceBand => write!(f, "price_band"),
            Tier::Random => write!(f, "random"),
        }
    }
}

/// Up to [`MAX_RELATED`] distinct cars, never containing the target
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RecommendationSet(Vec<Car>);

impl RecommendationSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn cars(&self) -> &[Car] {
        &self.0
    }

    pub fn ids(&self) -> Vec<&CarId> {
        self.0.iter().map(|car| &car.id).collect()
    }
}

/// Candidates accumulated across tiers
///
/// Drops the target and repeated ids as cars arrive (first occurrence wins)
/// and stops accepting once full, so tier order is preserved.
struct Candidates<'a> {
    target: &'a CarId,
    seen: HashSet<CarId>,
    cars: Vec<Car>,
}

impl<'a> Candidates<'a> {
    fn new(target: &'a CarId) -> Self {
        Self {
            target,
            seen: HashSet::new(),
            cars: Vec::with_capacity(MAX_RELATED),
        }
    }

    fn extend(&mut self, found: Vec<Car>) {
        for car in found {
            if self.is_full() {
                break;
            }
            if &car.id == self.target || !self.seen.insert(car.id.clone()) {
                continue;
            }
            self.cars.push(car);
        }
    }

    fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }

    fn is_full(&self) -> bool {
        self.cars.len() >= MAX_RELATED
    }

    fn remaining(&self) -> usize {
        MAX_RELATED.saturating_sub(self.cars.len())
    }

    /// Target plus everything already picked
    fn excluded(&self) -> Vec<CarId> {
        std::iter::once(self.target.clone())
            .chain(self.cars.iter().map(|car| car.id.clone()))
            .collect()
    }

    fn into_set(self) -> RecommendationSet {
        RecommendationSet(self.cars)
    }
}

/// Finds cars to recommend alongside a car detail page
///
/// Criteria loosen tier by tier until three cars are collected:
///
/// 1. same category
/// 2. same brand as the target (only when the category tier found some, but not enough)
/// 3. daily rate within 70%..130% of the target's (same condition as brand)
/// 4. anything else in the store
///
/// Tiers add to each other rather than replace earlier picks. A failing tier
/// counts as zero matches and the cascade carries on, so the result is always
/// a (possibly empty) set rather than an error.
#[derive(Clone)]
pub struct RelatedCarsResolver {
    store: Arc<dyn RecordStore>,
}

impl RelatedCarsResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn resolve(&self, target_id: &CarId, category: Option<&str>) -> RecommendationSet {
        let mut candidates = Candidates::new(target_id);

        let category = category.map(str::trim).filter(|c| !c.is_empty());

        if let Some(category) = category {
            let query = Query::new(MAX_RELATED)
                .with_filter(Filter::eq(CarField::Category, category))
                .excluding(candidates.excluded());
            candidates.extend(self.fetch_tier(Tier::Category, query).await);

            if !candidates.is_empty() && !candidates.is_full() {
                self.fill_from_target(&mut candidates).await;
            }
        }

        if !candidates.is_full() {
            let query = Query::new(candidates.remaining()).excluding(candidates.excluded());
            candidates.extend(self.fetch_tier(Tier::Random, query).await);
        }

        let related = candidates.into_set();

        tracing::info!(
            target_id = %target_id,
            count = related.len(),
            "Resolved related cars"
        );

        related
    }

    /// Brand and price-band tiers, both keyed off the target's own record
    async fn fill_from_target(&self, candidates: &mut Candidates<'_>) {
        let target = match self.store.find_one(Table::Cars, candidates.target).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                tracing::warn!(
                    target_id = %candidates.target,
                    "Target car not found, skipping brand and price tiers"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    target_id = %candidates.target,
                    error = %e,
                    "Target car lookup failed, skipping brand and price tiers"
                );
                return;
            }
        };

        if !target.brand.trim().is_empty() {
            let query = Query::new(candidates.remaining())
                .with_filter(Filter::eq(CarField::Brand, target.brand.as_str()))
                .excluding(candidates.excluded());
            candidates.extend(self.fetch_tier(Tier::Brand, query).await);
        }

        if !candidates.is_full() && target.has_known_price() {
            let (low, high) = price_band(target.price_per_day);
            let query = Query::new(candidates.remaining())
                .with_filter(Filter::between(CarField::PricePerDay, low, high))
                .excluding(candidates.excluded());
            candidates.extend(self.fetch_tier(Tier::PriceBand, query).await);
        }
    }

    async fn fetch_tier(&self, tier: Tier, query: Query) -> Vec<Car> {
        match self.store.find_many(Table::Cars, query).await {
            Ok(cars) => {
                tracing::debug!(tier = %tier, found = cars.len(), "Related cars tier fetched");
                cars
            }
            Err(e) => {
                tracing::warn!(tier = %tier, error = %e, "Related cars tier failed, continuing");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        services::stores::{MemoryStore, MockRecordStore},
    };

    fn id(raw: &str) -> CarId {
        CarId::from(raw)
    }

    fn ids(set: &RecommendationSet) -> Vec<&str> {
        set.cars().iter().map(|car| car.id.as_str()).collect()
    }

    fn target() -> Car {
        Car::new("42", "Land Cruiser", "Toyota", 100.0).with_category("SUV")
    }

    fn resolver(store: impl RecordStore + 'static) -> RelatedCarsResolver {
        RelatedCarsResolver::new(Arc::new(store))
    }

    fn has_filter(query: &Query, field: CarField) -> bool {
        query.filter.as_ref().map(Filter::field) == Some(field)
    }

    #[tokio::test]
    async fn test_category_tier_alone_fills_all_slots() {
        let store = MemoryStore::new(vec![
            target(),
            Car::new("1", "RAV4", "Toyota", 90.0).with_category("SUV"),
            Car::new("2", "Tucson", "Hyundai", 85.0).with_category("SUV"),
            Car::new("3", "X5", "BMW", 180.0).with_category("SUV"),
            Car::new("4", "Corolla", "Toyota", 55.0),
        ]);

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_category_sufficiency_skips_other_tiers() {
        let mut store = MockRecordStore::new();
        store.expect_name().return_const("mock");
        store
            .expect_find_many()
            .withf(|_, query| has_filter(query, CarField::Category))
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    Car::new("1", "", "Kia", 80.0).with_category("SUV"),
                    Car::new("2", "", "Kia", 80.0).with_category("SUV"),
                    Car::new("3", "", "Kia", 80.0).with_category("SUV"),
                ])
            });
        store.expect_find_one().times(0);

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_brand_tier_tops_up_partial_category_match() {
        let store = MemoryStore::new(vec![
            target(),
            Car::new("1", "RAV4", "Honda", 300.0).with_category("SUV"),
            Car::new("5", "Corolla", "Toyota", 300.0).with_category("Sedan"),
            Car::new("6", "Yaris", "Toyota", 300.0).with_category("Compact"),
            Car::new("7", "Supra", "Toyota", 300.0).with_category("Coupe"),
        ]);

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["1", "5", "6"]);
    }

    #[tokio::test]
    async fn test_price_band_tier_after_brand_tier() {
        let store = MemoryStore::new(vec![
            target(),
            Car::new("1", "", "Kia", 500.0).with_category("SUV"),
            Car::new("2", "", "Fiat", 69.0),
            Car::new("3", "", "Fiat", 70.0),
            Car::new("4", "", "Fiat", 130.0),
            Car::new("5", "", "Fiat", 131.0),
        ]);

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["1", "3", "4"]);
    }

    #[tokio::test]
    async fn test_price_band_query_uses_target_rate() {
        let mut store = MockRecordStore::new();
        store.expect_name().return_const("mock");
        store
            .expect_find_many()
            .withf(|_, query| has_filter(query, CarField::Category))
            .times(1)
            .returning(|_, _| Ok(vec![Car::new("1", "", "Kia", 80.0)]));
        store
            .expect_find_one()
            .times(1)
            .returning(|_, _| Ok(Some(target())));
        store
            .expect_find_many()
            .withf(|_, query| has_filter(query, CarField::Brand))
            .times(1)
            .returning(|_, _| Ok(vec![]));
        store
            .expect_find_many()
            .withf(|_, query| {
                query.filter
                    == Some(Filter::between(CarField::PricePerDay, 70.0, 130.0))
                    && query.limit == 2
                    && query.exclude_ids == vec![CarId::from("42"), CarId::from("1")]
            })
            .times(1)
            .returning(|_, _| Ok(vec![Car::new("8", "", "Fiat", 99.0)]));
        store
            .expect_find_many()
            .withf(|_, query| query.filter.is_none())
            .times(1)
            .returning(|_, _| Ok(vec![Car::new("9", "", "Fiat", 20.0)]));

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["1", "8", "9"]);
    }

    #[test]
    fn test_price_band_bounds_land_on_exact_cents() {
        assert_eq!(price_band(100.0), (70.0, 130.0));
        assert_eq!(price_band(25.40), (17.78, 33.02));
        assert_eq!(price_band(25.45), (17.815, 33.085));
    }

    #[tokio::test]
    async fn test_price_band_includes_car_at_upper_bound() {
        let store = MemoryStore::new(vec![
            Car::new("42", "Picanto", "Kia", 25.40).with_category("SUV"),
            Car::new("1", "Range Rover", "Land Rover", 500.0).with_category("SUV"),
            Car::new("3", "Up", "Volkswagen", 10.0),
            Car::new("2", "Sandero", "Dacia", 33.02),
        ]);

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_no_category_goes_straight_to_random_tier() {
        let mut store = MockRecordStore::new();
        store.expect_name().return_const("mock");
        store
            .expect_find_many()
            .withf(|_, query| {
                query.filter.is_none()
                    && query.limit == MAX_RELATED
                    && query.exclude_ids == vec![CarId::from("42")]
            })
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    Car::new("7", "", "Fiat", 40.0),
                    Car::new("8", "", "Kia", 60.0),
                    Car::new("9", "", "BMW", 200.0),
                ])
            });
        store.expect_find_one().times(0);

        let related = resolver(store).resolve(&id("42"), None).await;

        assert_eq!(ids(&related), vec!["7", "8", "9"]);
    }

    #[tokio::test]
    async fn test_blank_category_is_treated_as_missing() {
        let store = MemoryStore::new(vec![
            target(),
            Car::new("1", "", "Fiat", 40.0),
        ]);

        let related = resolver(store).resolve(&id("42"), Some("   ")).await;

        assert_eq!(ids(&related), vec!["1"]);
    }

    #[tokio::test]
    async fn test_store_with_only_target_is_empty() {
        let store = MemoryStore::new(vec![target()]);

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn test_random_tier_supplements_partial_results() {
        let store = MemoryStore::new(vec![
            target(),
            Car::new("1", "", "Kia", 500.0).with_category("SUV"),
            Car::new("2", "", "Fiat", 10.0),
        ]);

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_failing_tier_does_not_abort_cascade() {
        let mut store = MockRecordStore::new();
        store.expect_name().return_const("mock");
        store
            .expect_find_many()
            .withf(|_, query| has_filter(query, CarField::Category))
            .times(1)
            .returning(|_, _| Err(AppError::ExternalApi("connection reset".to_string())));
        store
            .expect_find_many()
            .withf(|_, query| query.filter.is_none())
            .times(1)
            .returning(|_, _| Ok(vec![Car::new("5", "", "Fiat", 40.0)]));

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["5"]);
    }

    #[tokio::test]
    async fn test_total_store_failure_yields_empty_set() {
        let mut store = MockRecordStore::new();
        store.expect_name().return_const("mock");
        store
            .expect_find_many()
            .returning(|_, _| Err(AppError::ExternalApi("store down".to_string())));
        store
            .expect_find_one()
            .returning(|_, _| Err(AppError::ExternalApi("store down".to_string())));

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn test_missing_target_skips_brand_and_price_tiers() {
        let mut store = MockRecordStore::new();
        store.expect_name().return_const("mock");
        store
            .expect_find_many()
            .withf(|_, query| has_filter(query, CarField::Category))
            .times(1)
            .returning(|_, _| Ok(vec![Car::new("1", "", "Kia", 80.0)]));
        store.expect_find_one().times(1).returning(|_, _| Ok(None));
        store
            .expect_find_many()
            .withf(|_, query| query.filter.is_none())
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    Car::new("2", "", "Fiat", 40.0),
                    Car::new("3", "", "Fiat", 40.0),
                ])
            });

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_misbehaving_store_cannot_break_invariants() {
        let mut store = MockRecordStore::new();
        store.expect_name().return_const("mock");
        store
            .expect_find_many()
            .withf(|_, query| has_filter(query, CarField::Category))
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    Car::new("42", "", "Toyota", 100.0),
                    Car::new("1", "", "Kia", 80.0),
                    Car::new("1", "", "Kia", 80.0),
                ])
            });
        store
            .expect_find_one()
            .times(1)
            .returning(|_, _| Ok(Some(Car::new("42", "", "", 0.0))));
        store
            .expect_find_many()
            .withf(|_, query| query.filter.is_none())
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    Car::new("1", "", "Kia", 80.0),
                    Car::new("2", "", "Fiat", 40.0),
                    Car::new("3", "", "Fiat", 40.0),
                    Car::new("4", "", "Fiat", 40.0),
                ])
            });

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_concrete_scenario() {
        let store = MemoryStore::new(vec![
            target(),
            Car::new("1", "", "", 0.0).with_category("SUV"),
            Car::new("2", "", "", 0.0).with_category("SUV"),
            Car::new("3", "", "", 0.0).with_category("SUV"),
            Car::new("4", "Hilux", "Toyota", 100.0),
        ]);

        let related = resolver(store).resolve(&id("42"), Some("SUV")).await;

        assert_eq!(ids(&related), vec!["1", "2", "3"]);
        assert!(!related.ids().contains(&&id("42")));
    }
}
