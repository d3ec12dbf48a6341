use serde::Serialize;
use std::fmt::Display;

use super::{Car, CarId};

/// Car columns a record store query may filter on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CarField {
    Category,
    Brand,
    PricePerDay,
}

impl CarField {
    /// Column name in the `cars` table
    pub fn column(&self) -> &'static str {
        match self {
            CarField::Category => "category",
            CarField::Brand => "brand",
            CarField::PricePerDay => "price_per_day",
        }
    }
}

impl Display for CarField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(f64),
}

impl Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterValue::Text(text) => write!(f, "{}", text),
            FilterValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

/// A single predicate over one car column
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field = value`
    Eq { field: CarField, value: FilterValue },
    /// `low <= field <= high`
    Between { field: CarField, low: f64, high: f64 },
}

impl Filter {
    pub fn eq(field: CarField, value: impl Into<FilterValue>) -> Self {
        Filter::Eq {
            field,
            value: value.into(),
        }
    }

    /// Inclusive range, bounds are swapped if given in the wrong order
    pub fn between(field: CarField, low: f64, high: f64) -> Self {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Filter::Between { field, low, high }
    }

    pub fn field(&self) -> CarField {
        match self {
            Filter::Eq { field, .. } | Filter::Between { field, .. } => *field,
        }
    }

    /// Evaluates the predicate against an in-memory car
    pub fn matches(&self, car: &Car) -> bool {
        match self {
            Filter::Eq { field, value } => match (field, value) {
                (CarField::Category, FilterValue::Text(v)) => car.category.as_deref() == Some(v),
                (CarField::Brand, FilterValue::Text(v)) => car.brand == *v,
                (CarField::PricePerDay, FilterValue::Number(v)) => car.price_per_day == *v,
                _ => false,
            },
            Filter::Between { field, low, high } => match field {
                CarField::PricePerDay => *low <= car.price_per_day && car.price_per_day <= *high,
                _ => false,
            },
        }
    }
}

/// Arguments of a `find_many` call
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub limit: usize,
    pub exclude_ids: Vec<CarId>,
}

impl Query {
    pub fn new(limit: usize) -> Self {
        Self {
            filter: None,
            limit,
            exclude_ids: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = CarId>) -> Self {
        self.exclude_ids.extend(ids);
        self
    }

    /// Whether a car passes both the filter and the exclusion list
    pub fn accepts(&self, car: &Car) -> bool {
        !self.exclude_ids.contains(&car.id)
            && self.filter.as_ref().map_or(true, |f| f.matches(car))
    }
}
