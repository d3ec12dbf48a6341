use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;

/// Opaque identifier of a car row
///
/// Hosted tables hand ids out either as integers or as UUID strings, so both
/// are accepted on input and the id is always carried as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CarId(String);

impl CarId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CarId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CarId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for CarId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for CarId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Int(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(id) => CarId(id),
            RawId::Int(id) => CarId(id.to_string()),
        })
    }
}

/// A car listing as stored in the `cars` table
///
/// Only the columns the recommendation logic looks at are typed. Everything
/// else (images, specs, descriptions) rides along in `details` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: String,
    #[serde(default, deserialize_with = "nullable_rate")]
    pub price_per_day: f64,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

fn nullable_rate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

impl Car {
    /// Creates a car with no category and no extra details
    pub fn new(
        id: impl Into<CarId>,
        name: impl Into<String>,
        brand: impl Into<String>,
        price_per_day: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
            brand: brand.into(),
            price_per_day,
            details: Map::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// A zero or non-finite rate marks a listing without a published price
    pub fn has_known_price(&self) -> bool {
        self.price_per_day.is_finite() && self.price_per_day > 0.0
    }
}
