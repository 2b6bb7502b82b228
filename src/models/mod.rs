//! Data models for catalog products and filter selections

use serde::{Deserialize, Serialize};

/// Discount thresholds offered to the user, in percent.
pub const DISCOUNT_BUCKETS: [u32; 5] = [10, 20, 30, 40, 50];

/// A product as served by the catalog API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub category: String,
    pub brand: String,
    pub price: f64,
    pub discount_price: f64,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub image: String,
}

/// Inclusive price interval selected on the slider
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Swaps reversed endpoints so that `min <= max`.
    #[must_use]
    pub fn normalized(self) -> Self {
        if self.min > self.max {
            Self::new(self.max, self.min)
        } else {
            self
        }
    }

    /// Normalizes and then pulls both endpoints into `bounds`.
    #[must_use]
    pub fn clamped_to(self, bounds: Self) -> Self {
        let range = self.normalized();
        Self::new(
            range.min.clamp(bounds.min, bounds.max),
            range.max.clamp(bounds.min, bounds.max),
        )
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

/// The user's current selections.
///
/// Label lists keep insertion order so a sidebar can render them in the
/// order they were picked; membership is what matters for filtering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterCriteria {
    pub categories: Vec<String>,
    pub brands: Vec<String>,
    pub price_range: PriceRange,
    pub discount_percent: Option<u32>,
}

impl FilterCriteria {
    /// Criteria with no label or discount constraint and the given price range.
    pub fn unconstrained(price_range: PriceRange) -> Self {
        Self {
            price_range,
            ..Self::default()
        }
    }
}

/// Filter options computed from the live product collection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DerivedOptions {
    pub categories: Vec<String>,
    pub brands: Vec<String>,
    pub price_bounds: PriceRange,
    pub discount_buckets: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_decodes_from_api_json() {
        let json = r#"{
            "id": 7,
            "name": "Runner",
            "category": "Shoes",
            "brand": "A",
            "price": 100,
            "discount_price": 80,
            "sizes": ["8", "9"],
            "color": "red",
            "image": "runner.png"
        }"#;

        let product: Product = serde_json::from_str(json).unwrap();
        assert_eq!(product.id, 7);
        assert_eq!(product.discount_price, 80.0);
        assert_eq!(product.sizes, vec!["8", "9"]);
    }

    #[test]
    fn clamping_swaps_and_bounds_endpoints() {
        let bounds = PriceRange::new(10.0, 200.0);
        let range = PriceRange::new(500.0, 5.0).clamped_to(bounds);
        assert_eq!(range, PriceRange::new(10.0, 200.0));

        let inside = PriceRange::new(20.0, 50.0).clamped_to(bounds);
        assert_eq!(inside, PriceRange::new(20.0, 50.0));
    }

    #[test]
    fn range_is_inclusive() {
        let range = PriceRange::new(50.0, 100.0);
        assert!(range.contains(50.0));
        assert!(range.contains(100.0));
        assert!(!range.contains(100.01));
    }
}
