//! Product filtering against the current criteria

use crate::models::{FilterCriteria, Product};

/// Returns the products matching every active constraint in `criteria`.
///
/// Predicates run cheapest first: label membership, then the price range,
/// then the discount computation. Category and brand lists only constrain
/// when non-empty, and the discount predicate only when a threshold is set.
pub fn apply_filters(products: &[Product], criteria: &FilterCriteria) -> Vec<Product> {
    if products.is_empty() {
        return Vec::new();
    }

    products
        .iter()
        .filter(|p| criteria.categories.is_empty() || criteria.categories.contains(&p.category))
        .filter(|p| criteria.brands.is_empty() || criteria.brands.contains(&p.brand))
        .filter(|p| criteria.price_range.contains(p.price))
        .filter(|p| {
            criteria
                .discount_percent
                .is_none_or(|threshold| discount_percent(p) >= i64::from(threshold))
        })
        .cloned()
        .collect()
}

/// Discount of `discount_price` relative to `price`, rounded to a whole percent.
///
/// A zero (or otherwise unusable) price counts as no discount.
#[allow(clippy::cast_possible_truncation)]
pub fn discount_percent(product: &Product) -> i64 {
    if product.price <= 0.0 {
        return 0;
    }

    let percent = (100.0 * (product.price - product.discount_price) / product.price).round();
    if percent.is_finite() { percent as i64 } else { 0 }
}
