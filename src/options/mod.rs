//! Filter options derived from the product collection

use crate::models::{DISCOUNT_BUCKETS, DerivedOptions, PriceRange, Product};

/// Computes the option sets a sidebar offers for `products`.
///
/// Labels are distinct and kept in first-seen order. Price bounds are the
/// minimum and maximum product price, or `0..=0` for an empty collection.
pub fn derive_options(products: &[Product]) -> DerivedOptions {
    DerivedOptions {
        categories: distinct(products.iter().map(|p| p.category.as_str())),
        brands: distinct(products.iter().map(|p| p.brand.as_str())),
        price_bounds: price_bounds(products),
        discount_buckets: DISCOUNT_BUCKETS.to_vec(),
    }
}

pub fn price_bounds(products: &[Product]) -> PriceRange {
    let mut prices = products.iter().map(|p| p.price);
    let Some(first) = prices.next() else {
        return PriceRange::default();
    };

    prices.fold(PriceRange::new(first, first), |range, price| {
        PriceRange::new(range.min.min(price), range.max.max(price))
    })
}

fn distinct<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    for label in labels {
        if !seen.iter().any(|s| s == label) {
            seen.push(label.to_string());
        }
    }
    seen
}
