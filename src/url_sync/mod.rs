//! Two-way mapping between filter criteria and the location's query string
//!
//! The query representation is deliberately minimal: a key is only written
//! when its filter actually constrains the catalog, and reading an absent
//! key restores the unconstrained value.
//!
//! | key               | value                          |
//! |-------------------|--------------------------------|
//! | `category`        | comma-joined category labels   |
//! | `brand`           | comma-joined brand labels      |
//! | `minPrice`        | decimal lower price bound      |
//! | `maxPrice`        | decimal upper price bound      |
//! | `discountPercent` | integer discount threshold     |

pub mod location;

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::debug;

use crate::models::{DISCOUNT_BUCKETS, FilterCriteria, PriceRange};

pub const CATEGORY_KEY: &str = "category";
pub const BRAND_KEY: &str = "brand";
pub const MIN_PRICE_KEY: &str = "minPrice";
pub const MAX_PRICE_KEY: &str = "maxPrice";
pub const DISCOUNT_KEY: &str = "discountPercent";

/// Ordered query parameters of a location
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `?a=1&b=2` (leading `?` optional).
    ///
    /// Values are percent-decoded and `+` is read as a space. Pairs that fail
    /// to decode are skipped; a repeated key keeps its last value.
    pub fn parse(query: &str) -> Self {
        let mut params = Self::new();
        let query = query.trim().trim_start_matches('?');

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let (Ok(key), Ok(value)) = (decode(key), decode(value)) else {
                continue;
            };
            params.set(key, value);
        }

        params
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{}={}", urlencoding::encode(key), urlencoding::encode(value))?;
        }
        Ok(())
    }
}

fn decode(raw: &str) -> Result<String, std::string::FromUtf8Error> {
    urlencoding::decode(&raw.replace('+', " ")).map(std::borrow::Cow::into_owned)
}

/// What a missing `minPrice`/`maxPrice` key falls back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceFallback {
    /// Keep the in-session range endpoint, using the global bound only when
    /// that endpoint is zero. Existing shared URLs rely on this.
    #[default]
    CurrentRange,
    /// Always reset to the global bound derived from the catalog.
    GlobalBounds,
}

impl FromStr for PriceFallback {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" => Ok(Self::CurrentRange),
            "global" => Ok(Self::GlobalBounds),
            other => Err(anyhow!("Unknown price fallback mode: {other}")),
        }
    }
}

/// Rebuilds criteria from `params`.
///
/// Label keys that are absent mean "no constraint". Price keys that are
/// absent or malformed fall back according to `fallback`, and the resulting
/// range is clamped into `bounds`. A malformed discount is treated as unset.
pub fn read_criteria(
    params: &QueryParams,
    current: &FilterCriteria,
    bounds: PriceRange,
    fallback: PriceFallback,
) -> FilterCriteria {
    let min = parse_price(params.get(MIN_PRICE_KEY))
        .unwrap_or_else(|| fallback_endpoint(current.price_range.min, bounds.min, fallback));
    let max = parse_price(params.get(MAX_PRICE_KEY))
        .unwrap_or_else(|| fallback_endpoint(current.price_range.max, bounds.max, fallback));

    FilterCriteria {
        categories: parse_labels(params.get(CATEGORY_KEY)),
        brands: parse_labels(params.get(BRAND_KEY)),
        price_range: PriceRange::new(min, max).clamped_to(bounds),
        discount_percent: parse_discount(params.get(DISCOUNT_KEY)),
    }
}

/// Renders `criteria` as the full replacement query for the location.
///
/// Price endpoints equal to `bounds` are left out so an unconstrained
/// catalog produces an empty query.
pub fn write_criteria(criteria: &FilterCriteria, bounds: PriceRange) -> QueryParams {
    let mut params = QueryParams::new();

    if !criteria.categories.is_empty() {
        params.set(CATEGORY_KEY, criteria.categories.join(","));
    }
    if !criteria.brands.is_empty() {
        params.set(BRAND_KEY, criteria.brands.join(","));
    }
    if criteria.price_range.min != bounds.min {
        params.set(MIN_PRICE_KEY, criteria.price_range.min.to_string());
    }
    if criteria.price_range.max != bounds.max {
        params.set(MAX_PRICE_KEY, criteria.price_range.max.to_string());
    }
    if let Some(percent) = criteria.discount_percent {
        params.set(DISCOUNT_KEY, percent.to_string());
    }

    params
}

fn parse_labels(value: Option<&str>) -> Vec<String> {
    let mut labels = Vec::<String>::new();
    for label in value.unwrap_or_default().split(',').filter(|l| !l.is_empty()) {
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
    labels
}

fn parse_price(value: Option<&str>) -> Option<f64> {
    value?.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Whole, non-negative numbers only; `20.0` reads as 20.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_discount(value: Option<&str>) -> Option<u32> {
    let raw = value?.trim();
    let number = raw
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0 && n.fract() == 0.0 && *n <= f64::from(u32::MAX));
    let Some(number) = number else {
        debug!("Ignoring malformed {} '{}'", DISCOUNT_KEY, raw);
        return None;
    };

    let percent = number as u32;
    if !DISCOUNT_BUCKETS.contains(&percent) {
        debug!("{} {} is not one of the offered buckets", DISCOUNT_KEY, percent);
    }
    Some(percent)
}

fn fallback_endpoint(current: f64, bound: f64, fallback: PriceFallback) -> f64 {
    match fallback {
        PriceFallback::CurrentRange if current != 0.0 && current.is_finite() => current,
        _ => bound,
    }
}
