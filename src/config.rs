//! Environment-driven configuration
//!
//! | variable                   | default   | meaning                                  |
//! |----------------------------|-----------|------------------------------------------|
//! | `CATALOG_API_URL`          | required  | API base, products at `{base}/products`  |
//! | `CATALOG_REFRESH_SCHEDULE` | none      | cron expression for catalog re-fetching  |
//! | `CATALOG_INITIAL_QUERY`    | empty     | query string the session starts on       |
//! | `CATALOG_PRICE_WINDOW_MS`  | `300`     | price slider coalescing window           |
//! | `CATALOG_FILTER_WINDOW_MS` | `100`     | label/discount coalescing window         |
//! | `CATALOG_PRICE_FALLBACK`   | `current` | `current` or `global`, see [`PriceFallback`] |

use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::catalog_filter::EngineOptions;
use crate::url_sync::{PriceFallback, QueryParams};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub refresh_schedule: Option<String>,
    pub initial_query: QueryParams,
    pub engine: EngineOptions,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = get("CATALOG_API_URL").ok_or_else(|| anyhow!("CATALOG_API_URL must be set"))?;

        let defaults = EngineOptions::default();
        let engine = EngineOptions {
            price_window: window(get("CATALOG_PRICE_WINDOW_MS"), "CATALOG_PRICE_WINDOW_MS")?
                .unwrap_or(defaults.price_window),
            filter_window: window(get("CATALOG_FILTER_WINDOW_MS"), "CATALOG_FILTER_WINDOW_MS")?
                .unwrap_or(defaults.filter_window),
            price_fallback: get("CATALOG_PRICE_FALLBACK")
                .map(|v| v.parse())
                .transpose()
                .context("Invalid CATALOG_PRICE_FALLBACK")?
                .unwrap_or(defaults.price_fallback),
        };

        Ok(Self {
            api_url,
            refresh_schedule: get("CATALOG_REFRESH_SCHEDULE"),
            initial_query: get("CATALOG_INITIAL_QUERY")
                .map(|q| QueryParams::parse(&q))
                .unwrap_or_default(),
            engine,
        })
    }
}

fn window(value: Option<String>, key: &str) -> Result<Option<Duration>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .with_context(|| format!("{key} must be a whole number of milliseconds, got '{v}'"))
        })
        .transpose()
}
