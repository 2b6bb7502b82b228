//! Product store: the catalog fetched from the API, published as a watch cell

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::watch;
use tracing::info;

use crate::models::Product;
use crate::traits::ProductSource;

/// Read-only view of the current product collection
pub type Catalog = Arc<Vec<Product>>;

/// Fetches the catalog from `{base_url}/products`
pub struct HttpProductSource {
    client: Client,
    products_url: String,
}

impl HttpProductSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("catalog-filter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            products_url: format!("{}/products", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ProductSource for HttpProductSource {
    fn name(&self) -> &str {
        &self.products_url
    }

    async fn fetch_all_products(&self) -> Result<Vec<Product>> {
        let response = self.client.get(&self.products_url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to fetch products from {}: {}",
                self.products_url,
                response.status()
            ));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .with_context(|| format!("Malformed product list from {}", self.products_url))
    }
}

/// Owner of the authoritative product collection.
///
/// Subscribers get a [`watch::Receiver`] and are woken on every refresh.
/// A failed refresh leaves the published collection untouched.
pub struct ProductStore {
    source: Arc<dyn ProductSource>,
    products: watch::Sender<Catalog>,
    fetched_at: watch::Sender<Option<DateTime<Utc>>>,
}

impl ProductStore {
    pub fn new(source: Arc<dyn ProductSource>) -> Self {
        Self {
            source,
            products: watch::Sender::new(Arc::default()),
            fetched_at: watch::Sender::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Catalog> {
        self.products.subscribe()
    }

    pub fn current(&self) -> Catalog {
        self.products.borrow().clone()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        *self.fetched_at.borrow()
    }

    /// Fetches the catalog and publishes it. Returns the product count.
    pub async fn refresh(&self) -> Result<usize> {
        info!("Fetching products from {}", self.source.name());

        let products = self.source.fetch_all_products().await?;
        let count = products.len();

        self.products.send_replace(Arc::new(products));
        self.fetched_at.send_replace(Some(Utc::now()));

        info!("Catalog refreshed with {} products", count);
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::filter::tests::product;

    /// Source that serves queued responses in order
    pub(crate) struct FixtureSource {
        responses: Mutex<Vec<Result<Vec<Product>>>>,
    }

    impl FixtureSource {
        pub(crate) fn new(mut responses: Vec<Result<Vec<Product>>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl ProductSource for FixtureSource {
        fn name(&self) -> &str {
            "fixture"
        }

        async fn fetch_all_products(&self) -> Result<Vec<Product>> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no more fixture responses")))
        }
    }

    #[tokio::test]
    async fn refresh_publishes_to_subscribers() {
        let store = ProductStore::new(FixtureSource::new(vec![Ok(vec![
            product(1, "Shoes", "A", 100.0, 80.0),
        ])]));
        let mut cell = store.subscribe();
        assert!(store.fetched_at().is_none());

        assert_eq!(store.refresh().await.unwrap(), 1);
        assert!(cell.has_changed().unwrap());
        assert_eq!(cell.borrow_and_update().len(), 1);
        assert!(store.fetched_at().is_some());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_previous_catalog() {
        let store = ProductStore::new(FixtureSource::new(vec![
            Ok(vec![product(1, "Shoes", "A", 100.0, 80.0)]),
            Err(anyhow::anyhow!("connection reset")),
        ]));
        let mut cell = store.subscribe();

        store.refresh().await.unwrap();
        cell.borrow_and_update();

        assert!(store.refresh().await.is_err());
        assert!(!cell.has_changed().unwrap());
        assert_eq!(store.current().len(), 1);
    }

    #[test]
    fn products_url_joins_base_without_double_slash() {
        let source = HttpProductSource::new("http://localhost:3000/").unwrap();
        assert_eq!(source.name(), "http://localhost:3000/products");
    }

    #[test]
    fn api_payload_decodes_into_products() {
        let body = r#"[
            {"id": 1, "name": "Runner", "category": "Shoes", "brand": "A", "price": 100,
             "discount_price": 80, "sizes": ["9"], "color": "red", "image": "a.png"},
            {"id": 2, "name": "Tee", "category": "Shirts", "brand": "B", "price": 50,
             "discount_price": 50, "sizes": [], "color": "white", "image": "b.png"}
        ]"#;

        let products: Vec<Product> = serde_json::from_str(body).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[1].category, "Shirts");
    }
}
