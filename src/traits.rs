//! Seams between the filter engine and its collaborators

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::Product;
use crate::url_sync::QueryParams;

/// Source of the authoritative product collection
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Fetch every product in the catalog
    ///
    /// # Returns
    /// * `Result<Vec<Product>>` - The full catalog or a transport/decoding error
    async fn fetch_all_products(&self) -> Result<Vec<Product>>;
}

/// Readable and replaceable query-parameter store of the current location
pub trait QueryStore: Send + Sync {
    /// Parameters of the current location
    fn query(&self) -> QueryParams;

    /// Replaces the whole parameter set. Keys not in `params` are dropped.
    fn replace(&self, params: QueryParams);
}

/// Receiver of every recomputed filter result
pub trait ResultSink: Send {
    fn emit(&mut self, products: Vec<Product>);
}

impl ResultSink for mpsc::UnboundedSender<Vec<Product>> {
    fn emit(&mut self, products: Vec<Product>) {
        if self.send(products).is_err() {
            warn!("Filtered product receiver dropped - result discarded");
        }
    }
}
