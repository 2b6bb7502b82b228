use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod catalog_filter;
mod coalescer;
mod config;
mod console;
mod filter;
mod models;
mod options;
mod runtime;
mod store;
mod traits;
mod url_sync;

use config::Config;
use console::ConsoleCommand;
use models::Product;
use runtime::EngineHandle;
use store::{HttpProductSource, ProductStore};
use url_sync::location::MemoryLocation;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Starting catalog filter against {}", config.api_url);

    let store = Arc::new(ProductStore::new(Arc::new(HttpProductSource::new(&config.api_url)?)));
    let location = Arc::new(MemoryLocation::new(config.initial_query.clone()));
    let (results_tx, mut results) = mpsc::unbounded_channel();

    let engine = runtime::spawn(
        store.subscribe(),
        location.subscribe(),
        location.clone(),
        results_tx,
        config.engine,
    );

    if let Err(e) = store.refresh().await {
        error!("Error during initial catalog fetch: {}", e);
    }

    let mut sched = match &config.refresh_schedule {
        Some(schedule) => Some(schedule_refresh(schedule, store.clone()).await?),
        None => None,
    };

    info!("Type 'show' for the current filters, 'quit' to exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(filtered) = results.recv() => report(&filtered, &location),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match console::parse_command(&line) {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => execute(command, &engine, &location, &store).await,
                    Err(e) => warn!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down");
    if let Some(sched) = sched.as_mut()
        && let Err(e) = sched.shutdown().await
    {
        error!("Error stopping refresh scheduler: {}", e);
    }
    engine.shutdown().await;

    Ok(())
}

async fn schedule_refresh(schedule: &str, store: Arc<ProductStore>) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await?;

    sched
        .add(Job::new_async(schedule, move |_uuid, _l| {
            let store = store.clone();
            Box::pin(async move {
                if let Err(e) = store.refresh().await {
                    error!("Error refreshing catalog: {}", e);
                }
            })
        })?)
        .await?;

    sched.start().await?;
    info!("Catalog refresh scheduled with '{}'", schedule);

    Ok(sched)
}

async fn execute(
    command: ConsoleCommand,
    engine: &EngineHandle,
    location: &MemoryLocation,
    store: &ProductStore,
) {
    match command {
        ConsoleCommand::Filter(action) => {
            engine.send(action);
        }
        ConsoleCommand::Navigate(params) => location.navigate(params),
        ConsoleCommand::Back => {
            if !location.back() {
                info!("Already at the first history entry");
            }
        }
        ConsoleCommand::Forward => {
            if !location.forward() {
                info!("Already at the latest history entry");
            }
        }
        ConsoleCommand::Show => show(engine, location, store).await,
        ConsoleCommand::Quit => {}
    }
}

async fn show(engine: &EngineHandle, location: &MemoryLocation, store: &ProductStore) {
    let Some(snapshot) = engine.snapshot().await else {
        warn!("Filter engine is not running");
        return;
    };

    let fetched = store
        .fetched_at()
        .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
    info!(
        "Catalog: {} products (fetched {}), filters {:?}",
        store.current().len(),
        fetched,
        snapshot.phase
    );
    info!("Categories: {}", snapshot.options.categories.join(", "));
    info!("Brands: {}", snapshot.options.brands.join(", "));
    info!(
        "Price bounds: {}..={}, discount buckets: {:?}",
        snapshot.options.price_bounds.min, snapshot.options.price_bounds.max, snapshot.options.discount_buckets
    );
    info!("Selected: {:?}", snapshot.criteria);
    info!(
        "Location: '{}' since {} ({} history entries)",
        snapshot.query,
        location.current_since().to_rfc3339(),
        location.history_len()
    );
}

fn report(filtered: &[Product], location: &MemoryLocation) {
    info!("{} products match '{}'", filtered.len(), location.href());
    for product in filtered {
        info!(
            "  #{} {} [{} / {}] {} (now {}, {}% off) {} sizes {} - {}",
            product.id,
            product.name,
            product.category,
            product.brand,
            product.price,
            product.discount_price,
            filter::discount_percent(product),
            product.color,
            product.sizes.join("/"),
            product.image
        );
    }
}
