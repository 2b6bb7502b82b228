//! Event loop that owns a [`CatalogFilter`] and feeds it events in order
//!
//! All engine work happens on one task: catalog changes, navigation
//! notifications, user actions and coalescing deadlines are awaited in a
//! single `select!`, so the engine never needs a lock. Catalog changes are
//! polled before navigation so activation always precedes a URL re-read.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::catalog_filter::{CatalogFilter, EngineOptions, FilterAction, Phase};
use crate::models::{DerivedOptions, FilterCriteria};
use crate::store::Catalog;
use crate::traits::{QueryStore, ResultSink};
use crate::url_sync::QueryParams;
use crate::url_sync::location::NavigationEnd;

/// What a sidebar needs to render the engine's current state
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub phase: Phase,
    pub criteria: FilterCriteria,
    pub options: DerivedOptions,
    pub query: QueryParams,
}

enum Command {
    Action(FilterAction),
    Snapshot(oneshot::Sender<EngineSnapshot>),
}

/// Handle to a running filter engine task
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Spawns the engine loop.
///
/// The current catalog is applied before the first event is awaited, so a
/// store that was filled before the engine started still activates it.
pub fn spawn(
    mut products: watch::Receiver<Catalog>,
    mut navigation: broadcast::Receiver<NavigationEnd>,
    location: Arc<dyn QueryStore>,
    sink: impl ResultSink + 'static,
    options: EngineOptions,
) -> EngineHandle {
    let (commands, mut command_rx) = mpsc::unbounded_channel();
    let shutdown = Arc::new(Notify::new());
    let stop = shutdown.clone();

    let task = tokio::spawn(async move {
        let mut engine = CatalogFilter::new(location, Box::new(sink), options);
        let initial = products.borrow_and_update().clone();
        engine.products_changed(initial);

        let mut products_open = true;
        let mut navigation_open = true;

        info!("Filter engine started");

        loop {
            let deadline = engine.next_deadline();

            tokio::select! {
                biased;

                () = stop.notified() => break,

                changed = products.changed(), if products_open => match changed {
                    Ok(()) => {
                        let catalog = products.borrow_and_update().clone();
                        engine.products_changed(catalog);
                    }
                    Err(_) => {
                        debug!("Product store dropped - no further catalog updates");
                        products_open = false;
                    }
                },

                event = navigation.recv(), if navigation_open => match event {
                    Ok(NavigationEnd) => engine.navigation_completed(),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Skipped {} navigation events", skipped);
                        engine.navigation_completed();
                    }
                    Err(RecvError::Closed) => {
                        debug!("Navigation source closed");
                        navigation_open = false;
                    }
                },

                command = command_rx.recv() => match command {
                    Some(Command::Action(action)) => engine.handle(action, Instant::now()),
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(EngineSnapshot {
                            phase: engine.phase(),
                            criteria: engine.criteria().clone(),
                            options: engine.options().clone(),
                            query: engine.query(),
                        });
                    }
                    None => break,
                },

                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    engine.fire_due(Instant::now());
                }
            }
        }

        engine.close();
    });

    EngineHandle {
        commands,
        shutdown,
        task,
    }
}

impl EngineHandle {
    /// Queues a user action. Returns `false` once the engine has stopped.
    pub fn send(&self, action: FilterAction) -> bool {
        let sent = self.commands.send(Command::Action(action)).is_ok();
        if !sent {
            warn!("Filter engine stopped - action dropped");
        }
        sent
    }

    /// Current engine state, `None` once the engine has stopped.
    pub async fn snapshot(&self) -> Option<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Snapshot(reply)).ok()?;
        rx.await.ok()
    }

    /// Stops the loop, dropping pending commits and all subscriptions.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            warn!("Filter engine task ended abnormally: {}", e);
        }
    }
}
