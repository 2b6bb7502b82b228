//! In-memory browser location with session history

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use crate::traits::QueryStore;
use crate::url_sync::QueryParams;

/// Payload-free "navigation completed" notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationEnd;

/// One visited query string
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub params: QueryParams,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug)]
struct History {
    entries: Vec<HistoryEntry>,
    cursor: usize,
}

impl History {
    fn current(&self) -> &HistoryEntry {
        &self.entries[self.cursor]
    }

    /// Returns `false` when `params` is already the current entry.
    fn push(&mut self, params: QueryParams) -> bool {
        if self.current().params == params {
            return false;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(HistoryEntry {
            params,
            recorded_at: Utc::now(),
        });
        self.cursor = self.entries.len() - 1;
        true
    }
}

/// Query-parameter store backed by a session history.
///
/// Writes coming from the filter engine go through [`QueryStore::replace`]
/// and never emit [`NavigationEnd`], so the engine does not read back its own
/// writes. User navigation (`navigate`, `back`, `forward`) does emit it.
#[derive(Debug)]
pub struct MemoryLocation {
    history: Mutex<History>,
    navigation: broadcast::Sender<NavigationEnd>,
}

impl MemoryLocation {
    pub fn new(initial: QueryParams) -> Self {
        let (navigation, _) = broadcast::channel(16);
        Self {
            history: Mutex::new(History {
                entries: vec![HistoryEntry {
                    params: initial,
                    recorded_at: Utc::now(),
                }],
                cursor: 0,
            }),
            navigation,
        }
    }

    /// Subscribes to navigation-completed notifications
    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEnd> {
        self.navigation.subscribe()
    }

    /// Navigates to `params` as if the user edited the address bar.
    pub fn navigate(&self, params: QueryParams) {
        self.lock().push(params);
        self.notify();
    }

    /// Steps back one history entry. Returns `false` at the oldest entry.
    pub fn back(&self) -> bool {
        let moved = {
            let mut history = self.lock();
            if history.cursor == 0 {
                false
            } else {
                history.cursor -= 1;
                true
            }
        };
        if moved {
            self.notify();
        }
        moved
    }

    /// Steps forward one history entry. Returns `false` at the newest entry.
    pub fn forward(&self) -> bool {
        let moved = {
            let mut history = self.lock();
            if history.cursor + 1 >= history.entries.len() {
                false
            } else {
                history.cursor += 1;
                true
            }
        };
        if moved {
            self.notify();
        }
        moved
    }

    /// Current query string, `""` when there are no parameters.
    pub fn href(&self) -> String {
        self.lock().current().params.to_string()
    }

    pub fn history_len(&self) -> usize {
        self.lock().entries.len()
    }

    /// When the current entry was recorded.
    pub fn current_since(&self) -> DateTime<Utc> {
        self.lock().current().recorded_at
    }

    fn notify(&self) {
        // No subscribers is fine: nothing is listening yet.
        let _ = self.navigation.send(NavigationEnd);
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueryStore for MemoryLocation {
    fn query(&self) -> QueryParams {
        self.lock().current().params.clone()
    }

    fn replace(&self, params: QueryParams) {
        if self.lock().push(params) {
            debug!("Location updated to '{}'", self.href());
        }
    }
}
