//! Local durable queue
//!
//! An ordered, bounded, crash-surviving sequence of envelopes. The in-memory
//! copy is authoritative for the process lifetime; every mutation snapshots
//! the whole queue into the state store. A failed persist is logged and the
//! queue keeps working in memory.
//!
//! Removal is id-keyed rather than a prefix truncate so envelopes enqueued
//! while a batch is in flight are never lost when that batch is acknowledged.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use beacon_core::Envelope;

use crate::state::{keys, StateStore};

/// Bounded FIFO queue of envelopes backed by a [`StateStore`]
pub struct DurableQueue {
    store: Arc<dyn StateStore>,
    entries: Mutex<VecDeque<Envelope>>,
    bound: usize,
}

impl DurableQueue {
    /// Load the queue from durable storage.
    ///
    /// A missing or unreadable snapshot starts the queue empty. A snapshot
    /// larger than `bound` is trimmed from the head (oldest first).
    pub fn load(store: Arc<dyn StateStore>, bound: usize) -> Self {
        let mut entries: VecDeque<Envelope> = match store.load(keys::QUEUE) {
            Ok(Some(snapshot)) => match serde_json::from_str::<Vec<Envelope>>(&snapshot) {
                Ok(envelopes) => envelopes.into(),
                Err(e) => {
                    tracing::warn!(error = %e, "Corrupt queue snapshot, starting empty");
                    VecDeque::new()
                }
            },
            Ok(None) => VecDeque::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load queue snapshot, starting empty");
                VecDeque::new()
            }
        };

        while entries.len() > bound {
            entries.pop_front();
        }

        if !entries.is_empty() {
            tracing::debug!(count = entries.len(), "Restored queued envelopes");
        }

        Self {
            store,
            entries: Mutex::new(entries),
            bound,
        }
    }

    /// Append an envelope at the tail, evicting from the head if the bound
    /// is exceeded. Returns the number of evicted envelopes.
    pub fn enqueue(&self, envelope: Envelope) -> usize {
        let mut entries = self.entries.lock().unwrap();
        entries.push_back(envelope);

        let mut evicted = 0;
        while entries.len() > self.bound {
            entries.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            tracing::warn!(evicted, bound = self.bound, "Queue full, evicted oldest envelopes");
        }

        self.persist(&entries);
        evicted
    }

    /// Return up to `n` oldest envelopes without removing them
    pub fn peek_batch(&self, n: usize) -> Vec<Envelope> {
        let entries = self.entries.lock().unwrap();
        entries.iter().take(n).cloned().collect()
    }

    /// Remove exactly the envelopes whose event ids are in `ids`
    pub fn remove_batch(&self, ids: &[String]) {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !ids.contains(&e.event_id));
        if entries.len() != before {
            self.persist(&entries);
        }
    }

    /// Current envelope count
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the whole queue into durable storage, best effort
    fn persist(&self, entries: &VecDeque<Envelope>) {
        let snapshot = match serde_json::to_string(&Vec::from_iter(entries.iter())) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize queue snapshot");
                return;
            }
        };
        if let Err(e) = self.store.store(keys::QUEUE, &snapshot) {
            tracing::warn!(error = %e, "Failed to persist queue, in-memory copy remains authoritative");
        }
    }
}
