//! Batch scheduler
//!
//! Pulls batches off the durable queue and hands them to the retry
//! transport. Flushes are triggered by a periodic timer, a lifecycle
//! transition, or the queue reaching the batch threshold; a trigger that
//! arrives while a flush is in progress is coalesced into a no-op, and the
//! next scheduled trigger picks up any remaining work.
//!
//! Acknowledged event ids (inserted, duplicate, or validation-dropped
//! server-side) are removed from the queue; a retryable failure leaves the
//! batch queued; a terminal failure drops the batch and fires the
//! observability hook.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use beacon_core::IngestResponse;

use crate::queue::DurableQueue;
use crate::transport::{BatchSender, Outcome, RetryTransport};

/// Host lifecycle transition, supplied by the embedding environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Foreground,
    Background,
}

/// Result of one flush pass
#[derive(Debug)]
pub enum FlushResult {
    /// Queue was empty
    Idle,
    /// Another flush was already in progress; this trigger was coalesced
    Coalesced,
    /// Batch acknowledged and removed from the queue
    Delivered(IngestResponse),
    /// Retryable failure; batch left queued for a future trigger
    Deferred,
    /// Terminal failure; batch dropped from the queue
    Dropped(usize),
}

/// Called when a batch is dropped on a terminal failure: (count, reason)
pub type DropHook = Box<dyn Fn(usize, &str) + Send + Sync>;

/// Queue-to-transport pump with a single-flight guard
pub struct Pipeline<S> {
    queue: Arc<DurableQueue>,
    transport: RetryTransport<S>,
    batch_size: usize,
    flushing: AtomicBool,
    on_drop: Option<DropHook>,
}

impl<S: BatchSender> Pipeline<S> {
    pub fn new(
        queue: Arc<DurableQueue>,
        transport: RetryTransport<S>,
        batch_size: usize,
        on_drop: Option<DropHook>,
    ) -> Self {
        Self {
            queue,
            transport,
            batch_size,
            flushing: AtomicBool::new(false),
            on_drop,
        }
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    /// True once the queue has a full batch waiting
    pub fn batch_ready(&self) -> bool {
        self.queue.len() >= self.batch_size
    }

    /// Run one flush pass.
    ///
    /// At most one flush executes at a time; overlapping triggers return
    /// [`FlushResult::Coalesced`] without queueing.
    pub async fn flush(&self) -> FlushResult {
        if self.flushing.swap(true, Ordering::SeqCst) {
            return FlushResult::Coalesced;
        }

        let result = self.flush_locked().await;
        self.flushing.store(false, Ordering::SeqCst);
        result
    }

    async fn flush_locked(&self) -> FlushResult {
        let batch = self.queue.peek_batch(self.batch_size);
        if batch.is_empty() {
            return FlushResult::Idle;
        }

        let ids: Vec<String> = batch.iter().map(|e| e.event_id.clone()).collect();

        match self.transport.deliver(&batch).await {
            Outcome::Delivered(counts) => {
                // Inserted, duplicate, and validation-dropped are all
                // terminal-good from the client's perspective
                self.queue.remove_batch(&ids);
                tracing::debug!(
                    sent = ids.len(),
                    inserted = counts.inserted,
                    duplicates = counts.duplicates,
                    dropped = counts.dropped,
                    "Batch acknowledged"
                );
                FlushResult::Delivered(counts)
            }
            Outcome::Retryable(reason) => {
                tracing::warn!(queued = ids.len(), %reason, "Delivery deferred, batch stays queued");
                FlushResult::Deferred
            }
            Outcome::Terminal(reason) => {
                self.queue.remove_batch(&ids);
                tracing::error!(dropped = ids.len(), %reason, "Terminal delivery failure, batch dropped");
                if let Some(hook) = &self.on_drop {
                    hook(ids.len(), &reason);
                }
                FlushResult::Dropped(ids.len())
            }
        }
    }
}
