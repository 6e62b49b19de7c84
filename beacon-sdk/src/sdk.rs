//! Process-wide SDK facade
//!
//! One `Beacon` instance per process, created with an explicit
//! [`Beacon::init`] and torn down with [`Beacon::shutdown`]. All ambient
//! context (session, identity, screen) lives behind this instance; call
//! sites hand over an event name and properties and the SDK does the rest.
//!
//! Nothing here can fail the host app: delivery problems degrade to "keep
//! data queued" or "drop and count", and durable-state problems degrade to
//! in-memory operation.

use std::sync::{Arc, Mutex};

use beacon_core::envelope::EventContext;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::builder::EnvelopeBuilder;
use crate::config::SdkConfig;
use crate::error::Result;
use crate::queue::DurableQueue;
use crate::scheduler::{DropHook, FlushResult, LifecycleEvent, Pipeline};
use crate::session::SessionState;
use crate::state::StateStore;
use crate::transport::{BatchSender, HttpSender, RetryTransport};

struct Inner<S> {
    pipeline: Pipeline<S>,
    builder: EnvelopeBuilder,
    session: Mutex<SessionState>,
    ambient: Mutex<EventContext>,
}

/// The Beacon telemetry client
///
/// Cheap to clone; all clones share the same pipeline and state.
pub struct Beacon<S: BatchSender = HttpSender> {
    inner: Arc<Inner<S>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<S: BatchSender> Clone for Beacon<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

impl Beacon<HttpSender> {
    /// Initialize the SDK with the default HTTP transport.
    ///
    /// `lifecycle` is the host-supplied subscription for foreground and
    /// background transitions; `on_drop` is invoked when a batch is dropped
    /// on a terminal delivery failure. Must be called inside a tokio
    /// runtime.
    pub fn init(
        config: SdkConfig,
        store: Arc<dyn StateStore>,
        lifecycle: mpsc::Receiver<LifecycleEvent>,
        on_drop: Option<DropHook>,
    ) -> Result<Self> {
        let sender = HttpSender::new(&config)?;
        Self::init_with_sender(config, store, lifecycle, sender, on_drop)
    }
}

impl<S: BatchSender + 'static> Beacon<S> {
    /// Initialize the SDK with a custom batch sender (used by tests)
    pub fn init_with_sender(
        config: SdkConfig,
        store: Arc<dyn StateStore>,
        lifecycle: mpsc::Receiver<LifecycleEvent>,
        sender: S,
        on_drop: Option<DropHook>,
    ) -> Result<Self> {
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let queue = Arc::new(DurableQueue::load(store.clone(), config.queue_bound));
        let transport = RetryTransport::new(sender, config.max_attempts, shutdown_rx.clone());
        let pipeline = Pipeline::new(queue, transport, config.batch_size, on_drop);
        let session = SessionState::init(store, config.session_timeout());

        let inner = Arc::new(Inner {
            pipeline,
            builder: EnvelopeBuilder::new(&config),
            session: Mutex::new(session),
            ambient: Mutex::new(EventContext::default()),
        });

        let beacon = Self {
            inner,
            shutdown_tx,
            tasks: Arc::new(Mutex::new(Vec::new())),
        };
        beacon.spawn_timer(config.flush_interval(), shutdown_rx.clone());
        beacon.spawn_lifecycle(lifecycle, shutdown_rx);

        tracing::info!(
            app = %config.app_name,
            environment = config.environment.as_str(),
            queued = beacon.queued(),
            "Beacon initialized"
        );

        Ok(beacon)
    }

    fn spawn_timer(&self, interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would race init; skip it
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        inner.pipeline.flush().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    fn spawn_lifecycle(
        &self,
        mut lifecycle: mpsc::Receiver<LifecycleEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = lifecycle.recv() => {
                        let Some(event) = event else { break };
                        match event {
                            LifecycleEvent::Background => {
                                inner.session.lock().unwrap().note_background(Utc::now());
                            }
                            LifecycleEvent::Foreground => {
                                inner.session.lock().unwrap().note_foreground(Utc::now());
                            }
                        }
                        // Both transitions are flush opportunities
                        inner.pipeline.flush().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    /// Record an event
    pub fn track(&self, name: &str, properties: serde_json::Map<String, serde_json::Value>) {
        self.track_with_context(name, properties, None);
    }

    /// Record an event with explicit navigation context.
    ///
    /// Explicit context always overrides the ambient screen context, field
    /// by field.
    pub fn track_with_context(
        &self,
        name: &str,
        properties: serde_json::Map<String, serde_json::Value>,
        context: Option<EventContext>,
    ) {
        let identity = self.inner.session.lock().unwrap().identity();
        let ambient = self.inner.ambient.lock().unwrap().clone();
        let envelope = self
            .inner
            .builder
            .build(name, properties, &identity, &ambient, context);

        self.inner.pipeline.queue().enqueue(envelope);

        if self.inner.pipeline.batch_ready() {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                inner.pipeline.flush().await;
            });
        }
    }

    /// Record a screen view and update the ambient navigation context.
    ///
    /// The previous screen becomes the referrer of the new one.
    pub fn screen(
        &self,
        name: &str,
        route: Option<&str>,
        properties: serde_json::Map<String, serde_json::Value>,
    ) {
        {
            let mut ambient = self.inner.ambient.lock().unwrap();
            ambient.referrer = ambient.screen.take();
            ambient.screen = Some(name.to_string());
            ambient.route = route.map(str::to_string);
        }
        self.track("screen_viewed", properties);
    }

    /// Merge device/locale fields into the ambient context
    pub fn set_device_context(&self, context: EventContext) {
        let mut ambient = self.inner.ambient.lock().unwrap();
        if context.locale.is_some() {
            ambient.locale = context.locale;
        }
        if context.timezone.is_some() {
            ambient.timezone = context.timezone;
        }
        if context.device_model.is_some() {
            ambient.device_model = context.device_model;
        }
        if context.os_version.is_some() {
            ambient.os_version = context.os_version;
        }
        if context.network_type.is_some() {
            ambient.network_type = context.network_type;
        }
    }

    /// Attach the authenticated user identifier (sign-in)
    pub fn identify(&self, user_id: &str) {
        self.inner.session.lock().unwrap().identify(user_id);
    }

    /// Clear the user identifier (sign-out); anonymous and session ids stay
    pub fn reset(&self) {
        self.inner.session.lock().unwrap().reset();
    }

    /// Run one flush pass now
    pub async fn flush(&self) -> FlushResult {
        self.inner.pipeline.flush().await
    }

    /// Envelopes currently queued
    pub fn queued(&self) -> usize {
        self.inner.pipeline.queue().len()
    }

    /// Tear the SDK down: one final flush attempt, then cancel background
    /// work. Anything undelivered stays durably queued for the next process
    /// lifetime.
    pub async fn shutdown(&self) {
        self.inner.pipeline.flush().await;
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!(queued = self.queued(), "Beacon shut down");
    }
}
