//! # beacon-sdk
//!
//! Client-side telemetry SDK for the Beacon pipeline.
//!
//! This library provides:
//! - A crash-surviving, bounded local event queue
//! - A batching scheduler driven by a timer, lifecycle signals, and a queue
//!   threshold
//! - A retrying transport with exponential backoff and outcome
//!   classification
//! - Session/identity state with rotation after background inactivity
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use beacon_sdk::{Beacon, FileStateStore, LifecycleEvent, SdkConfig};
//!
//! # async fn example() -> beacon_sdk::Result<()> {
//! let config = SdkConfig::load_from("beacon.toml".as_ref())?;
//! let store = Arc::new(FileStateStore::open("beacon-state.json".as_ref())?);
//! let (lifecycle_tx, lifecycle_rx) = tokio::sync::mpsc::channel(8);
//!
//! let beacon = Beacon::init(config, store, lifecycle_rx, None)?;
//! beacon.track("app_opened", Default::default());
//!
//! // The host forwards its lifecycle notifications:
//! lifecycle_tx.send(LifecycleEvent::Background).await.ok();
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::SdkConfig;
pub use error::{Error, Result};
pub use scheduler::{DropHook, FlushResult, LifecycleEvent};
pub use sdk::Beacon;
pub use state::{FileStateStore, MemoryStateStore, StateStore};
pub use transport::{backoff_delay, BatchSender, Outcome};

// Public modules
pub mod builder;
pub mod config;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod sdk;
pub mod session;
pub mod state;
pub mod transport;
