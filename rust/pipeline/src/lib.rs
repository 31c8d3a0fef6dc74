//! # handfuse-pipeline: Live Hand Reconciliation Service
//!
//! Async runtime around `handfuse-engine`. Each table gets its own fusion task
//! that waits a bounded, cancellable match window for the second feed, then
//! decides. Fused hands flow through a grading stage and out on an event bus.
//!
//! ## Modules
//!
//! - [`config`] - Layered configuration (defaults, TOML file, environment)
//! - [`table`] - Per-table fusion actor and its match timers
//! - [`orchestrator`] - Table registry, routing and reaping
//! - [`health`] - Per-table feed liveness
//! - [`events`] - Event bus for persistence, recording and monitoring sinks
//! - [`pipeline`] - Wiring of the stages above
//! - [`logging`] - `tracing` subscriber setup
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use handfuse_pipeline::{Pipeline, PipelineConfig, PipelineEvent};
//!
//! # async fn run() -> Result<(), handfuse_pipeline::PipelineError> {
//! let config = PipelineConfig::new(Duration::from_secs(3), Duration::from_secs(30));
//! let pipeline = Pipeline::start(config)?;
//! let mut events = pipeline.subscribe();
//!
//! // feed records with pipeline.ingest_record(..) and
//! // video results with pipeline.ingest_inferred(..)
//!
//! while let Some(event) = events.recv().await {
//!     if let PipelineEvent::BroadcastCandidate { fused, grade } = event {
//!         println!("{} -> {:?}", fused.key(), grade.grade);
//!     }
//! }
//! pipeline.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod events;
pub mod health;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod table;

pub use config::{ConfigError, PipelineConfig};
pub use errors::PipelineError;
pub use events::{EventBus, EventSubscription, PipelineEvent, Topic};
pub use health::{
    ChannelHealthMonitor, FeedSource, HealthTransition, Liveness, TableChannelState, TableStatus,
};
pub use orchestrator::Orchestrator;
pub use pipeline::Pipeline;
pub use table::{TableSettings, TableSnapshot};
