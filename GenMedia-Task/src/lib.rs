//! # genmedia-task
//!
//! Async task lifecycle engine for generative-media REST APIs.
//!
//! A lifecycle submits a job, polls it at a fixed interval until it
//! completes, fails or runs out of time, then downloads every artifact it
//! produced. Services that answer synchronously skip the polling step.
//!
//! ## Quick Start
//!
//! ```no_run
//! use genmedia_task::{
//!     endpoints, ApiClient, ClientConfig, ConfigStore, HistoryContext, Lifecycle,
//!     MaterializeConfig, RunOptions, StoreNotifier,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> genmedia_task::Result<()> {
//! let store = Arc::new(ConfigStore::default_location()?);
//! let client = ApiClient::new(ClientConfig::builder().with_api_key(store.api_key()?).build())?;
//!
//! let lifecycle = Lifecycle::for_client(
//!     client,
//!     MaterializeConfig::default().with_output_dir(store.output_dir()),
//! )
//! .with_notifier(Arc::new(StoreNotifier::new(store.clone())));
//!
//! let model = endpoints::image_model(endpoints::DEFAULT_IMAGE_MODEL)?;
//! let outcome = lifecycle
//!     .run(
//!         &model.endpoint(),
//!         &json!({"prompt": "a sunset over mountains"}),
//!         &RunOptions::default()
//!             .with_history(HistoryContext::new("generate").with_model(model.name)),
//!     )
//!     .await?;
//!
//! for path in outcome.paths() {
//!     println!("{}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod download;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod history;
pub mod image;
pub mod lifecycle;
pub mod naming;
pub mod notify;
pub mod poll;
pub mod submit;
pub mod types;

pub use client::{ApiClient, RateLimitTracker, Transport};
pub use config::{ClientConfig, ConfigStore, MaterializeConfig, PollConfig, Settings};
pub use download::{guess_extension, Materializer};
pub use error::{Result, TaskError};
pub use events::{LifecycleEvent, Reporter, SilentReporter, TracingReporter};
pub use history::{append_history, read_history};
pub use image::image_value;
pub use lifecycle::{HistoryContext, Lifecycle, LifecycleOutcome, RunOptions};
pub use naming::{indexed_path, slugify, NameTemplate, TemplateVars};
pub use notify::{NoopNotifier, Notifier, StoreNotifier};
pub use poll::{Clock, ManualClock, PollState, Poller, TokioClock};
pub use submit::{submit, Submission};
pub use types::{
    Artifact, HistoryEntry, RateLimitInfo, TaskEndpoint, TaskSnapshot, TaskStatus,
};
