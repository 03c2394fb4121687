//! # genmedia-batch
//!
//! Runs many independent task lifecycles under a concurrency cap.
//!
//! ## Key Features
//!
//! - **Windowed scheduling**: items run in sequential windows of at most
//!   `concurrency`; each window settles fully before the next starts
//! - **Failure isolation**: an error or panic in one item is recorded in that
//!   item's outcome and never aborts its siblings
//! - **Stable ordering**: outcomes carry their input index and are reported
//!   in input order regardless of completion order
//! - **Manifests**: JSON manifests of `generate`, `upscale` and `remove-bg`
//!   items run straight through a shared [`genmedia_task::Lifecycle`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use genmedia_batch::{load_manifest, run_manifest};
//! use genmedia_task::{ApiClient, ClientConfig, Lifecycle, MaterializeConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ApiClient::new(ClientConfig::builder().with_api_key("key").build())?;
//! let lifecycle = Arc::new(Lifecycle::for_client(client, MaterializeConfig::default()));
//!
//! let items = load_manifest(Path::new("jobs.json"))?;
//! let report = run_manifest(lifecycle, items, 3, |event| println!("{:?}", event)).await?;
//!
//! for failure in report.failures() {
//!     eprintln!("[{}] {}", failure.index + 1, failure.error.as_deref().unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manifest;
pub mod scheduler;
pub mod types;

pub use error::{BatchError, Result};
pub use manifest::{execute_item, load_manifest, parse_manifest, run_manifest, Command, ManifestItem};
pub use scheduler::{run_all, BatchScheduler};
pub use types::{BatchEvent, BatchReport, BatchSummary, ItemOutcome};
