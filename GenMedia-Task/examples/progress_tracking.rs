//! Watch a video task with a custom reporter.
//!
//! Video models take minutes, so the run uses the longer video wait and
//! prints every status change as it is observed.
//!
//! ```sh
//! cargo run --example progress_tracking -- https://example.com/still.png
//! ```

use std::sync::Arc;

use genmedia_task::{
    endpoints, image_value, ApiClient, ClientConfig, ConfigStore, Lifecycle, LifecycleEvent,
    MaterializeConfig, Reporter, RunOptions,
};
use serde_json::json;

struct PrintReporter;

impl Reporter for PrintReporter {
    fn report(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::TaskCreated { task_id } => println!("Task created: {}", task_id),
            LifecycleEvent::StatusChanged {
                status, elapsed_ms, ..
            } => println!("  {} after {:.0}s", status, *elapsed_ms as f64 / 1000.0),
            LifecycleEvent::Completed { files, .. } => println!("Done, {} file(s)", files),
            LifecycleEvent::Saved { path } => println!("Saved {}", path.display()),
            other => println!("{:?}", other),
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let image = std::env::args()
        .nth(1)
        .ok_or("usage: progress_tracking <image path or URL>")?;

    let store = ConfigStore::default_location()?;
    let client = ApiClient::new(ClientConfig::builder().with_api_key(store.api_key()?).build())?;
    let lifecycle = Lifecycle::for_client(client, MaterializeConfig::default())
        .with_reporter(Arc::new(PrintReporter));

    let model = endpoints::video_model("kling-2.1-pro")?;
    let body = json!({
        "image": image_value(&image).await?,
        "prompt": "slow camera push in",
        "duration": "5",
    });

    lifecycle
        .run(
            &model.endpoint(),
            &body,
            &RunOptions::default()
                .with_max_wait(endpoints::VIDEO_MAX_WAIT)
                .with_output("clip.mp4"),
        )
        .await?;

    Ok(())
}
