//! Generate a single image from a text prompt.
//!
//! Reads the API key from `GENMEDIA_API_KEY` or the settings file.
//!
//! ```sh
//! cargo run --example simple_generation -- "a lighthouse at dusk"
//! ```

use genmedia_task::{
    endpoints, ApiClient, ClientConfig, ConfigStore, Lifecycle, MaterializeConfig, RunOptions,
};
use serde_json::json;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "a beautiful sunset over mountains".to_string());

    let store = ConfigStore::default_location()?;
    let client = ApiClient::new(ClientConfig::builder().with_api_key(store.api_key()?).build())?;
    let lifecycle = Lifecycle::for_client(
        client,
        MaterializeConfig::default().with_output_dir(store.output_dir()),
    );

    let model = endpoints::image_model(endpoints::DEFAULT_IMAGE_MODEL)?;
    println!("Generating with {}", model.name);

    let outcome = lifecycle
        .run(
            &model.endpoint(),
            &json!({ "prompt": prompt }),
            &RunOptions::default(),
        )
        .await?;

    for path in outcome.paths() {
        println!("Saved {}", path.display());
    }

    let limits = lifecycle.transport().rate_limit();
    if let (Some(remaining), Some(limit)) = (limits.remaining, limits.limit) {
        println!("Rate limit: {}/{} remaining", remaining, limit);
    }

    Ok(())
}
