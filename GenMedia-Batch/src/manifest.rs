use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use genmedia_task::{
    endpoints, image_value, Artifact, Clock, HistoryContext, Lifecycle, RunOptions, Transport,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{BatchError, Result};
use crate::scheduler::BatchScheduler;
use crate::types::{BatchEvent, BatchReport};

/// Accepted upscale factors.
pub const SCALES: &[(&str, u32)] = &[("2x", 2), ("4x", 4), ("8x", 8), ("16x", 16)];

/// One manifest entry, as written in the JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// A validated manifest command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Generate {
        prompt: String,
        model: String,
        seed: Option<i64>,
    },
    Upscale {
        image: String,
        scale: u32,
    },
    RemoveBackground {
        image: String,
    },
}

impl ManifestItem {
    /// Check required fields for the item's command.
    pub fn parse_command(&self) -> anyhow::Result<Command> {
        match self.command.as_str() {
            "generate" => {
                let prompt = self
                    .prompt
                    .clone()
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| anyhow!("Missing \"prompt\" field"))?;
                Ok(Command::Generate {
                    prompt,
                    model: self
                        .model
                        .clone()
                        .unwrap_or_else(|| endpoints::DEFAULT_IMAGE_MODEL.to_string()),
                    seed: self.seed,
                })
            }
            "upscale" => {
                let image = self.required_image()?;
                let label = self.scale.as_deref().unwrap_or("2x");
                let scale = SCALES
                    .iter()
                    .find(|(name, _)| *name == label)
                    .map(|(_, factor)| *factor)
                    .ok_or_else(|| anyhow!("Invalid scale \"{}\". Use: 2x, 4x, 8x, 16x", label))?;
                Ok(Command::Upscale { image, scale })
            }
            "remove-bg" => Ok(Command::RemoveBackground {
                image: self.required_image()?,
            }),
            other => bail!("Unknown command \"{}\"", other),
        }
    }

    fn required_image(&self) -> anyhow::Result<String> {
        self.image
            .clone()
            .ok_or_else(|| anyhow!("Missing \"image\" field"))
    }
}

/// Parse manifest text: a JSON array of items.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestItem>> {
    let doc: Value = serde_json::from_str(text)?;
    if !doc.is_array() {
        return Err(BatchError::Manifest("Manifest must be a JSON array of items".into()));
    }
    Ok(serde_json::from_value(doc)?)
}

/// Read and parse a `.json` manifest file.
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestItem>> {
    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if !is_json {
        return Err(BatchError::Manifest(format!(
            "Unsupported manifest format for {}. Use a .json file, e.g. \
             [{{\"command\": \"generate\", \"prompt\": \"cat in space\", \"output\": \"cat.png\"}}]",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path).map_err(|source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&text)
}

/// Run one manifest item as a full lifecycle and return the written files.
pub async fn execute_item<T, C>(lifecycle: &Lifecycle<T, C>, item: &ManifestItem) -> anyhow::Result<Vec<PathBuf>>
where
    T: Transport,
    C: Clock,
{
    let opts = RunOptions {
        output: item.output.clone(),
        ..Default::default()
    };

    match item.parse_command()? {
        Command::Generate {
            prompt,
            model,
            seed,
        } => {
            let entry = endpoints::image_model(&model)?;
            let mut body = json!({ "prompt": prompt });
            if let Some(seed) = seed {
                body["seed"] = json!(seed);
            }
            let mut history = HistoryContext::new("generate")
                .with_model(&model)
                .with_prompt(&prompt);
            history.seed = seed;
            let outcome = lifecycle
                .run(&entry.endpoint(), &body, &opts.with_history(history))
                .await?;
            Ok(outcome.into_paths())
        }
        Command::Upscale { image, scale } => {
            let body = json!({
                "image": image_value(&image).await?,
                "scale_factor": scale,
                "creativity": 0,
                "hdr": 0,
                "resemblance": 0,
            });
            let outcome = lifecycle
                .run(
                    &endpoints::upscale(),
                    &body,
                    &opts.with_history(HistoryContext::new("upscale")),
                )
                .await?;
            Ok(outcome.into_paths())
        }
        Command::RemoveBackground { image } => {
            let body = json!({ "image": image_value(&image).await? });
            let response = lifecycle
                .transport()
                .post(endpoints::REMOVE_BACKGROUND, &body)
                .await?;
            let Some(url) = response
                .pointer("/data/image_url")
                .and_then(Value::as_str)
            else {
                tracing::warn!("remove-bg response had no image_url");
                return Ok(Vec::new());
            };
            let paths = lifecycle
                .materializer()
                .materialize(&[Artifact::new(url)], item.output.as_deref())
                .await
                .context("remove-bg download")?;
            Ok(paths)
        }
    }
}

/// Run every manifest item under a shared lifecycle.
pub async fn run_manifest<T, C, P>(
    lifecycle: Arc<Lifecycle<T, C>>,
    items: Vec<ManifestItem>,
    concurrency: usize,
    on_event: P,
) -> Result<BatchReport<Vec<PathBuf>>>
where
    T: Transport,
    C: Clock,
    P: FnMut(&BatchEvent),
{
    let scheduler = BatchScheduler::new(concurrency)?;
    let report = scheduler
        .run_all_with_progress(
            items,
            |index, item| {
                let lifecycle = lifecycle.clone();
                async move {
                    execute_item(&lifecycle, &item)
                        .await
                        .with_context(|| format!("[{}] {}", index + 1, item.command))
                }
            },
            on_event,
        )
        .await;
    Ok(report)
}
