use std::time::Duration;

use crate::error::{Result, TaskError};
use crate::types::TaskEndpoint;

/// Model used when a caller does not name one.
pub const DEFAULT_IMAGE_MODEL: &str = "flux-2-turbo";

/// Video model used when a caller does not name one.
pub const DEFAULT_VIDEO_MODEL: &str = "kling-2.6-pro";

/// Longer maximum wait for video lifecycles.
pub const VIDEO_MAX_WAIT: Duration = Duration::from_secs(600);

/// Kind of output a registered model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCategory {
    TextToImage,
    ImageToVideo,
    TextToVideo,
}

/// A named model and the paths used to drive its tasks.
#[derive(Debug, Clone, Copy)]
pub struct ModelEntry {
    pub name: &'static str,
    pub path: &'static str,
    pub category: ModelCategory,
}

impl ModelEntry {
    pub fn endpoint(&self) -> TaskEndpoint {
        TaskEndpoint::same(self.path)
    }
}

const IMAGE_MODELS: &[ModelEntry] = &[
    image("mystic", "/v1/ai/mystic"),
    image("flux-2-pro", "/v1/ai/text-to-image/flux-2-pro"),
    image("flux-2-turbo", "/v1/ai/text-to-image/flux-2-turbo"),
    image("flux-2-klein", "/v1/ai/text-to-image/flux-2-klein"),
    image("flux-kontext", "/v1/ai/text-to-image/flux-kontext-pro"),
    image("flux-pro-1.1", "/v1/ai/text-to-image/flux-pro-v1-1"),
    image("flux-dev", "/v1/ai/text-to-image/flux-dev"),
    image("hyperflux", "/v1/ai/text-to-image/hyperflux"),
    image("seedream-4", "/v1/ai/text-to-image/seedream-4"),
    image("seedream-4.5", "/v1/ai/text-to-image/seedream-4-5"),
    image("runway", "/v1/ai/text-to-image/runway"),
];

const VIDEO_MODELS: &[ModelEntry] = &[
    video("kling-2.1-pro", "/v1/ai/image-to-video/kling-v2-1-pro", ModelCategory::ImageToVideo),
    video("kling-2.5-pro", "/v1/ai/image-to-video/kling-v2-5-pro", ModelCategory::ImageToVideo),
    video("kling-2.6-pro", "/v1/ai/image-to-video/kling-v2-6-pro", ModelCategory::ImageToVideo),
    video(
        "hailuo-02",
        "/v1/ai/image-to-video/minimax-hailuo-02-1080p",
        ModelCategory::ImageToVideo,
    ),
    video(
        "wan-2.5-t2v",
        "/v1/ai/text-to-video/wan-2-5-t2v-1080p",
        ModelCategory::TextToVideo,
    ),
];

const fn image(name: &'static str, path: &'static str) -> ModelEntry {
    ModelEntry {
        name,
        path,
        category: ModelCategory::TextToImage,
    }
}

const fn video(name: &'static str, path: &'static str, category: ModelCategory) -> ModelEntry {
    ModelEntry {
        name,
        path,
        category,
    }
}

/// Creative upscaler.
pub fn upscale() -> TaskEndpoint {
    TaskEndpoint::same("/v1/ai/upscaler-creative")
}

/// Background removal. Synchronous: answers with `data.image_url` instead
/// of a task to poll.
pub const REMOVE_BACKGROUND: &str = "/v1/ai/remove-background";

/// Look up a text-to-image model by name.
pub fn image_model(name: &str) -> Result<&'static ModelEntry> {
    lookup(IMAGE_MODELS, name, "model")
}

/// Look up a video model by name.
pub fn video_model(name: &str) -> Result<&'static ModelEntry> {
    lookup(VIDEO_MODELS, name, "video model")
}

pub fn image_model_names() -> Vec<&'static str> {
    IMAGE_MODELS.iter().map(|m| m.name).collect()
}

pub fn video_model_names() -> Vec<&'static str> {
    VIDEO_MODELS.iter().map(|m| m.name).collect()
}

fn lookup(table: &'static [ModelEntry], name: &str, kind: &str) -> Result<&'static ModelEntry> {
    table.iter().find(|m| m.name == name).ok_or_else(|| {
        let available: Vec<&str> = table.iter().map(|m| m.name).collect();
        TaskError::Validation(format!(
            "Unknown {} \"{}\". Available: {}",
            kind,
            name,
            available.join(", ")
        ))
    })
}
