//! Output file naming: templates, indexed fan-out and default names.

use std::path::{Path, PathBuf};

const SLUG_MAX: usize = 30;

/// Values substituted into a [`NameTemplate`].
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pub prompt: String,
    pub model: String,
    pub seed: i64,
    /// Extension without the leading dot.
    pub ext: String,
    /// 1-based position within a fan-out.
    pub n: usize,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Filename template with `{prompt}`, `{model}`, `{seed}`, `{ext}`, `{n}`
/// and `{timestamp}` placeholders. Unknown placeholders are left as-is.
///
/// ```
/// use genmedia_task::{NameTemplate, TemplateVars};
///
/// let tpl = NameTemplate::new("{prompt}-{n}.{ext}");
/// let name = tpl.expand(&TemplateVars {
///     prompt: "A Red Fox!".into(),
///     ext: "png".into(),
///     n: 2,
///     ..Default::default()
/// });
/// assert_eq!(name, "a-red-fox-2.png");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    template: String,
}

impl NameTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn expand(&self, vars: &TemplateVars) -> String {
        self.template
            .replace("{prompt}", &slugify(&vars.prompt))
            .replace("{model}", &vars.model)
            .replace("{seed}", &vars.seed.to_string())
            .replace("{ext}", &vars.ext)
            .replace("{n}", &vars.n.to_string())
            .replace("{timestamp}", &vars.timestamp.to_string())
    }
}

/// Lowercase, collapse non-alphanumeric runs to `-`, trim the edges and
/// cap the length.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug.chars().take(SLUG_MAX).collect()
}

/// Insert `-{index}` between the stem and the extension of `base`.
///
/// `out/cat.png` with index 2 becomes `out/cat-2.png`; an extension-less
/// base simply gets the suffix.
pub fn indexed_path(base: &Path, index: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}-{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}-{}", stem, index),
    };
    base.with_file_name(name)
}

/// `<prefix>-<epoch millis><ext>`, where `ext` includes the dot.
pub fn default_filename(prefix: &str, ext: &str) -> String {
    format!("{}-{}{}", prefix, chrono::Utc::now().timestamp_millis(), ext)
}
