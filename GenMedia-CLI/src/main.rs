mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use genmedia_batch::{load_manifest, run_manifest, BatchEvent, BatchScheduler};
use genmedia_task::config::mask_api_key;
use genmedia_task::endpoints::{
    self, ModelCategory, ModelEntry, DEFAULT_IMAGE_MODEL, DEFAULT_VIDEO_MODEL, VIDEO_MAX_WAIT,
};
use genmedia_task::{
    image_value, indexed_path, read_history, ApiClient, ClientConfig, ConfigStore, HistoryContext, Lifecycle,
    LifecycleOutcome, MaterializeConfig, NameTemplate, Reporter, RunOptions, StoreNotifier,
    TaskEndpoint, TaskStatus, TemplateVars,
};
use rand::Rng;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use crate::progress::SpinnerReporter;

const MAX_COUNT: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "genmedia", version, about = "Generate images and video from the command line")]
struct Cli {
    /// Debug logging and rate-limit details.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate images from a text prompt.
    Generate {
        prompt: String,
        /// Model name (see the model registry).
        #[arg(short, long)]
        model: Option<String>,
        /// Output file. With -n, each file gets a -N suffix.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        #[arg(long)]
        seed: Option<i64>,
        /// Number of images, 1 to 10, generated in parallel.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Filename template, e.g. "{prompt}-{seed}.{ext}".
        #[arg(long, value_name = "TEMPLATE")]
        name_template: Option<String>,
        /// Submit and print the task id without waiting.
        #[arg(long)]
        no_download: bool,
    },

    /// Generate a video from an image, a prompt, or both.
    Video {
        /// Input image (local file or URL) for image-to-video models.
        #[arg(long)]
        image: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(short, long, default_value = DEFAULT_VIDEO_MODEL)]
        model: String,
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        #[arg(long)]
        no_download: bool,
    },

    /// Submit a raw request body to any task endpoint.
    Run {
        /// Create path, e.g. /v1/ai/text-to-image/flux-dev.
        #[arg(long)]
        endpoint: String,
        /// Poll path when it differs from the create path.
        #[arg(long)]
        poll_endpoint: Option<String>,
        /// JSON body, or @file to read it from a file.
        #[arg(long)]
        body: String,
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        #[arg(long)]
        no_download: bool,
        /// Give up waiting after this many seconds.
        #[arg(long, value_name = "SECS")]
        max_wait: Option<u64>,
    },

    /// Check a task once, downloading its results with -o.
    Status {
        task_id: String,
        /// Poll path the task was created under.
        #[arg(long)]
        endpoint: String,
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Run the items of a JSON manifest.
    Batch {
        manifest: PathBuf,
        #[arg(long, default_value_t = 3)]
        concurrency: usize,
        /// Print the batch report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the path of the most recent output.
    Last,

    /// List the available image and video models.
    Models,

    /// Show or change persisted settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show generation history.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Only entries whose prompt or command contains this text.
        #[arg(long)]
        search: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current settings.
    Show,
    /// Save the API key.
    SetKey { api_key: String },
    /// Save the default output directory.
    SetOutputDir { path: PathBuf },
    /// Save the default image model.
    SetModel { model: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = Arc::new(ConfigStore::default_location()?);

    match cli.command {
        Commands::Last => {
            let path = store
                .last_output_path()
                .context("No outputs yet. Generate something first")?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::History { limit, search } => {
            show_history(&store, limit, search.as_deref());
            Ok(())
        }
        Commands::Models => {
            print_models();
            Ok(())
        }
        Commands::Config { action } => configure(&store, action),
        command => {
            let client = connect(&store)?;
            let result = run_remote(command, &store, &client).await;
            if cli.verbose {
                print_rate_limit(&client);
            }
            result
        }
    }
}

fn connect(store: &ConfigStore) -> anyhow::Result<ApiClient> {
    let config = ClientConfig::builder().with_api_key(store.api_key()?).build();
    Ok(ApiClient::new(config)?)
}

fn lifecycle(store: &Arc<ConfigStore>, client: &ApiClient, reporter: Arc<dyn Reporter>) -> Lifecycle<ApiClient> {
    let config = MaterializeConfig::default().with_output_dir(store.output_dir());
    Lifecycle::for_client(client.clone(), config)
        .with_reporter(reporter)
        .with_notifier(Arc::new(StoreNotifier::new(store.clone())))
}

async fn run_remote(command: Commands, store: &Arc<ConfigStore>, client: &ApiClient) -> anyhow::Result<()> {
    match command {
        Commands::Generate {
            prompt,
            model,
            output,
            seed,
            count,
            name_template,
            no_download,
        } => {
            let model = model
                .or_else(|| store.load().default_model)
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());
            let job = GenerateJob {
                entry: endpoints::image_model(&model)?,
                prompt,
                output,
                template: name_template.map(NameTemplate::new),
                output_dir: store.output_dir(),
                count: count.clamp(1, MAX_COUNT),
                no_download,
            };
            generate(&job, store, client, seed).await
        }
        Commands::Video {
            image,
            prompt,
            model,
            output,
            no_download,
        } => {
            let entry = endpoints::video_model(&model)?;
            let body = video_body(entry, image.as_deref(), prompt.as_deref()).await?;
            let opts = video_options(entry, prompt.as_deref(), output, no_download);

            let spinner = Arc::new(SpinnerReporter::new(true));
            let outcome = lifecycle(store, client, spinner.clone())
                .run(&entry.endpoint(), &body, &opts)
                .await;
            spinner.finish();
            print_outcome(&outcome?);
            Ok(())
        }
        Commands::Run {
            endpoint,
            poll_endpoint,
            body,
            output,
            no_download,
            max_wait,
        } => {
            let payload = read_body(&body)?;
            let poll = poll_endpoint.unwrap_or_else(|| endpoint.clone());
            let endpoint = TaskEndpoint::new(endpoint, poll);

            let mut opts = RunOptions::default()
                .with_label(format!("Submitting to {}", endpoint.create))
                .with_history(HistoryContext::new("run"));
            if let Some(path) = output {
                opts = opts.with_output(path);
            }
            match max_wait {
                Some(secs) => opts = opts.with_max_wait(Duration::from_secs(secs)),
                None if endpoint.create.contains("-to-video") => opts = opts.with_max_wait(VIDEO_MAX_WAIT),
                None => {}
            }
            if no_download {
                opts = opts.skip_download();
            }

            let spinner = Arc::new(SpinnerReporter::new(true));
            let outcome = lifecycle(store, client, spinner.clone())
                .run(&endpoint, &payload, &opts)
                .await;
            spinner.finish();
            print_outcome(&outcome?);
            Ok(())
        }
        Commands::Status {
            task_id,
            endpoint,
            output,
        } => {
            let spinner = Arc::new(SpinnerReporter::new(true));
            let lifecycle = lifecycle(store, client, spinner.clone());
            let snapshot = lifecycle.status(&endpoint, &task_id).await?;

            println!("Task {}: {}", snapshot.task_id, snapshot.status);
            for artifact in &snapshot.artifacts {
                println!("  {}", artifact.url);
            }
            let result = match (&snapshot.status, output) {
                (TaskStatus::Completed, Some(path)) => lifecycle
                    .materializer()
                    .materialize(&snapshot.artifacts, Some(&path))
                    .await
                    .map(|_| ()),
                (TaskStatus::Failed, _) => {
                    println!("{}", serde_json::to_string_pretty(snapshot.data())?);
                    Ok(())
                }
                _ => Ok(()),
            };
            spinner.finish();
            Ok(result?)
        }
        Commands::Batch {
            manifest,
            concurrency,
            json,
        } => batch(&manifest, concurrency.max(1), json, store, client).await,
        // Local commands are dispatched in `run`.
        Commands::Last | Commands::History { .. } | Commands::Models | Commands::Config { .. } => Ok(()),
    }
}

struct GenerateJob {
    entry: &'static ModelEntry,
    prompt: String,
    output: Option<PathBuf>,
    template: Option<NameTemplate>,
    output_dir: PathBuf,
    count: usize,
    no_download: bool,
}

impl GenerateJob {
    /// Where the `n`th image (1-based) goes, or `None` for a default name.
    fn output_for(&self, n: usize, seed: i64) -> Option<PathBuf> {
        if let Some(path) = &self.output {
            return Some(if self.count == 1 {
                path.clone()
            } else {
                indexed_path(path, n)
            });
        }
        self.template.as_ref().map(|template| {
            self.output_dir.join(template.expand(&TemplateVars {
                prompt: self.prompt.clone(),
                model: self.entry.name.to_string(),
                seed,
                ext: "png".to_string(),
                n,
                timestamp: epoch_ms(),
            }))
        })
    }

    fn options(&self, n: usize, seed: i64) -> RunOptions {
        let history = HistoryContext::new("generate")
            .with_model(self.entry.name)
            .with_prompt(&self.prompt)
            .with_seed(seed);
        let mut opts = RunOptions::default()
            .with_label(format!("Generating with {}", self.entry.name))
            .with_history(history);
        if let Some(path) = self.output_for(n, seed) {
            opts = opts.with_output(path);
        }
        if self.no_download {
            opts = opts.skip_download();
        }
        opts
    }
}

/// `count` seeds: consecutive from `seed` when given, random otherwise.
fn seeds(seed: Option<i64>, count: usize) -> Vec<i64> {
    match seed {
        Some(seed) => (0..count as i64).map(|i| seed + i).collect(),
        None => {
            let mut rng = rand::rng();
            (0..count).map(|_| rng.random_range(0..=i64::from(u32::MAX))).collect()
        }
    }
}

async fn generate(job: &GenerateJob, store: &Arc<ConfigStore>, client: &ApiClient, seed: Option<i64>) -> anyhow::Result<()> {
    let spinner = Arc::new(SpinnerReporter::new(true));
    let lifecycle = lifecycle(store, client, spinner.clone());
    let seeds = seeds(seed, job.count);

    if job.count == 1 {
        let seed = seeds[0];
        let body = json!({ "prompt": job.prompt, "seed": seed });
        let outcome = lifecycle
            .run(&job.entry.endpoint(), &body, &job.options(1, seed))
            .await;
        spinner.finish();
        print_outcome(&outcome?);
        return Ok(());
    }

    let report = BatchScheduler::new(job.count)?
        .run_all(seeds, |index, seed| {
            let lifecycle = &lifecycle;
            async move {
                let body = json!({ "prompt": job.prompt, "seed": seed });
                let outcome = lifecycle
                    .run(&job.entry.endpoint(), &body, &job.options(index + 1, seed))
                    .await?;
                Ok::<_, anyhow::Error>(outcome)
            }
        })
        .await;
    spinner.finish();

    for item in &report.outcomes {
        match (&item.output, &item.error) {
            (Some(outcome), _) => print_outcome(outcome),
            (None, Some(error)) => eprintln!("[{}] Failed: {}", item.index + 1, error),
            (None, None) => {}
        }
    }
    if report.succeeded() == 0 {
        bail!("All {} generations failed", report.summary.total);
    }
    Ok(())
}

async fn batch(manifest: &Path, concurrency: usize, json: bool, store: &Arc<ConfigStore>, client: &ApiClient) -> anyhow::Result<()> {
    let items = load_manifest(manifest)?;
    let spinner = Arc::new(SpinnerReporter::new(!json));
    spinner.println(format!(
        "Loaded {} items from manifest (concurrency: {})",
        items.len(),
        concurrency
    ));

    let commands: Vec<String> = items.iter().map(|i| i.command.clone()).collect();
    let lifecycle = Arc::new(lifecycle(store, client, spinner.clone()));
    let report = run_manifest(lifecycle, items, concurrency, |event| match event {
        BatchEvent::WindowStarted { window, windows, .. } => {
            spinner.println(format!("Processing batch {}/{}...", window, windows))
        }
        BatchEvent::ItemFinished {
            index,
            success: false,
            error,
            ..
        } => spinner.println(format!(
            "[{}] Failed: {}",
            index + 1,
            error.as_deref().unwrap_or("unknown error")
        )),
        _ => {}
    })
    .await;
    spinner.finish();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for item in &report.outcomes {
        if let Some(paths) = &item.output {
            let shown: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
            println!("[{}] {} -> {}", item.index + 1, commands[item.index], shown.join(", "));
        }
    }
    println!();
    println!(
        "Batch complete in {:.1}s",
        report.summary.total_duration_ms as f64 / 1000.0
    );
    println!("  {} succeeded  {} failed", report.succeeded(), report.failed());
    Ok(())
}

/// Request body for a video model. Image-to-video needs an image,
/// text-to-video a prompt.
async fn video_body(entry: &ModelEntry, image: Option<&str>, prompt: Option<&str>) -> anyhow::Result<Value> {
    match entry.category {
        ModelCategory::TextToVideo if prompt.is_none() => {
            bail!("Model \"{}\" is text-to-video and requires --prompt", entry.name)
        }
        ModelCategory::ImageToVideo if image.is_none() => bail!(
            "Model \"{}\" is image-to-video and requires --image. For text-to-video, use --model wan-2.5-t2v",
            entry.name
        ),
        _ => {}
    }

    let mut body = json!({});
    if let Some(image) = image {
        body["image"] = json!(image_value(image).await?);
    }
    if let Some(prompt) = prompt {
        body["prompt"] = json!(prompt);
    }
    Ok(body)
}

fn video_options(entry: &ModelEntry, prompt: Option<&str>, output: Option<PathBuf>, no_download: bool) -> RunOptions {
    let mut history = HistoryContext::new("video").with_model(entry.name);
    if let Some(prompt) = prompt {
        history = history.with_prompt(prompt);
    }
    let mut opts = RunOptions::default()
        .with_label(format!("Generating video with {}", entry.name))
        .with_max_wait(VIDEO_MAX_WAIT)
        .with_history(history);
    if let Some(path) = output {
        opts = opts.with_output(path);
    }
    if no_download {
        opts = opts.skip_download();
    }
    opts
}

fn print_models() {
    println!("Image models (default {}):", DEFAULT_IMAGE_MODEL);
    for name in endpoints::image_model_names() {
        println!("  {}", name);
    }
    println!("Video models (default {}):", DEFAULT_VIDEO_MODEL);
    for name in endpoints::video_model_names() {
        println!("  {}", name);
    }
}

fn configure(store: &ConfigStore, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = store.load();
            let key = store
                .api_key()
                .map(|k| mask_api_key(&k))
                .unwrap_or_else(|_| "(not set)".to_string());
            println!("Config file:    {}", store.config_path().display());
            println!("API key:        {}", key);
            println!("Output dir:     {}", store.output_dir().display());
            println!(
                "Default model:  {}",
                settings.default_model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL)
            );
            println!("Generations:    {}", settings.generations);
        }
        ConfigAction::SetKey { api_key } => {
            let masked = mask_api_key(&api_key);
            store.update(|s| s.api_key = Some(api_key))?;
            println!("API key saved ({})", masked);
            println!("Config file: {}", store.config_path().display());
        }
        ConfigAction::SetOutputDir { path } => {
            println!("Default output directory set to: {}", path.display());
            store.update(|s| s.output_dir = Some(path))?;
        }
        ConfigAction::SetModel { model } => {
            endpoints::image_model(&model)?;
            store.update(|s| s.default_model = Some(model.clone()))?;
            println!("Default model set to: {}", model);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &LifecycleOutcome) {
    match outcome {
        LifecycleOutcome::Completed {
            task_id,
            artifacts,
            paths,
        } if paths.is_empty() => {
            println!("Task {} completed", task_id);
            for artifact in artifacts {
                println!("  {}", artifact.url);
            }
        }
        LifecycleOutcome::Completed { .. } => {}
        LifecycleOutcome::Detached {
            task_id,
            poll_endpoint,
        } => {
            println!("Task {} submitted", task_id);
            println!("Check with: genmedia status {} --endpoint {}", task_id, poll_endpoint);
        }
    }
}

/// Parse `--body`: inline JSON, or `@path` to a JSON file.
fn read_body(raw: &str) -> anyhow::Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("--body is not valid JSON")
}

fn show_history(store: &ConfigStore, limit: usize, search: Option<&str>) {
    let path = store.history_path();
    let mut entries = read_history(&path);
    if entries.is_empty() {
        println!("No history found. History is stored at: {}", path.display());
        return;
    }

    if let Some(term) = search {
        let term = term.to_lowercase();
        entries.retain(|e| {
            e.command.to_lowercase().contains(&term)
                || e.prompt.as_deref().is_some_and(|p| p.to_lowercase().contains(&term))
        });
    }

    let total = entries.len();
    let shown = &entries[total.saturating_sub(limit.max(1))..];
    println!("Generation history (last {} of {})", shown.len(), total);
    println!();
    println!("  {:<25}  {:<12}  {:<16}  {}", "Time", "Command", "Model", "Prompt");
    for entry in shown {
        println!(
            "  {:<25}  {:<12}  {:<16}  {}",
            truncate(&entry.timestamp, 25),
            truncate(&entry.command, 12),
            truncate(entry.model.as_deref().unwrap_or("-"), 16),
            truncate(entry.prompt.as_deref().unwrap_or("-"), 36),
        );
    }
}

fn print_rate_limit(client: &ApiClient) {
    let info = client.rate_limit();
    if let (Some(remaining), Some(limit)) = (info.remaining, info.limit) {
        match info.reset_seconds {
            Some(reset) => eprintln!("Rate limit: {}/{} remaining, resets in {}s", remaining, limit, reset),
            None => eprintln!("Rate limit: {}/{} remaining", remaining, limit),
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
