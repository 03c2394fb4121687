use std::time::Duration;

use genmedia_batch::{BatchEvent, BatchScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let scheduler = BatchScheduler::new(3)?;

    let prompts = vec![
        "a red fox in snow",
        "a lighthouse at dusk",
        "", // fails: empty prompt
        "a koi pond from above",
        "a paper crane on a desk",
    ];

    let report = scheduler
        .run_all_with_progress(
            prompts,
            |index, prompt| async move {
                anyhow::ensure!(!prompt.is_empty(), "Missing \"prompt\" field");
                // Simulated generation time
                tokio::time::sleep(Duration::from_millis(50 * (index as u64 + 1))).await;
                Ok(format!("render-{}.png", index + 1))
            },
            |event| match event {
                BatchEvent::WindowStarted { window, windows, .. } => {
                    println!("Processing batch {}/{}...", window, windows)
                }
                BatchEvent::ItemFinished {
                    index,
                    success: false,
                    error,
                    ..
                } => println!("  [{}] failed: {}", index + 1, error.as_deref().unwrap_or("")),
                BatchEvent::ItemFinished { index, .. } => println!("  [{}] done", index + 1),
                _ => {}
            },
        )
        .await;

    for outcome in &report.outcomes {
        match &outcome.output {
            Some(file) => println!("{} -> {}", outcome.index + 1, file),
            None => println!("{} -> error", outcome.index + 1),
        }
    }

    println!(
        "Batch complete in {:.1}s: {} succeeded, {} failed",
        report.summary.total_duration_ms as f64 / 1000.0,
        report.succeeded(),
        report.failed()
    );
    Ok(())
}
