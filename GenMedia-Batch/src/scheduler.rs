use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

use crate::error::{BatchError, Result};
use crate::types::{BatchEvent, BatchReport, BatchSummary, ItemOutcome};

/// Runs independent items in sequential windows of at most `concurrency`.
///
/// Every item in a window starts together and the whole window, failures
/// included, settles before the next one starts. A failing or panicking
/// worker only affects its own outcome. There are no retries.
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    concurrency: usize,
}

impl BatchScheduler {
    pub fn new(concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(BatchError::InvalidConcurrency);
        }
        Ok(Self { concurrency })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run_all<T, O, F, Fut>(&self, items: Vec<T>, worker: F) -> BatchReport<O>
    where
        F: Fn(usize, T) -> Fut,
        Fut: Future<Output = anyhow::Result<O>>,
    {
        self.run_all_with_progress(items, worker, |_| {}).await
    }

    /// Like [`run_all`](Self::run_all), calling `on_event` as the batch
    /// progresses.
    pub async fn run_all_with_progress<T, O, F, Fut, P>(&self, items: Vec<T>, worker: F, mut on_event: P) -> BatchReport<O>
    where
        F: Fn(usize, T) -> Fut,
        Fut: Future<Output = anyhow::Result<O>>,
        P: FnMut(&BatchEvent),
    {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let total = items.len();
        let windows = total.div_ceil(self.concurrency);
        let started = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();

        tracing::info!(%batch_id, total, concurrency = self.concurrency, "batch started");
        on_event(&BatchEvent::Started {
            batch_id: batch_id.clone(),
            total,
            concurrency: self.concurrency,
        });

        let mut outcomes: Vec<ItemOutcome<O>> = Vec::with_capacity(total);
        let mut pending = items.into_iter().enumerate();

        for window in 1..=windows {
            let batch: Vec<(usize, T)> = pending.by_ref().take(self.concurrency).collect();
            tracing::debug!(%batch_id, window, windows, items = batch.len(), "window started");
            on_event(&BatchEvent::WindowStarted {
                window,
                windows,
                items: batch.len(),
            });

            let worker = &worker;
            let mut in_flight: FuturesUnordered<_> = batch
                .into_iter()
                .map(|(index, item)| async move {
                    let start = Instant::now();
                    // The call itself is inside the boundary so a panic before
                    // the first await is caught too.
                    let result = AssertUnwindSafe(async move { worker(index, item).await })
                        .catch_unwind()
                        .await;
                    (index, result, start.elapsed().as_millis() as u64)
                })
                .collect();

            while let Some((index, result, duration_ms)) = in_flight.next().await {
                let outcome = match result {
                    Ok(Ok(output)) => ItemOutcome::succeeded(index, output, duration_ms),
                    Ok(Err(e)) => ItemOutcome::failed(index, format!("{:#}", e), duration_ms),
                    Err(panic) => ItemOutcome::failed(
                        index,
                        format!("worker panicked: {}", panic_message(panic.as_ref())),
                        duration_ms,
                    ),
                };
                if let Some(error) = &outcome.error {
                    tracing::warn!(%batch_id, index, "item failed: {}", error);
                }
                on_event(&BatchEvent::ItemFinished {
                    index,
                    success: outcome.success,
                    error: outcome.error.clone(),
                    completed: outcomes.len() + 1,
                    total,
                    duration_ms,
                });
                outcomes.push(outcome);
            }
        }

        outcomes.sort_by_key(|o| o.index);

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let item_ms: u64 = outcomes.iter().map(|o| o.duration_ms).sum();
        let summary = BatchSummary {
            batch_id,
            total,
            succeeded,
            failed: total - succeeded,
            concurrency: self.concurrency,
            started_at,
            completed_at: chrono::Utc::now().to_rfc3339(),
            total_duration_ms: started.elapsed().as_millis() as u64,
            avg_item_ms: if total == 0 { 0 } else { item_ms / total as u64 },
        };

        tracing::info!(
            batch_id = %summary.batch_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_ms = summary.total_duration_ms,
            "batch finished"
        );
        on_event(&BatchEvent::Finished {
            summary: summary.clone(),
        });

        BatchReport { outcomes, summary }
    }
}

/// Run `worker` over `items` with at most `concurrency` in flight.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> genmedia_batch::Result<()> {
/// let report = genmedia_batch::run_all(vec![1, 2, 3], 2, |_, n| async move {
///     anyhow::ensure!(n != 2, "two is not allowed");
///     Ok(n * 10)
/// })
/// .await?;
///
/// assert_eq!(report.succeeded(), 2);
/// assert_eq!(report.outcomes[2].output, Some(30));
/// # Ok(())
/// # }
/// ```
pub async fn run_all<T, O, F, Fut>(items: Vec<T>, concurrency: usize, worker: F) -> Result<BatchReport<O>>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = anyhow::Result<O>>,
{
    Ok(BatchScheduler::new(concurrency)?.run_all(items, worker).await)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
