//! Shared per-item batch runner used by scanning, EXIF extraction and analysis.
//!
//! Each item is an independent unit of work. A failing item is counted and its
//! error kept (up to a limit) while the rest of the batch carries on. Work runs
//! on a bounded rayon pool, so items beyond the worker limit simply queue.
//! A shared cancellation flag is checked before each item starts; anything not
//! yet started when it is raised is left untouched and not counted.

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::ImageAsset;

/// Something a batch can report on when it fails
pub trait BatchItem {
    fn image_id(&self) -> Option<i64>;
    fn label(&self) -> String;
}

impl BatchItem for ImageAsset {
    fn image_id(&self) -> Option<i64> {
        Some(self.id)
    }

    fn label(&self) -> String {
        self.file_name.clone()
    }
}

impl BatchItem for PathBuf {
    fn image_id(&self) -> Option<i64> {
        None
    }

    fn label(&self) -> String {
        self.display().to_string()
    }
}

/// One failed item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<i64>,
    pub file: String,
    pub error: String,
}

/// Aggregate outcome of a batch operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub success: usize,
    pub errors: usize,
    /// First failures only, capped by `Config::error_detail_limit`
    pub error_details: Vec<ErrorDetail>,
    /// True when cancellation stopped the batch before every item ran
    pub interrupted: bool,
}

/// Summary plus the values produced by successful items, in input order
#[derive(Debug)]
pub struct BatchOutput<R> {
    pub summary: BatchSummary,
    pub outputs: Vec<R>,
}

/// Runs a unit of work over many items with bounded parallelism
#[derive(Clone)]
pub struct BatchExecutor {
    workers: usize,
    batch_size: usize,
    error_detail_limit: usize,
    show_progress: bool,
    cancel: Arc<AtomicBool>,
}

impl BatchExecutor {
    pub fn new(config: &Config, cancel: Arc<AtomicBool>) -> Self {
        Self {
            workers: config.worker_count().max(1),
            batch_size: config.batch_size.max(1),
            error_detail_limit: config.error_detail_limit,
            show_progress: config.show_progress,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn error_detail_limit(&self) -> usize {
        self.error_detail_limit
    }

    /// Apply `work` to every item and fold the outcomes into a summary.
    ///
    /// Never fails as a whole: item errors land in the summary.
    pub fn run<T, R, F>(&self, operation: &str, items: &[T], work: F) -> BatchOutput<R>
    where
        T: BatchItem + Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        let start = Instant::now();
        info!(
            "{}: {} items on {} workers",
            operation,
            items.len(),
            self.workers
        );

        let progress = self.progress_bar(operation, items.len());
        let completed = AtomicUsize::new(0);

        let run_one = |item: &T| -> Option<Result<R>> {
            if self.is_cancelled() {
                return None;
            }
            let outcome = work(item);
            progress.inc(1);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % self.batch_size == 0 {
                debug!("{}: {}/{} done", operation, done, items.len());
            }
            Some(outcome)
        };

        let outcomes: Vec<Option<Result<R>>> =
            match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
                Ok(pool) => pool.install(|| items.par_iter().map(run_one).collect()),
                Err(e) => {
                    warn!("Failed to build worker pool, running sequentially: {}", e);
                    items.iter().map(run_one).collect()
                }
            };

        let output = self.summarize(items, outcomes);
        progress.finish_and_clear();

        info!(
            "{} finished in {:.2?}: {} processed, {} ok, {} failed{}",
            operation,
            start.elapsed(),
            output.summary.processed,
            output.summary.success,
            output.summary.errors,
            if output.summary.interrupted {
                " (interrupted)"
            } else {
                ""
            }
        );

        output
    }

    fn summarize<T, R>(&self, items: &[T], outcomes: Vec<Option<Result<R>>>) -> BatchOutput<R>
    where
        T: BatchItem,
    {
        let mut summary = BatchSummary::default();
        let mut outputs = Vec::new();

        for (item, outcome) in items.iter().zip(outcomes) {
            match outcome {
                None => summary.interrupted = true,
                Some(Ok(value)) => {
                    summary.processed += 1;
                    summary.success += 1;
                    outputs.push(value);
                }
                Some(Err(e)) => {
                    summary.processed += 1;
                    summary.errors += 1;
                    log_item_error(item, &e);
                    if summary.error_details.len() < self.error_detail_limit {
                        summary.error_details.push(ErrorDetail {
                            image_id: item.image_id(),
                            file: item.label(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        BatchOutput { summary, outputs }
    }

    fn progress_bar(&self, operation: &str, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("[{eta}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);
        bar.set_message(operation.to_string());
        bar
    }
}

fn log_item_error<T: BatchItem>(item: &T, error: &Error) {
    match item.image_id() {
        Some(id) => log::error!("Item failed - Image: {}, File: {}, Error: {}", id, item.label(), error),
        None => log::error!("Item failed - File: {}, Error: {}", item.label(), error),
    }
}
