//! # GeoPrep Batch
//!
//! Runs per-file operations over many inputs on a bounded rayon pool.
//! Items are independent: one corrupt input records a failure without
//! touching the others. Progress flows over an `mpsc` channel as
//! [`Event`] values so shells can render it without the library knowing
//! about terminals.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;

use rayon::prelude::*;
use tracing::{info, warn};

use geoprep_core::crs::{Crs, TransformCache};
use geoprep_core::{CancelToken, Error, Result};
use geoprep_ops::reproject::{reproject_raster_file, ReprojectOptions};

/// Progress notification emitted during a batch run
#[derive(Debug, Clone)]
pub enum Event {
    Started { total: usize },
    /// Completed share of the whole run after finishing `item`
    Progress { fraction: f64, item: String },
    ItemDone { item: String, ok: bool },
    Finished,
}

/// A failure recorded for one batch item
#[derive(Debug, Clone)]
pub struct ItemError {
    /// Error classification tag, as in [`geoprep_core::Error::kind`]
    pub kind: String,
    pub message: String,
}

impl From<&Error> for ItemError {
    fn from(e: &Error) -> Self {
        ItemError {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// Outcome of one batch item, in input order
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub input: PathBuf,
    pub result: std::result::Result<PathBuf, ItemError>,
}

/// Per-input outcomes of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_all_ok(&self) -> bool {
        self.failed() == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Worker cap; the CPU count when absent
    pub max_workers: Option<usize>,
}

/// Reproject many GeoTIFFs into `output_dir`, one output per input,
/// keeping file names.
///
/// Failures are isolated per item; cancellation is observed between
/// items and marks the remaining ones as failed without running them.
#[allow(clippy::too_many_arguments)]
pub fn reproject_files(
    inputs: &[PathBuf],
    output_dir: &Path,
    target: Crs,
    opts: &ReprojectOptions,
    batch: &BatchOptions,
    cache: &TransformCache,
    cancel: &CancelToken,
    events: Option<Sender<Event>>,
) -> Result<BatchResult> {
    run_items(inputs, batch, events, |input| {
        cancel.check()?;
        let name = input.file_name().ok_or_else(|| {
            Error::Input(format!("Input {} has no file name", input.display()))
        })?;
        let output = output_dir.join(name);
        reproject_raster_file(input, &output, target, opts, cache)?;
        Ok(output)
    })
}

/// Run one operation per input on a bounded pool, collecting outcomes in
/// input order
pub fn run_items<F>(
    inputs: &[PathBuf],
    batch: &BatchOptions,
    events: Option<Sender<Event>>,
    op: F,
) -> Result<BatchResult>
where
    F: Fn(&Path) -> Result<PathBuf> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(batch.max_workers.unwrap_or(0))
        .build()
        .map_err(|e| Error::Resource(format!("Cannot build worker pool: {e}")))?;

    let total = inputs.len();
    send(&events, Event::Started { total });
    let completed = AtomicUsize::new(0);

    let outcomes: Vec<ItemOutcome> = pool.install(|| {
        inputs
            .par_iter()
            .map_with(events.clone(), |ev, input| {
                let item = input.display().to_string();
                let result = match op(input) {
                    Ok(output) => Ok(output),
                    Err(e) => {
                        warn!(input = %item, error = %e, "batch item failed");
                        Err(ItemError::from(&e))
                    }
                };
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                send(ev, Event::Progress {
                    fraction: done as f64 / total.max(1) as f64,
                    item: item.clone(),
                });
                send(ev, Event::ItemDone {
                    item,
                    ok: result.is_ok(),
                });
                ItemOutcome {
                    input: input.clone(),
                    result,
                }
            })
            .collect()
    });

    send(&events, Event::Finished);
    let result = BatchResult { outcomes };
    info!(
        total,
        succeeded = result.succeeded(),
        failed = result.failed(),
        "batch run finished"
    );
    Ok(result)
}

fn send(events: &Option<Sender<Event>>, event: Event) {
    if let Some(sender) = events {
        // Receiver may be gone; progress is best-effort
        let _ = sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_failures_isolated_per_item() {
        let inputs = paths(&["a.tif", "bad.tif", "c.tif"]);
        let result = run_items(&inputs, &BatchOptions::default(), None, |input| {
            if input.to_string_lossy().contains("bad") {
                Err(Error::Input("corrupt".to_string()))
            } else {
                Ok(input.with_extension("out"))
            }
        })
        .unwrap();

        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed(), 1);
        assert!(!result.is_all_ok());
        // Outcomes keep input order
        assert_eq!(result.outcomes[1].input, PathBuf::from("bad.tif"));
        let err = result.outcomes[1].result.as_ref().unwrap_err();
        assert_eq!(err.kind, "input");
    }

    #[test]
    fn test_events_cover_run() {
        let inputs = paths(&["a", "b"]);
        let (tx, rx) = mpsc::channel();
        run_items(&inputs, &BatchOptions::default(), Some(tx), |input| {
            Ok(input.to_path_buf())
        })
        .unwrap();

        let events: Vec<Event> = rx.iter().collect();
        assert!(matches!(events.first(), Some(Event::Started { total: 2 })));
        assert!(matches!(events.last(), Some(Event::Finished)));
        let max_fraction = events
            .iter()
            .filter_map(|e| match e {
                Event::Progress { fraction, .. } => Some(*fraction),
                _ => None,
            })
            .fold(0.0_f64, f64::max);
        assert!((max_fraction - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bounded_pool_single_worker() {
        let inputs = paths(&["a", "b", "c", "d"]);
        let batch = BatchOptions { max_workers: Some(1) };
        let result = run_items(&inputs, &batch, None, |input| Ok(input.to_path_buf())).unwrap();
        assert!(result.is_all_ok());
    }

    #[test]
    fn test_cancelled_items_fail_without_running() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let inputs = paths(&["a", "b"]);
        let result = run_items(&inputs, &BatchOptions::default(), None, |input| {
            cancel.check()?;
            Ok(input.to_path_buf())
        })
        .unwrap();
        assert_eq!(result.failed(), 2);
        for outcome in &result.outcomes {
            assert_eq!(outcome.result.as_ref().unwrap_err().kind, "resource");
        }
    }
}
