//! Wires the pipeline stages of one run together and owns their lifetime

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join4;
use serde::Serialize;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{Instrument, error, info, info_span};

use crate::comparator::{ComparatorPool, ComparisonOutcome, DocumentComparator};
use crate::context::{RunContext, RunMode};
use crate::diff::DiscrepancyReport;
use crate::error::{MigrationError, Result};
use crate::fetcher::InventoryFetcher;
use crate::merger::{IntersectionMerger, MergeOutcome};
use crate::model::AccessionId;
use crate::queue::bounded_queue;

/// Timing of a finished run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    pub total_duration: Duration,
    pub comparisons_per_second: f64,
    pub max_in_flight: usize,
}

/// Final result of a verification run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub mode: String,
    /// Entries listed by each system, duplicates included
    pub old_listed: usize,
    pub new_listed: usize,
    /// Distinct accessions per system after the ignore list
    pub old_inventory: usize,
    pub new_inventory: usize,
    pub common: usize,
    pub only_old: BTreeSet<AccessionId>,
    pub only_new: BTreeSet<AccessionId>,
    pub ignored: usize,
    pub compared: usize,
    pub identical: usize,
    pub discrepancies: Vec<DiscrepancyReport>,
    pub problems: BTreeSet<AccessionId>,
    pub metrics: RunMetrics,
}

impl RunSummary {
    fn from_outcomes(
        context: &RunContext,
        listed: (usize, usize),
        merge: MergeOutcome,
        comparison: ComparisonOutcome,
        elapsed: Duration,
    ) -> Self {
        let seconds = elapsed.as_secs_f64();
        Self {
            run_id: context.run_id.to_string(),
            mode: context.mode.to_string(),
            old_listed: listed.0,
            new_listed: listed.1,
            old_inventory: merge.old_seen,
            new_inventory: merge.new_seen,
            common: merge.common,
            only_old: merge.only_old,
            only_new: merge.only_new,
            ignored: merge.ignored,
            compared: comparison.compared,
            identical: comparison.identical,
            discrepancies: comparison.discrepancies,
            problems: comparison.problems,
            metrics: RunMetrics {
                total_duration: elapsed,
                comparisons_per_second: if seconds > 0.0 {
                    comparison.compared as f64 / seconds
                } else {
                    0.0
                },
                max_in_flight: context.settings.max_in_flight,
            },
        }
    }

    /// Number of distinct accessions with at least one discrepancy
    pub fn accessions_with_discrepancies(&self) -> usize {
        self.discrepancies
            .iter()
            .map(|report| &report.accession)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Both systems agree on inventory and content, and nothing failed
    pub fn is_clean(&self) -> bool {
        self.only_old.is_empty()
            && self.only_new.is_empty()
            && self.discrepancies.is_empty()
            && self.problems.is_empty()
    }
}

/// Aborts every tracked task when dropped, whether the run succeeded or not
#[derive(Default)]
struct TaskGuard {
    handles: Vec<AbortHandle>,
}

impl TaskGuard {
    fn spawn<F>(&mut self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(future.in_current_span());
        self.handles.push(handle.abort_handle());
        handle
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn join_stage<T>(stage: &'static str, handle: JoinHandle<Result<T>>) -> Result<T> {
    handle.await.map_err(|e| MigrationError::Concurrency {
        details: format!("{} task failed: {}", stage, e),
    })?
}

/// One verification run over a [`RunContext`]
pub struct MigrationRun {
    context: RunContext,
}

impl MigrationRun {
    pub fn new(context: RunContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let span = info_span!("run", run_id = %self.context.run_id, mode = %self.context.mode);
        async {
            info!(
                old = %self.context.old.base_url,
                old_format = %self.context.old.format,
                new = %self.context.new.base_url,
                new_format = %self.context.new.format,
                "Starting migration verification"
            );
            let result = match &self.context.mode {
                RunMode::SingleAccession(accession) => self.run_single(accession).await,
                RunMode::Full | RunMode::InventoryOnly => self.run_pipeline().await,
            };
            if let Err(e) = &result {
                error!(error = %e, "Migration verification failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let context = &self.context;
        let settings = &context.settings;

        let (old_tx, old_rx) =
            bounded_queue("old", settings.queue_capacity, settings.backpressure_delay);
        let (new_tx, new_rx) =
            bounded_queue("new", settings.queue_capacity, settings.backpressure_delay);
        let (common_tx, common_rx) =
            bounded_queue("common", settings.queue_capacity, settings.backpressure_delay);

        let old_fetcher = InventoryFetcher::new(
            context.old.clone(),
            Arc::clone(&context.source),
            settings.page_size,
            settings.page_concurrency(context.old.format),
        );
        let new_fetcher = InventoryFetcher::new(
            context.new.clone(),
            Arc::clone(&context.source),
            settings.page_size,
            settings.page_concurrency(context.new.format),
        );
        let merger = IntersectionMerger::new(Arc::clone(&context.ignore_list), settings.idle_poll);
        let pool = ComparatorPool::new(
            Arc::new(DocumentComparator::from_context(context)),
            settings.max_in_flight,
            context.mode == RunMode::Full,
            settings.idle_poll,
        );

        let mut guard = TaskGuard::default();
        let old_task = guard.spawn(old_fetcher.run(old_tx));
        let new_task = guard.spawn(new_fetcher.run(new_tx));
        let merge_task = guard.spawn(merger.run(old_rx, new_rx, common_tx));
        let compare_task = guard.spawn(pool.run(common_rx));

        let (old_listed, new_listed, merge, comparison) = try_join4(
            join_stage("old fetcher", old_task),
            join_stage("new fetcher", new_task),
            join_stage("merger", merge_task),
            join_stage("comparator", compare_task),
        )
        .await?;
        drop(guard);

        let summary = RunSummary::from_outcomes(
            context,
            (old_listed, new_listed),
            merge,
            comparison,
            start.elapsed(),
        );
        info!(
            common = summary.common,
            compared = summary.compared,
            discrepancies = summary.discrepancies.len(),
            problems = summary.problems.len(),
            elapsed_ms = summary.metrics.total_duration.as_millis() as u64,
            "Migration verification finished"
        );
        Ok(summary)
    }

    /// Compare one accession end to end without crawling either system
    async fn run_single(&self, accession: &AccessionId) -> Result<RunSummary> {
        let start = Instant::now();
        let comparator = DocumentComparator::from_context(&self.context);

        let mut comparison = ComparisonOutcome {
            received: 1,
            ..Default::default()
        };
        let result = comparator.compare_accession(accession).await;
        comparison.record(accession.clone(), result);

        let merge = MergeOutcome {
            common: 1,
            old_seen: 1,
            new_seen: 1,
            ..Default::default()
        };
        Ok(RunSummary::from_outcomes(
            &self.context,
            (1, 1),
            merge,
            comparison.finalize(),
            start.elapsed(),
        ))
    }
}
