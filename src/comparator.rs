//! Per-accession document comparison and the bounded pool that drives it

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};

use crate::context::{RunContext, SystemEndpoint};
use crate::converter::{DocumentConverter, DocumentTag};
use crate::diff::{self, DiscrepancyReport};
use crate::envelope;
use crate::error::{MigrationError, Result};
use crate::http_client::{DocumentSource, build_url};
use crate::model::{AccessionId, Record, RecordKind, Relationship};
use crate::queue::{Polled, QueueConsumer};

/// Relationship type synthesized for each member of a group
pub const HAS_MEMBER: &str = "has member";

/// Fetches one accession from both systems and diffs the two records
pub struct DocumentComparator {
    old: SystemEndpoint,
    new: SystemEndpoint,
    source: Arc<dyn DocumentSource>,
    converter: DocumentConverter,
    group_page_size: usize,
}

impl DocumentComparator {
    pub fn new(
        old: SystemEndpoint,
        new: SystemEndpoint,
        source: Arc<dyn DocumentSource>,
        group_page_size: usize,
    ) -> Self {
        Self {
            old,
            new,
            source,
            converter: DocumentConverter::new(),
            group_page_size: group_page_size.max(1),
        }
    }

    pub fn from_context(context: &RunContext) -> Self {
        Self {
            old: context.old.clone(),
            new: context.new.clone(),
            source: Arc::clone(&context.source),
            converter: context.converter,
            group_page_size: context.settings.group_page_size.max(1),
        }
    }

    pub async fn compare_accession(&self, accession: &AccessionId) -> Result<Vec<DiscrepancyReport>> {
        let (old_record, new_record) = tokio::try_join!(
            self.load_record(&self.old, accession),
            self.load_record(&self.new, accession)
        )?;
        Ok(diff::compare(accession, &old_record, &new_record))
    }

    /// Fetch and convert one record; groups get their membership resolved as relationships
    pub async fn load_record(&self, endpoint: &SystemEndpoint, accession: &AccessionId) -> Result<Record> {
        let kind = accession.kind();
        let url = build_url(
            &endpoint.base_url,
            &[kind.path_segment(), accession.as_str()],
            &[],
        )?;
        let body = self.source.get_text(url, endpoint.format.media_type()).await?;
        let mut record = self
            .converter
            .convert(DocumentTag::new(endpoint.format, kind), &body)?;

        if kind == RecordKind::Group {
            for member in self.group_members(endpoint, accession).await? {
                record.relationships.insert(Relationship::new(
                    accession.as_str(),
                    HAS_MEMBER,
                    member.as_str(),
                )?);
            }
        }
        Ok(record)
    }

    /// Walk `/groupsamples/{accession}` until the reported offset reaches the total.
///
/// A page that does not move the offset forward fails the walk.
    async fn group_members(
        &self,
        endpoint: &SystemEndpoint,
        accession: &AccessionId,
    ) -> Result<BTreeSet<AccessionId>> {
        let mut members = BTreeSet::new();
        let mut page = endpoint.format.first_page();
        let mut reached: Option<usize> = None;

        loop {
            let url = build_url(
                &endpoint.base_url,
                &["groupsamples", accession.as_str()],
                &membership_query(page, self.group_page_size),
            )?;
            let body = self
                .source
                .get_text(url.clone(), endpoint.format.media_type())
                .await?;
            let parsed = envelope::parse_membership_page(endpoint.format, &body).map_err(|e| {
                MigrationError::Envelope {
                    url: url.to_string(),
                    details: e.to_string(),
                }
            })?;

            let exhausted = parsed.is_last() || parsed.members.is_empty();
            if !exhausted && reached.is_some_and(|previous| parsed.to <= previous) {
                return Err(MigrationError::Envelope {
                    url: url.to_string(),
                    details: format!(
                        "membership offset stuck at {} of {} on page {}",
                        parsed.to, parsed.total, page
                    ),
                });
            }
            reached = Some(parsed.to);
            members.extend(parsed.members);
            if exhausted {
                break;
            }
            page += 1;
        }

        debug!(
            system = %endpoint.side,
            accession = %accession,
            members = members.len(),
            "Resolved group membership"
        );
        Ok(members)
    }
}

/// Membership listings take the legacy `pagesize`/`query` parameters on both systems
fn membership_query(page: usize, page_size: usize) -> Vec<(&'static str, String)> {
    vec![
        ("page", page.to_string()),
        ("pagesize", page_size.to_string()),
        ("query", String::new()),
    ]
}

/// Everything the comparison stage learned during one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ComparisonOutcome {
    /// Common accessions taken off the queue
    pub received: usize,
    /// Accessions compared without error
    pub compared: usize,
    /// Compared accessions with no discrepancies
    pub identical: usize,
    pub discrepancies: Vec<DiscrepancyReport>,
    /// Accessions whose comparison failed
    pub problems: BTreeSet<AccessionId>,
}

impl ComparisonOutcome {
    /// Fold one finished comparison into the outcome
    pub fn record(&mut self, accession: AccessionId, result: Result<Vec<DiscrepancyReport>>) {
        match result {
            Ok(reports) => {
                self.compared += 1;
                if reports.is_empty() {
                    self.identical += 1;
                }
                for report in &reports {
                    warn!(
                        accession = %report.accession,
                        category = %report.category,
                        key = %report.key,
                        kind = %report.kind,
                        old = report.old.as_deref().unwrap_or("<none>"),
                        new = report.new.as_deref().unwrap_or("<none>"),
                        "Discrepancy"
                    );
                }
                self.discrepancies.extend(reports);
            }
            Err(error) => {
                warn!(accession = %accession, error = %error, "Problem comparing accession");
                self.problems.insert(accession);
            }
        }
    }

    /// Sort discrepancies into a stable order for reporting
    pub fn finalize(mut self) -> Self {
        self.discrepancies.sort();
        self
    }
}

/// Drains the common queue, running comparisons with at most `max_in_flight` unresolved
pub struct ComparatorPool {
    comparator: Arc<DocumentComparator>,
    max_in_flight: usize,
    compare: bool,
    idle_poll: Duration,
}

type ComparisonTask = (AccessionId, Result<Vec<DiscrepancyReport>>);

impl ComparatorPool {
    pub fn new(
        comparator: Arc<DocumentComparator>,
        max_in_flight: usize,
        compare: bool,
        idle_poll: Duration,
    ) -> Self {
        Self {
            comparator,
            max_in_flight: max_in_flight.max(1),
            compare,
            idle_poll,
        }
    }

    pub async fn run(self, mut common: QueueConsumer<AccessionId>) -> Result<ComparisonOutcome> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks: JoinSet<ComparisonTask> = JoinSet::new();
        let mut in_flight: HashMap<task::Id, AccessionId> = HashMap::new();
        let mut outcome = ComparisonOutcome::default();

        loop {
            let accession = match common.poll(self.idle_poll).await {
                Polled::Item(accession) => accession,
                Polled::Idle => {
                    Self::reap_ready(&mut tasks, &mut in_flight, &mut outcome);
                    continue;
                }
                Polled::Finished => break,
            };
            outcome.received += 1;

            if !self.compare {
                continue;
            }

            // Wait for a slot before taking on more work
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| MigrationError::Concurrency {
                    details: format!("Failed to acquire comparison permit: {}", e),
                })?;
            let comparator = Arc::clone(&self.comparator);
            let task_accession = accession.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                let result = comparator.compare_accession(&task_accession).await;
                (task_accession, result)
            });
            in_flight.insert(handle.id(), accession);

            Self::reap_ready(&mut tasks, &mut in_flight, &mut outcome);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            Self::absorb(joined, &mut in_flight, &mut outcome);
        }

        info!(
            received = outcome.received,
            compared = outcome.compared,
            identical = outcome.identical,
            discrepancies = outcome.discrepancies.len(),
            problems = outcome.problems.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Comparison finished"
        );
        Ok(outcome.finalize())
    }

    fn reap_ready(
        tasks: &mut JoinSet<ComparisonTask>,
        in_flight: &mut HashMap<task::Id, AccessionId>,
        outcome: &mut ComparisonOutcome,
    ) {
        while let Some(joined) = tasks.try_join_next_with_id() {
            Self::absorb(joined, in_flight, outcome);
        }
    }

    fn absorb(
        joined: std::result::Result<(task::Id, ComparisonTask), task::JoinError>,
        in_flight: &mut HashMap<task::Id, AccessionId>,
        outcome: &mut ComparisonOutcome,
    ) {
        match joined {
            Ok((id, (accession, result))) => {
                in_flight.remove(&id);
                outcome.record(accession, result);
            }
            Err(join_error) => {
                // A panicking comparison is a problem accession like any other failure
                if let Some(accession) = in_flight.remove(&join_error.id()) {
                    outcome.record(
                        accession,
                        Err(MigrationError::Concurrency {
                            details: format!("Comparison task failed: {}", join_error),
                        }),
                    );
                }
            }
        }
    }
}
