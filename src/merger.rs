//! Intersection of the two inventory streams

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::context::SystemSide;
use crate::error::Result;
use crate::ignore_list::IgnoreList;
use crate::model::AccessionId;
use crate::queue::{QueueConsumer, QueueProducer};

/// Set algebra over the two inventories once both crawls have finished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Accessions pushed to the common queue
    pub common: usize,
    pub only_old: BTreeSet<AccessionId>,
    pub only_new: BTreeSet<AccessionId>,
    /// Inventory entries skipped because they are on the ignore list
    pub ignored: usize,
    pub old_seen: usize,
    pub new_seen: usize,
}

/// Drains both inventory queues and forwards every accession present on both sides
pub struct IntersectionMerger {
    ignore_list: Arc<IgnoreList>,
    idle_poll: Duration,
    seen_old: BTreeSet<AccessionId>,
    seen_new: BTreeSet<AccessionId>,
    ignored: usize,
}

impl IntersectionMerger {
    pub fn new(ignore_list: Arc<IgnoreList>, idle_poll: Duration) -> Self {
        Self {
            ignore_list,
            idle_poll,
            seen_old: BTreeSet::new(),
            seen_new: BTreeSet::new(),
            ignored: 0,
        }
    }

    pub async fn run(
        mut self,
        mut old: QueueConsumer<AccessionId>,
        mut new: QueueConsumer<AccessionId>,
        common: QueueProducer<AccessionId>,
    ) -> Result<MergeOutcome> {
        let mut old_open = true;
        let mut new_open = true;
        let mut emitted = 0;

        while old_open || new_open {
            let observed = tokio::select! {
                item = old.recv(), if old_open => match item {
                    Some(accession) => Some((SystemSide::Old, accession)),
                    None => {
                        old_open = false;
                        None
                    }
                },
                item = new.recv(), if new_open => match item {
                    Some(accession) => Some((SystemSide::New, accession)),
                    None => {
                        new_open = false;
                        None
                    }
                },
                _ = sleep(self.idle_poll) => {
                    // Producers that set their flag but keep a sender alive end here
                    if old_open && old.is_finished() {
                        old_open = false;
                    }
                    if new_open && new.is_finished() {
                        new_open = false;
                    }
                    None
                }
            };

            if let Some((side, accession)) = observed
                && let Some(accession) = self.observe(side, accession)
            {
                debug!(accession = %accession, "Accession present on both systems");
                common.push(accession).await?;
                emitted += 1;
            }
        }

        let outcome = MergeOutcome {
            common: emitted,
            only_old: self.seen_old.difference(&self.seen_new).cloned().collect(),
            only_new: self.seen_new.difference(&self.seen_old).cloned().collect(),
            ignored: self.ignored,
            old_seen: self.seen_old.len(),
            new_seen: self.seen_new.len(),
        };
        info!(
            common = outcome.common,
            only_old = outcome.only_old.len(),
            only_new = outcome.only_new.len(),
            ignored = outcome.ignored,
            "Inventory merge finished"
        );

        common.finish();
        Ok(outcome)
    }

    /// Record one sighting; returns the accession when it has just become common
    fn observe(&mut self, side: SystemSide, accession: AccessionId) -> Option<AccessionId> {
        if self.ignore_list.contains(&accession) {
            self.ignored += 1;
            return None;
        }

        let (mine, theirs) = match side {
            SystemSide::Old => (&mut self.seen_old, &self.seen_new),
            SystemSide::New => (&mut self.seen_new, &self.seen_old),
        };
        if theirs.contains(&accession) && mine.insert(accession.clone()) {
            Some(accession)
        } else {
            mine.insert(accession);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{Polled, bounded_queue};

    fn ids(values: &[&str]) -> Vec<AccessionId> {
        values.iter().map(|v| AccessionId::new(*v)).collect()
    }

    fn set(values: &[&str]) -> BTreeSet<AccessionId> {
        ids(values).into_iter().collect()
    }

    async fn merge(
        old: Vec<AccessionId>,
        new: Vec<AccessionId>,
        ignore: IgnoreList,
    ) -> (MergeOutcome, Vec<AccessionId>) {
        let delay = Duration::from_millis(1);
        let (old_tx, old_rx) = bounded_queue("old", 2, delay);
        let (new_tx, new_rx) = bounded_queue("new", 2, delay);
        let (common_tx, mut common_rx) = bounded_queue("common", 2, delay);

        let feed = |producer: QueueProducer<AccessionId>, items: Vec<AccessionId>| async move {
            for item in items {
                producer.push(item).await?;
            }
            producer.finish();
            Ok::<_, crate::error::MigrationError>(())
        };

        let merger = IntersectionMerger::new(Arc::new(ignore), Duration::from_millis(5));
        let collect = async move {
            let mut emitted = Vec::new();
            loop {
                match common_rx.poll(Duration::from_millis(5)).await {
                    Polled::Item(item) => emitted.push(item),
                    Polled::Idle => continue,
                    Polled::Finished => break,
                }
            }
            emitted
        };

        let (old_fed, new_fed, outcome, emitted) = tokio::join!(
            feed(old_tx, old),
            feed(new_tx, new),
            merger.run(old_rx, new_rx, common_tx),
            collect
        );
        old_fed.unwrap();
        new_fed.unwrap();
        (outcome.unwrap(), emitted)
    }

    #[tokio::test]
    async fn test_set_algebra_with_ignore_list() {
        let (outcome, emitted) = merge(
            ids(&["A", "B", "C", "X"]),
            ids(&["B", "C", "D", "X", "Y"]),
            IgnoreList::parse("X\nY\n"),
        )
        .await;

        let emitted: BTreeSet<_> = emitted.into_iter().collect();
        assert_eq!(emitted, set(&["B", "C"]));
        assert_eq!(outcome.common, 2);
        assert_eq!(outcome.only_old, set(&["A"]));
        assert_eq!(outcome.only_new, set(&["D"]));
        assert_eq!(outcome.ignored, 3);
    }

    #[tokio::test]
    async fn test_each_common_accession_emitted_once() {
        let (outcome, emitted) = merge(
            ids(&["A", "B", "A", "B", "A"]),
            ids(&["B", "A", "B", "A"]),
            IgnoreList::default(),
        )
        .await;

        let mut emitted = emitted;
        emitted.sort();
        assert_eq!(emitted, ids(&["A", "B"]));
        assert_eq!(outcome.common, 2);
        assert!(outcome.only_old.is_empty());
        assert!(outcome.only_new.is_empty());
    }

    #[tokio::test]
    async fn test_one_side_empty() {
        let (outcome, emitted) =
            merge(ids(&["A", "B"]), Vec::new(), IgnoreList::default()).await;
        assert!(emitted.is_empty());
        assert_eq!(outcome.only_old, set(&["A", "B"]));
        assert!(outcome.only_new.is_empty());
    }

    #[tokio::test]
    async fn test_inventory_mismatch_scenario() {
        let (outcome, emitted) = merge(
            ids(&["S1", "S2", "S3"]),
            ids(&["S2", "S3", "S4"]),
            IgnoreList::default(),
        )
        .await;

        let emitted: BTreeSet<_> = emitted.into_iter().collect();
        assert_eq!(emitted, set(&["S2", "S3"]));
        assert_eq!(outcome.only_old, set(&["S1"]));
        assert_eq!(outcome.only_new, set(&["S4"]));
        assert_eq!(outcome.old_seen, 3);
        assert_eq!(outcome.new_seen, 3);
    }

    #[tokio::test]
    async fn test_finished_flag_without_dropped_sender() {
        let delay = Duration::from_millis(1);
        let (old_tx, old_rx) = bounded_queue("old", 4, delay);
        let (new_tx, new_rx) = bounded_queue("new", 4, delay);
        let (common_tx, mut common_rx) = bounded_queue("common", 4, delay);

        old_tx.push(AccessionId::new("A")).await.unwrap();
        new_tx.push(AccessionId::new("A")).await.unwrap();
        // Flags set while both senders stay alive
        old_tx.done_flag().store(true, std::sync::atomic::Ordering::Release);
        new_tx.done_flag().store(true, std::sync::atomic::Ordering::Release);

        let merger = IntersectionMerger::new(Arc::new(IgnoreList::default()), Duration::from_millis(5));
        let outcome = merger.run(old_rx, new_rx, common_tx).await.unwrap();

        assert_eq!(outcome.common, 1);
        assert_eq!(common_rx.recv().await, Some(AccessionId::new("A")));
        assert_eq!(common_rx.recv().await, None);
        drop((old_tx, new_tx));
    }
}
