//! Paginated accession inventory of one target system

use std::sync::Arc;
use std::time::Instant;

use reqwest::Url;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::context::{SystemEndpoint, SystemSide};
use crate::converter::SourceFormat;
use crate::envelope::{self, InventoryPage};
use crate::error::{MigrationError, Result};
use crate::http_client::{DocumentSource, build_url};
use crate::model::{AccessionId, RecordKind};
use crate::queue::QueueProducer;

/// Crawl order of the resource families
const FAMILIES: [RecordKind; 2] = [RecordKind::Sample, RecordKind::Group];

/// Crawls `{base}/samples` and `{base}/groups`, feeding every accession into a queue
pub struct InventoryFetcher {
    endpoint: SystemEndpoint,
    source: Arc<dyn DocumentSource>,
    page_size: usize,
    page_concurrency: usize,
}

/// A single page fetch, self-contained so it can run on its own task
#[derive(Debug, Clone)]
struct PageRequest {
    url: Url,
    format: SourceFormat,
    kind: RecordKind,
    page_size: usize,
}

impl InventoryFetcher {
    pub fn new(
        endpoint: SystemEndpoint,
        source: Arc<dyn DocumentSource>,
        page_size: usize,
        page_concurrency: usize,
    ) -> Self {
        Self {
            endpoint,
            source,
            page_size: page_size.max(1),
            page_concurrency: page_concurrency.max(1),
        }
    }

    /// Crawl both families, then mark the queue finished.
    ///
    /// Returns the number of accessions pushed. Any page failure ends the crawl.
    pub async fn run(self, output: QueueProducer<AccessionId>) -> Result<usize> {
        let start = Instant::now();
        let mut total = 0;

        for kind in FAMILIES {
            total += self.crawl_family(kind, &output).await?;
        }

        info!(
            system = %self.endpoint.side,
            accessions = total,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Inventory crawl finished"
        );
        output.finish();
        Ok(total)
    }

    async fn crawl_family(&self, kind: RecordKind, output: &QueueProducer<AccessionId>) -> Result<usize> {
        let format = self.endpoint.format;
        let first_page = format.first_page();

        let probe = fetch_page(Arc::clone(&self.source), self.page_request(kind, first_page)?).await?;
        let total_pages = probe.total_pages;
        info!(
            system = %self.endpoint.side,
            family = %kind.path_segment(),
            pages = total_pages,
            "Started inventory crawl"
        );

        let mut pushed = self.push_accessions(kind, probe.accessions, output).await?;

        // A permit covers a page from its fetch until its accessions are queued
        let semaphore = Arc::new(Semaphore::new(self.page_concurrency));
        let mut pages: JoinSet<Result<(OwnedSemaphorePermit, InventoryPage)>> = JoinSet::new();
        for page in (first_page + 1)..(first_page + total_pages) {
            let request = self.page_request(kind, page)?;
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            pages.spawn(async move {
                let permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| MigrationError::Concurrency {
                        details: format!("Failed to acquire page permit: {}", e),
                    })?;
                let page = fetch_page(source, request).await?;
                Ok((permit, page))
            });
        }

        // Returning early drops the set, which aborts the remaining page tasks
        while let Some(joined) = pages.join_next().await {
            let (permit, page) = joined.map_err(|e| MigrationError::Concurrency {
                details: format!("Page task failed: {}", e),
            })??;
            pushed += self.push_accessions(kind, page.accessions, output).await?;
            drop(permit);
        }

        Ok(pushed)
    }

    fn page_request(&self, kind: RecordKind, page: usize) -> Result<PageRequest> {
        let url = build_url(
            &self.endpoint.base_url,
            &[kind.path_segment()],
            &self
                .endpoint
                .format
                .page_query(page, self.page_size, self.family_filter(kind)),
        )?;
        Ok(PageRequest {
            url,
            format: self.endpoint.format,
            kind,
            page_size: self.page_size,
        })
    }

    /// The legacy old system only lists groups under `query=group`
    fn family_filter(&self, kind: RecordKind) -> &'static str {
        match (self.endpoint.side, self.endpoint.format, kind) {
            (SystemSide::Old, SourceFormat::Xml, RecordKind::Group) => "group",
            _ => "",
        }
    }

    async fn push_accessions(
        &self,
        kind: RecordKind,
        accessions: Vec<AccessionId>,
        output: &QueueProducer<AccessionId>,
    ) -> Result<usize> {
        let mut pushed = 0;
        for accession in accessions {
            if accession.kind() != kind {
                debug!(
                    system = %self.endpoint.side,
                    accession = %accession,
                    family = %kind.path_segment(),
                    "Dropping accession listed under the wrong family"
                );
                continue;
            }
            output.push(accession).await?;
            pushed += 1;
        }
        Ok(pushed)
    }
}

async fn fetch_page(source: Arc<dyn DocumentSource>, request: PageRequest) -> Result<InventoryPage> {
    let start = Instant::now();
    let body = source
        .get_text(request.url.clone(), request.format.media_type())
        .await
        .inspect_err(|e| error!(url = %request.url, error = %e, "Failed to fetch inventory page"))?;

    let page = envelope::parse_inventory_page(request.format, request.kind, &body, request.page_size)
        .map_err(|e| {
            error!(url = %request.url, error = %e, "Malformed inventory page");
            MigrationError::Envelope {
                url: request.url.to_string(),
                details: e.to_string(),
            }
        })?;

    debug!(
        url = %request.url,
        accessions = page.accessions.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Got inventory page"
    );
    Ok(page)
}
