//! Run-scoped state shared by every stage of one verification run

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::converter::{DocumentConverter, SourceFormat};
use crate::error::{MigrationError, Result};
use crate::http_client::DocumentSource;
use crate::ignore_list::IgnoreList;
use crate::model::AccessionId;

/// Which of the two systems under comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemSide {
    Old,
    New,
}

impl fmt::Display for SystemSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemSide::Old => f.write_str("old"),
            SystemSide::New => f.write_str("new"),
        }
    }
}

/// Base URL of one system and the format it serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemEndpoint {
    pub side: SystemSide,
    pub base_url: Url,
    pub format: SourceFormat,
}

impl SystemEndpoint {
    pub fn new(side: SystemSide, base_url: &str, format: SourceFormat) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| MigrationError::InvalidUrl {
            url: base_url.to_string(),
            details: e.to_string(),
        })?;
        Ok(Self {
            side,
            base_url,
            format,
        })
    }
}

/// What a run does once both inventories are known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Crawl, intersect and compare every common accession
    Full,
    /// Crawl and intersect only
    InventoryOnly,
    /// Compare one accession, skipping the crawl
    SingleAccession(AccessionId),
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Full => f.write_str("full"),
            RunMode::InventoryOnly => f.write_str("inventory-only"),
            RunMode::SingleAccession(accession) => write!(f, "single accession {}", accession),
        }
    }
}

/// Tuning knobs for the pipeline stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub page_size: usize,
    pub xml_page_concurrency: usize,
    pub json_page_concurrency: usize,
    pub queue_capacity: usize,
    pub backpressure_delay: Duration,
    pub idle_poll: Duration,
    pub max_in_flight: usize,
    pub group_page_size: usize,
}

impl PipelineSettings {
    pub fn page_concurrency(&self, format: SourceFormat) -> usize {
        match format {
            SourceFormat::Xml => self.xml_page_concurrency,
            SourceFormat::Json => self.json_page_concurrency,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            page_size: 1000,
            xml_page_concurrency: 4,
            json_page_concurrency: 8,
            queue_capacity: 1024,
            backpressure_delay: Duration::from_millis(10),
            idle_poll: Duration::from_millis(100),
            max_in_flight: num_cpus::get() * 4,
            group_page_size: 1000,
        }
    }
}

/// Everything one run needs; created per run and dropped with it
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub old: SystemEndpoint,
    pub new: SystemEndpoint,
    pub settings: PipelineSettings,
    pub ignore_list: Arc<IgnoreList>,
    pub source: Arc<dyn DocumentSource>,
    pub converter: DocumentConverter,
}

impl RunContext {
    pub fn new(
        mode: RunMode,
        old: SystemEndpoint,
        new: SystemEndpoint,
        settings: PipelineSettings,
        ignore_list: IgnoreList,
        source: Arc<dyn DocumentSource>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            old,
            new,
            settings,
            ignore_list: Arc::new(ignore_list),
            source,
            converter: DocumentConverter::new(),
        }
    }

    /// Build a context from validated configuration, loading the ignore list
    pub async fn from_config(config: &Config, source: Arc<dyn DocumentSource>) -> Result<Self> {
        let old = SystemEndpoint::new(
            SystemSide::Old,
            &config.systems.old.url,
            config.systems.old.format,
        )?;
        let new = SystemEndpoint::new(
            SystemSide::New,
            &config.systems.new.url,
            config.systems.new.format,
        )?;

        let mode = match (&config.test_accession, config.comparison.enabled) {
            (Some(accession), _) => RunMode::SingleAccession(AccessionId::parse(accession)?),
            (None, true) => RunMode::Full,
            (None, false) => RunMode::InventoryOnly,
        };

        let ignore_list = IgnoreList::load(config.ignore_list.as_deref()).await?;

        Ok(Self::new(
            mode,
            old,
            new,
            config.pipeline_settings(),
            ignore_list,
            source,
        ))
    }

    pub fn endpoint(&self, side: SystemSide) -> &SystemEndpoint {
        match side {
            SystemSide::Old => &self.old,
            SystemSide::New => &self.new,
        }
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("mode", &self.mode)
            .field("old", &self.old)
            .field("new", &self.new)
            .field("settings", &self.settings)
            .field("ignored", &self.ignore_list.len())
            .finish_non_exhaustive()
    }
}
