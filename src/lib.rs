//! # sample-migration-verifier
//!
//! Verifies a migration between two versions of a sample metadata service: crawls the
//! accession inventory of both systems concurrently, intersects them, and compares every
//! common record field by field.

pub mod cli;
pub mod comparator;
pub mod config;
pub mod context;
pub mod converter;
pub mod diff;
pub mod envelope;
pub mod error;
pub mod error_reporter;
pub mod fetcher;
pub mod http_client;
pub mod ignore_list;
pub mod merger;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod queue;

pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use comparator::{ComparatorPool, ComparisonOutcome, DocumentComparator};
pub use config::{Config, ConfigError, ConfigManager, EnvProvider, SystemEnvProvider};
pub use context::{PipelineSettings, RunContext, RunMode, SystemEndpoint, SystemSide};
pub use converter::{DocumentConverter, DocumentTag, SourceFormat};
pub use diff::{DiscrepancyKind, DiscrepancyReport, FieldCategory, compare};
pub use error::{ConversionError, MigrationError, ModelError, Result};
pub use error_reporter::ErrorReporter;
pub use fetcher::InventoryFetcher;
pub use http_client::{AsyncHttpClient, DocumentSource, HttpClientConfig};
pub use ignore_list::IgnoreList;
pub use merger::{IntersectionMerger, MergeOutcome};
pub use model::{
    AccessionId, Attribute, Contact, ExternalReference, Organization, Publication, Record,
    RecordKind, Relationship,
};
pub use orchestrator::{MigrationRun, RunMetrics, RunSummary};
pub use output::Output;
pub use queue::{Polled, QueueConsumer, QueueProducer, bounded_queue};
