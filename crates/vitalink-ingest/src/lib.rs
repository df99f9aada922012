//! Vitalink Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Resilient ingestion of lab reports: parsed biomarker readings and genotype
//! calls are persisted under transient failures, unknown conflicts and
//! partially malformed records without ever failing the caller outright.
//!
//! # Components
//!
//! - **Retry executor** ([`recovery`]): bounded attempts, linear backoff,
//!   optional one-shot fallback
//! - **Bulk writer** ([`writer`]): batch insert, then upsert, then
//!   record-by-record
//! - **Orchestrator** ([`orchestrator`]): extraction, parsing, storage and
//!   status update for one document
//!
//! Backends are traits ([`storage`], [`parser`], [`extract`]) with Postgres,
//! HTTP and file implementations.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vitalink_ingest::{
//!     db, BiomarkerRecord, DocumentExtractor, HttpReportParser, IngestConfig, IngestOrchestrator,
//!     ReportMetadata, SnpRecord, SourceDocument,
//! };
//! use vitalink_ingest::storage::{PgRecordStore, PgReportStatusStore, PgVariantCatalog};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let pool = db::create_pool(&config.database).await?;
//!
//!     let orchestrator = IngestOrchestrator::new(
//!         Arc::new(HttpReportParser::new(config.parser.http_config())?),
//!         Arc::new(PgRecordStore::<BiomarkerRecord>::new(pool.clone())),
//!         Arc::new(PgRecordStore::<SnpRecord>::new(pool.clone())),
//!         Arc::new(PgVariantCatalog::new(pool.clone())),
//!         Arc::new(PgReportStatusStore::new(pool)),
//!         config.recovery.orchestrator_config(),
//!     );
//!
//!     let document = SourceDocument::from_path("labs.csv").await?;
//!     let metadata = ReportMetadata {
//!         user_id: uuid::Uuid::new_v4(),
//!         report_id: uuid::Uuid::new_v4(),
//!         report_type: "blood".parse()?,
//!     };
//!
//!     let result = orchestrator.ingest(&document, &metadata, &DocumentExtractor).await;
//!     println!("{}", result.summary_message());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod events;
pub mod extract;
pub mod mapping;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod recovery;
pub mod storage;
pub mod writer;

pub use config::IngestConfig;
pub use events::{EventSink, MemoryEventSink, RecoveryEvent, TracingEventSink, WriteTier};
pub use extract::{ContentExtractor, DocumentExtractor, ExtractError};
pub use models::{
    BiomarkerRecord, FileProcessingResult, ParsedBiomarker, ParsedReport, ParsedSnp, ReportMetadata,
    SnpRecord, SourceDocument, SupportedSnp,
};
pub use orchestrator::{IngestOrchestrator, OrchestratorConfig};
pub use parser::{HttpParserConfig, HttpReportParser, ParseError, ReportParser};
pub use recovery::{RecoveryResult, RetryExecutor, RetryPolicy};
pub use storage::{ConflictKey, RecordStore, ReportStatusStore, StoreError, VariantCatalog};
pub use writer::{BulkWriter, WriterConfig};
