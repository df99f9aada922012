//! Ingestion orchestrator
//!
//! Runs one document through extraction, parsing, biomarker storage, SNP
//! storage and the report status update, strictly in that order. Every
//! stage degrades instead of failing; what went wrong ends up in
//! [`FileProcessingResult::issues`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use vitalink_common::ProcessingStatus;

use crate::extract::{read_as_plain_text, ContentExtractor};
use crate::mapping::{map_biomarkers, resolve_snps, BIOMARKER_CONFLICT_KEY, SNP_CONFLICT_KEY};
use crate::models::{
    BiomarkerRecord, FileProcessingResult, ParsedReport, ReportMetadata, SnpRecord, SourceDocument,
    SupportedSnp,
};
use crate::parser::ReportParser;
use crate::recovery::{RecoveryResult, RetryExecutor, RetryPolicy};
use crate::storage::{ConflictKey, RecordStore, ReportStatusStore, VariantCatalog};
use crate::writer::{BulkWriter, WriterConfig};

pub const DEFAULT_EXTRACT_MAX_RETRIES: u32 = 2;

pub const DEFAULT_PARSE_MAX_RETRIES: u32 = 2;

/// Extracted text shorter than this (trimmed, in chars) is not parsed
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 10;

pub const ISSUE_EXTRACTION_FALLBACK: &str = "File extraction required fallback method";
pub const ISSUE_EXTRACTION_FAILED: &str = "Failed to extract content from file";
pub const ISSUE_CONTENT_TOO_SHORT: &str = "File appears to be empty or corrupted";
pub const ISSUE_PARSE_FAILED: &str = "Failed to parse report content";
pub const ISSUE_CATALOG_UNAVAILABLE: &str =
    "Supported SNP catalog unavailable; storing raw identifiers";

const EXTRACTION: &str = "File extraction";
const PARSING: &str = "Report parsing";
const CATALOG: &str = "SNP catalog lookup";
const BIOMARKER_STORAGE: &str = "Biomarker storage";
const SNP_STORAGE: &str = "SNP storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub extract_policy: RetryPolicy,
    pub parse_policy: RetryPolicy,
    pub catalog_policy: RetryPolicy,
    pub writer: WriterConfig,
    pub min_content_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            extract_policy: RetryPolicy::default().with_max_retries(DEFAULT_EXTRACT_MAX_RETRIES),
            parse_policy: RetryPolicy::default().with_max_retries(DEFAULT_PARSE_MAX_RETRIES),
            catalog_policy: RetryPolicy::default(),
            writer: WriterConfig::default(),
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
        }
    }
}

pub type BiomarkerStore = Arc<dyn RecordStore<BiomarkerRecord>>;
pub type SnpStore = Arc<dyn RecordStore<SnpRecord>>;

pub struct IngestOrchestrator {
    parser: Arc<dyn ReportParser>,
    biomarkers: BulkWriter<BiomarkerStore>,
    snps: BulkWriter<SnpStore>,
    catalog: Arc<dyn VariantCatalog>,
    status: Arc<dyn ReportStatusStore>,
    executor: RetryExecutor,
    config: OrchestratorConfig,
    biomarker_key: Option<ConflictKey>,
    snp_key: Option<ConflictKey>,
}

impl IngestOrchestrator {
    pub fn new(
        parser: Arc<dyn ReportParser>,
        biomarker_store: BiomarkerStore,
        snp_store: SnpStore,
        catalog: Arc<dyn VariantCatalog>,
        status: Arc<dyn ReportStatusStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self::with_executor(
            parser,
            biomarker_store,
            snp_store,
            catalog,
            status,
            config,
            RetryExecutor::default(),
        )
    }

    /// Same as [`new`](Self::new) with a caller-supplied executor (and so
    /// event sink) shared by every stage
    pub fn with_executor(
        parser: Arc<dyn ReportParser>,
        biomarker_store: BiomarkerStore,
        snp_store: SnpStore,
        catalog: Arc<dyn VariantCatalog>,
        status: Arc<dyn ReportStatusStore>,
        config: OrchestratorConfig,
        executor: RetryExecutor,
    ) -> Self {
        Self {
            parser,
            biomarkers: BulkWriter::new(biomarker_store, executor.clone(), config.writer),
            snps: BulkWriter::new(snp_store, executor.clone(), config.writer),
            catalog,
            status,
            executor,
            config,
            biomarker_key: BIOMARKER_CONFLICT_KEY.parse().ok(),
            snp_key: SNP_CONFLICT_KEY.parse().ok(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Ingest one document. Never fails; inspect the returned counts and
    /// issues instead.
    #[instrument(
        skip_all,
        fields(
            document = %document.name,
            user_id = %metadata.user_id,
            report_id = %metadata.report_id,
            report_type = %metadata.report_type
        )
    )]
    pub async fn ingest(
        &self,
        document: &SourceDocument,
        metadata: &ReportMetadata,
        extractor: &dyn ContentExtractor,
    ) -> FileProcessingResult {
        let mut result = FileProcessingResult::new();

        // Extraction
        let Some(content) = self.extract(document, extractor, &mut result).await else {
            return result;
        };

        if content.trim().chars().count() < self.config.min_content_chars {
            warn!(chars = content.trim().chars().count(), "Extracted content too short");
            result.issue(ISSUE_CONTENT_TOO_SHORT);
            return result;
        }

        // Parsing
        let parsed = self
            .executor
            .run(PARSING, &self.config.parse_policy, || {
                self.parser.parse(&content, metadata.report_type)
            })
            .await;
        result.recovered |= parsed.is_recovered();

        let Some(report) = parsed.into_data() else {
            result.issue(ISSUE_PARSE_FAILED);
            return result;
        };

        info!(
            biomarkers = report.biomarkers.len(),
            snps = report.snps.len(),
            "Report content parsed"
        );

        // Storage
        self.store_biomarkers(&report, metadata, &mut result).await;
        self.store_snps(&report, metadata, &mut result).await;

        // Status
        let status = self
            .status
            .update_status(metadata.report_id, ProcessingStatus::Completed)
            .await;
        result.absorb("Status update failed", status);

        info!(
            biomarkers = result.biomarkers,
            snps = result.snps,
            recovered = result.recovered,
            issues = result.issues.len(),
            "Ingestion finished"
        );

        result
    }

    async fn extract(
        &self,
        document: &SourceDocument,
        extractor: &dyn ContentExtractor,
        result: &mut FileProcessingResult,
    ) -> Option<String> {
        let used_fallback = AtomicBool::new(false);

        let extracted = self
            .executor
            .run_with_fallback(
                EXTRACTION,
                &self.config.extract_policy,
                || extractor.extract(document),
                || {
                    used_fallback.store(true, Ordering::SeqCst);
                    async { read_as_plain_text(document) }
                },
            )
            .await;

        result.recovered |= extracted.is_recovered();

        match extracted.into_data() {
            Some(content) => {
                if used_fallback.load(Ordering::SeqCst) {
                    result.issue(ISSUE_EXTRACTION_FALLBACK);
                }
                Some(content)
            },
            None => {
                result.issue(ISSUE_EXTRACTION_FAILED);
                None
            },
        }
    }

    async fn store_biomarkers(
        &self,
        report: &ParsedReport,
        metadata: &ReportMetadata,
        result: &mut FileProcessingResult,
    ) {
        if report.biomarkers.is_empty() {
            return;
        }

        let records = map_biomarkers(&report.biomarkers, metadata);
        let written = self
            .biomarkers
            .write_with_recovery(&records, self.biomarker_key.as_ref(), BIOMARKER_STORAGE)
            .await;

        let stored = tally(written, result);
        result.biomarkers += stored;
    }

    async fn store_snps(
        &self,
        report: &ParsedReport,
        metadata: &ReportMetadata,
        result: &mut FileProcessingResult,
    ) {
        if report.snps.is_empty() {
            return;
        }

        let catalog = self.load_catalog(result).await;
        let resolved = resolve_snps(&report.snps, metadata, &catalog);

        if resolved.skipped > 0 {
            result.issue(format!(
                "Skipped {} genetic marker(s) without an identifier or gene",
                resolved.skipped
            ));
        }

        let written = self
            .snps
            .write_with_recovery(&resolved.records, self.snp_key.as_ref(), SNP_STORAGE)
            .await;

        let stored = tally(written, result);
        result.snps += stored;
    }

    /// Loaded once per ingestion; an unreachable catalog means every SNP
    /// is stored unmatched.
    async fn load_catalog(&self, result: &mut FileProcessingResult) -> Vec<SupportedSnp> {
        let catalog = self
            .executor
            .run(CATALOG, &self.config.catalog_policy, || self.catalog.supported_variants())
            .await;

        result.recovered |= catalog.is_recovered();
        catalog.into_data().unwrap_or_else(|| {
            result.issue(ISSUE_CATALOG_UNAVAILABLE);
            Vec::new()
        })
    }
}

/// Count stored rows; degraded or failed writes leave their message as an issue
fn tally<R>(written: RecoveryResult<Vec<R>>, result: &mut FileProcessingResult) -> usize {
    result.recovered |= written.is_recovered();

    if written.is_recovered() || !written.is_success() {
        if let Some(message) = written.message() {
            result.issue(message);
        }
    }

    written.into_data().map(|rows| rows.len()).unwrap_or(0)
}
