//! In-memory backends for orchestrator and writer tests
//!
//! Every fake counts its calls and can be scripted to fail, so tests can
//! assert both outcomes and which stages actually ran.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use vitalink_common::{ProcessingStatus, ReportType};
use vitalink_ingest::{
    BiomarkerRecord, ConflictKey, ContentExtractor, ExtractError, IngestOrchestrator,
    MemoryEventSink, OrchestratorConfig, ParseError, ParsedBiomarker, ParsedReport, ParsedSnp,
    RecordStore, ReportMetadata, ReportParser, ReportStatusStore, RetryExecutor, RetryPolicy,
    SnpRecord, SourceDocument, StoreError, SupportedSnp, VariantCatalog, WriterConfig,
};

// ============================================================================
// Record store
// ============================================================================

type Predicate<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;

pub struct MemoryRecordStore<R> {
    rows: Mutex<Vec<R>>,
    calls: Mutex<Vec<&'static str>>,
    batch_fails: bool,
    upsert_fails: bool,
    reject: Option<Predicate<R>>,
}

impl<R> Default for MemoryRecordStore<R> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            batch_fails: false,
            upsert_fails: false,
            reject: None,
        }
    }
}

impl<R: Clone> MemoryRecordStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_batch(mut self) -> Self {
        self.batch_fails = true;
        self
    }

    pub fn failing_upsert(mut self) -> Self {
        self.upsert_fails = true;
        self
    }

    /// Single-record inserts fail for records matching `predicate`
    pub fn rejecting(mut self, predicate: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.reject = Some(Box::new(predicate));
        self
    }

    pub fn rows(&self) -> Vec<R> {
        self.rows.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn is_rejected(&self, record: &R) -> bool {
        self.reject.as_ref().map(|p| p(record)).unwrap_or(false)
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> RecordStore<R> for MemoryRecordStore<R> {
    async fn insert_batch(&self, records: &[R]) -> Result<Vec<R>, StoreError> {
        self.log("batch");
        if self.batch_fails {
            let message = "duplicate key value violates unique constraint";
            return Err(StoreError::Rejected(message.into()));
        }
        self.rows.lock().unwrap().extend_from_slice(records);
        Ok(records.to_vec())
    }

    async fn upsert(
        &self,
        records: &[R],
        _conflict_key: &ConflictKey,
    ) -> Result<Vec<R>, StoreError> {
        self.log("upsert");
        if self.upsert_fails {
            let message =
                "there is no unique or exclusion constraint matching the ON CONFLICT specification";
            return Err(StoreError::Rejected(message.into()));
        }
        self.rows.lock().unwrap().extend_from_slice(records);
        Ok(records.to_vec())
    }

    async fn insert_one(&self, record: &R) -> Result<R, StoreError> {
        self.log("one");
        if self.is_rejected(record) {
            return Err(StoreError::Rejected("value too long".into()));
        }
        self.rows.lock().unwrap().push(record.clone());
        Ok(record.clone())
    }
}

// ============================================================================
// Parser
// ============================================================================

pub struct FakeParser {
    report: ParsedReport,
    failures: u32,
    calls: AtomicU32,
}

impl FakeParser {
    pub fn returning(report: ParsedReport) -> Self {
        Self {
            report,
            failures: 0,
            calls: AtomicU32::new(0),
        }
    }

    /// Fails the first `failures` calls
    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportParser for FakeParser {
    async fn parse(
        &self,
        _content: &str,
        _report_type: ReportType,
    ) -> Result<ParsedReport, ParseError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(ParseError::Status {
                status: 503,
                body: "model overloaded".into(),
            });
        }
        Ok(self.report.clone())
    }
}

// ============================================================================
// Extractor
// ============================================================================

pub struct FakeExtractor {
    content: Option<String>,
    failures: u32,
    calls: AtomicU32,
}

impl FakeExtractor {
    pub fn returning(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            failures: 0,
            calls: AtomicU32::new(0),
        }
    }

    /// Never succeeds
    pub fn broken() -> Self {
        Self {
            content: None,
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentExtractor for FakeExtractor {
    async fn extract(&self, _document: &SourceDocument) -> Result<String, ExtractError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.content {
            Some(content) if call > self.failures => Ok(content.clone()),
            _ => Err(ExtractError::UnsupportedFormat("pdf".into())),
        }
    }
}

// ============================================================================
// Catalog and status
// ============================================================================

pub struct FakeCatalog {
    variants: Option<Vec<SupportedSnp>>,
    failures: u32,
    calls: AtomicU32,
}

impl FakeCatalog {
    pub fn with(variants: Vec<SupportedSnp>) -> Self {
        Self {
            variants: Some(variants),
            failures: 0,
            calls: AtomicU32::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            variants: None,
            failures: 0,
            calls: AtomicU32::new(0),
        }
    }

    /// Fails the first `failures` lookups
    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VariantCatalog for FakeCatalog {
    async fn supported_variants(&self) -> Result<Vec<SupportedSnp>, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.variants {
            Some(variants) if call > self.failures => Ok(variants.clone()),
            _ => Err(StoreError::Rejected("relation \"supported_snps\" does not exist".into())),
        }
    }
}

#[derive(Default)]
pub struct FakeStatusStore {
    fails: bool,
    updates: Mutex<Vec<(Uuid, ProcessingStatus)>>,
}

impl FakeStatusStore {
    pub fn failing() -> Self {
        Self {
            fails: true,
            ..Default::default()
        }
    }

    pub fn updates(&self) -> Vec<(Uuid, ProcessingStatus)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportStatusStore for FakeStatusStore {
    async fn update_status(
        &self,
        report_id: Uuid,
        status: ProcessingStatus,
    ) -> Result<(), StoreError> {
        if self.fails {
            return Err(StoreError::ReportNotFound(report_id));
        }
        self.updates.lock().unwrap().push((report_id, status));
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn metadata(report_type: ReportType) -> ReportMetadata {
    ReportMetadata {
        user_id: Uuid::new_v4(),
        report_id: Uuid::new_v4(),
        report_type,
    }
}

pub fn biomarker(name: &str, value: &str, unit: &str) -> ParsedBiomarker {
    ParsedBiomarker {
        marker_name: Some(name.to_string()),
        value: Some(value.to_string()),
        unit: Some(unit.to_string()),
        reference_range: None,
    }
}

pub fn snp(snp_id: Option<&str>, gene: Option<&str>, genotype: &str) -> ParsedSnp {
    ParsedSnp {
        snp_id: snp_id.map(String::from),
        gene_name: gene.map(String::from),
        genotype: Some(genotype.to_string()),
    }
}

pub fn five_biomarkers() -> ParsedReport {
    ParsedReport {
        biomarkers: vec![
            biomarker("Vitamin D", "32", "ng/mL"),
            biomarker("Ferritin", "80", "ng/mL"),
            biomarker("Hemoglobin A1c", "5.4", "%"),
            biomarker("TSH", "2.1", "mIU/L"),
            biomarker("LDL Cholesterol", "96", "mg/dL"),
        ],
        snps: Vec::new(),
    }
}

/// Lab-report-looking text of roughly `len` characters
pub fn report_text(len: usize) -> String {
    "Vitamin D 32 ng/mL (30-100)\n".repeat(len / 28 + 1).chars().take(len).collect()
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub parser: Arc<FakeParser>,
    pub biomarkers: Arc<MemoryRecordStore<BiomarkerRecord>>,
    pub snps: Arc<MemoryRecordStore<SnpRecord>>,
    pub catalog: Arc<FakeCatalog>,
    pub status: Arc<FakeStatusStore>,
    pub events: MemoryEventSink,
    pub orchestrator: IngestOrchestrator,
}

pub struct HarnessBuilder {
    parser: FakeParser,
    biomarkers: MemoryRecordStore<BiomarkerRecord>,
    snps: MemoryRecordStore<SnpRecord>,
    catalog: FakeCatalog,
    status: FakeStatusStore,
}

impl Harness {
    pub fn builder(report: ParsedReport) -> HarnessBuilder {
        HarnessBuilder {
            parser: FakeParser::returning(report),
            biomarkers: MemoryRecordStore::new(),
            snps: MemoryRecordStore::new(),
            catalog: FakeCatalog::with(Vec::new()),
            status: FakeStatusStore::default(),
        }
    }
}

impl HarnessBuilder {
    pub fn parser(mut self, parser: FakeParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn biomarkers(mut self, store: MemoryRecordStore<BiomarkerRecord>) -> Self {
        self.biomarkers = store;
        self
    }

    pub fn snps(mut self, store: MemoryRecordStore<SnpRecord>) -> Self {
        self.snps = store;
        self
    }

    pub fn catalog(mut self, catalog: FakeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn status(mut self, status: FakeStatusStore) -> Self {
        self.status = status;
        self
    }

    /// Default policies with no waiting between attempts
    pub fn build(self) -> Harness {
        let instant = |policy: RetryPolicy| RetryPolicy::new(policy.max_retries, Duration::ZERO);
        let defaults = OrchestratorConfig::default();
        let config = OrchestratorConfig {
            extract_policy: instant(defaults.extract_policy),
            parse_policy: instant(defaults.parse_policy),
            catalog_policy: instant(defaults.catalog_policy),
            writer: WriterConfig::default(),
            min_content_chars: defaults.min_content_chars,
        };

        let parser = Arc::new(self.parser);
        let biomarkers = Arc::new(self.biomarkers);
        let snps = Arc::new(self.snps);
        let catalog = Arc::new(self.catalog);
        let status = Arc::new(self.status);
        let events = MemoryEventSink::new();

        let orchestrator = IngestOrchestrator::with_executor(
            parser.clone(),
            biomarkers.clone(),
            snps.clone(),
            catalog.clone(),
            status.clone(),
            config,
            RetryExecutor::new(Arc::new(events.clone())),
        );

        Harness {
            parser,
            biomarkers,
            snps,
            catalog,
            status,
            events,
            orchestrator,
        }
    }
}
