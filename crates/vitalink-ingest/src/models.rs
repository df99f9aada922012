//! Data model for report ingestion
//!
//! Parsed shapes come from the parsing capability and are deliberately loose:
//! every field is optional and several accept more than one key name. Storage
//! records are what actually lands in Postgres.

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use vitalink_common::ReportType;

// ============================================================================
// Parsed shapes
// ============================================================================

/// One lab measurement as returned by the parser
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedBiomarker {
    #[serde(default, alias = "name", alias = "marker")]
    pub marker_name: Option<String>,
    /// Numbers and strings are both accepted; values like "<5" stay as text
    #[serde(default, deserialize_with = "string_or_number")]
    pub value: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, alias = "range")]
    pub reference_range: Option<String>,
}

/// One genotype call as returned by the parser
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedSnp {
    #[serde(default, alias = "rsid")]
    pub snp_id: Option<String>,
    #[serde(default, alias = "gene")]
    pub gene_name: Option<String>,
    #[serde(default, alias = "allele")]
    pub genotype: Option<String>,
}

/// Full parser output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedReport {
    #[serde(default)]
    pub biomarkers: Vec<ParsedBiomarker>,
    #[serde(default)]
    pub snps: Vec<ParsedSnp>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

// ============================================================================
// Storage records
// ============================================================================

/// Row in `biomarkers`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BiomarkerRecord {
    pub user_id: Uuid,
    pub report_id: Uuid,
    pub marker_name: String,
    pub value: Option<String>,
    pub unit: String,
    pub reference_range: Option<String>,
}

/// Row in `user_snps`
///
/// Either `supported_snp_id` is set (matched against the reference table) or
/// the raw `snp_id` / `gene_name` text is kept instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SnpRecord {
    pub user_id: Uuid,
    pub report_id: Uuid,
    pub supported_snp_id: Option<i64>,
    pub snp_id: Option<String>,
    pub gene_name: Option<String>,
    pub genotype: Option<String>,
}

/// Row in `supported_snps`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SupportedSnp {
    pub id: i64,
    pub rsid: String,
    pub gene: String,
}

// ============================================================================
// Ingestion inputs and outputs
// ============================================================================

/// Who and what a document belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub user_id: Uuid,
    pub report_id: Uuid,
    pub report_type: ReportType,
}

/// An uploaded file, held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a document from disk
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> vitalink_common::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    /// Lowercased extension of the file name, if any
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Aggregate outcome of ingesting one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProcessingResult {
    pub biomarkers: usize,
    pub snps: usize,
    pub recovered: bool,
    pub issues: Vec<String>,
}

impl FileProcessingResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }

    /// Best-effort side effects land here: an error becomes an issue and
    /// nothing else about the result changes.
    pub fn absorb<E: std::fmt::Display>(&mut self, context: &str, outcome: Result<(), E>) {
        if let Err(e) = outcome {
            self.issue(format!("{}: {}", context, e));
        }
    }

    pub fn total_records(&self) -> usize {
        self.biomarkers + self.snps
    }

    /// Pretty-printed JSON for `--json` output
    pub fn to_json(&self) -> vitalink_common::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// User-facing message. Anything stored counts as success; issues are
    /// for operators and are not mentioned.
    pub fn summary_message(&self) -> String {
        match (self.biomarkers, self.snps) {
            (0, 0) => "We couldn't find any biomarkers or genetic markers in this file. \
                       Please check the file and try again."
                .to_string(),
            (b, 0) => format!("Successfully processed {} biomarker{}", b, plural(b)),
            (0, s) => format!("Successfully processed {} genetic marker{}", s, plural(s)),
            (b, s) => format!(
                "Successfully processed {} biomarker{} and {} genetic marker{}",
                b,
                plural(b),
                s,
                plural(s)
            ),
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
