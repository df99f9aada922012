//! Parsed shapes to storage records
//!
//! Fills defaults for missing biomarker fields and resolves genotype calls
//! against the supported-variant catalog.

use std::collections::HashMap;

use crate::models::{
    BiomarkerRecord, ParsedBiomarker, ParsedSnp, ReportMetadata, SnpRecord, SupportedSnp,
};

pub const UNKNOWN_MARKER: &str = "Unknown Marker";

pub const UNSPECIFIED_UNIT: &str = "not specified";

/// Upper bound for raw `snp_id` / `gene_name` text
pub const MAX_RAW_IDENTIFIER_CHARS: usize = 50;

pub const MAX_GENOTYPE_CHARS: usize = 10;

/// Unique index on `biomarkers`
pub const BIOMARKER_CONFLICT_KEY: &str = "user_id,report_id,marker_name";

/// Unique index on `user_snps`
pub const SNP_CONFLICT_KEY: &str = "user_id,supported_snp_id,snp_id,gene_name";

/// Trimmed, non-blank text
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn truncated(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

pub fn map_biomarkers(
    parsed: &[ParsedBiomarker],
    metadata: &ReportMetadata,
) -> Vec<BiomarkerRecord> {
    parsed
        .iter()
        .map(|b| BiomarkerRecord {
            user_id: metadata.user_id,
            report_id: metadata.report_id,
            marker_name: present(&b.marker_name).unwrap_or(UNKNOWN_MARKER).to_string(),
            value: present(&b.value).map(str::to_string),
            unit: present(&b.unit).unwrap_or(UNSPECIFIED_UNIT).to_string(),
            reference_range: present(&b.reference_range).map(str::to_string),
        })
        .collect()
}

/// Case-insensitive lookup over the catalog
pub struct VariantIndex<'a> {
    by_rsid: HashMap<String, &'a SupportedSnp>,
    by_gene: HashMap<String, &'a SupportedSnp>,
}

impl<'a> VariantIndex<'a> {
    pub fn new(catalog: &'a [SupportedSnp]) -> Self {
        let mut by_rsid = HashMap::with_capacity(catalog.len());
        let mut by_gene = HashMap::with_capacity(catalog.len());

        // first entry wins on duplicates
        for variant in catalog {
            by_rsid.entry(variant.rsid.to_lowercase()).or_insert(variant);
            by_gene.entry(variant.gene.to_lowercase()).or_insert(variant);
        }

        Self { by_rsid, by_gene }
    }

    /// rsid first, then gene
    pub fn resolve(&self, snp_id: Option<&str>, gene: Option<&str>) -> Option<&'a SupportedSnp> {
        snp_id
            .and_then(|id| self.by_rsid.get(&id.to_lowercase()))
            .or_else(|| gene.and_then(|g| self.by_gene.get(&g.to_lowercase())))
            .copied()
    }
}

/// SNP records ready for storage, plus how many inputs were skipped for
/// having neither an identifier nor a gene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSnps {
    pub records: Vec<SnpRecord>,
    pub skipped: usize,
}

pub fn resolve_snps(
    parsed: &[ParsedSnp],
    metadata: &ReportMetadata,
    catalog: &[SupportedSnp],
) -> ResolvedSnps {
    let index = VariantIndex::new(catalog);
    let mut resolved = ResolvedSnps::default();

    for snp in parsed {
        let snp_id = present(&snp.snp_id);
        let gene = present(&snp.gene_name);

        if snp_id.is_none() && gene.is_none() {
            resolved.skipped += 1;
            continue;
        }

        let genotype = present(&snp.genotype).map(|g| truncated(g, MAX_GENOTYPE_CHARS));

        let record = match index.resolve(snp_id, gene) {
            Some(variant) => SnpRecord {
                user_id: metadata.user_id,
                report_id: metadata.report_id,
                supported_snp_id: Some(variant.id),
                snp_id: None,
                gene_name: None,
                genotype,
            },
            None => SnpRecord {
                user_id: metadata.user_id,
                report_id: metadata.report_id,
                supported_snp_id: None,
                snp_id: snp_id.map(|id| truncated(id, MAX_RAW_IDENTIFIER_CHARS)),
                gene_name: gene.map(|g| truncated(g, MAX_RAW_IDENTIFIER_CHARS)),
                genotype,
            },
        };

        resolved.records.push(record);
    }

    resolved
}
