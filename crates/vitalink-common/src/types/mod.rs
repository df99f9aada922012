//! Common types used across Vitalink

use serde::{Deserialize, Serialize};

use crate::error::VitalinkError;

/// Kind of lab report a document carries.
///
/// Sent to the parsing capability as a hint so it knows whether to look for
/// blood panel markers, genotype calls, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// Blood panel / lab chemistry
    #[default]
    Blood,
    /// Genotyping or sequencing export
    Genetic,
    /// Document that may contain both
    Combined,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Blood => "blood",
            ReportType::Genetic => "genetic",
            ReportType::Combined => "combined",
        }
    }
}

impl std::str::FromStr for ReportType {
    type Err = VitalinkError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blood" | "blood_test" | "lab" => Ok(ReportType::Blood),
            "genetic" | "dna" | "snp" => Ok(ReportType::Genetic),
            "combined" | "comprehensive" => Ok(ReportType::Combined),
            _ => Err(VitalinkError::InvalidReportType(s.to_string())),
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of an uploaded report (maps to `lab_reports.status`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = VitalinkError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            _ => Err(VitalinkError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
