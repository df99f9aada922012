//! Storage backend interface
//!
//! The writer and orchestrator only see these traits. Schema knowledge (table
//! names, columns, SQL) belongs to the implementations, of which
//! [`postgres`] is the production one.

pub mod postgres;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use vitalink_common::ProcessingStatus;

use crate::models::SupportedSnp;

pub use postgres::{PgRecordStore, PgReportStatusStore, PgTable, PgVariantCatalog};

/// Storage errors, surfaced as values
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Conflict key column '{column}' is not a column of {table}")]
    InvalidConflictKey { table: String, column: String },

    #[error("Conflict key cannot be empty")]
    EmptyConflictKey,

    #[error("Record rejected: {0}")]
    Rejected(String),

    #[error("Report '{0}' not found")]
    ReportNotFound(Uuid),
}

/// Columns that define uniqueness for an upsert
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConflictKey {
    columns: Vec<String>,
}

impl ConflictKey {
    pub fn new<I, S>(columns: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns
            .into_iter()
            .map(Into::into)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        if columns.is_empty() {
            return Err(StoreError::EmptyConflictKey);
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

impl std::str::FromStr for ConflictKey {
    type Err = StoreError;

    /// Parse the `"user_id,report_id,marker_name"` form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split(','))
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.columns.join(","))
    }
}

/// Persistence for one record type.
///
/// Every method returns the rows the backend confirmed, never the input.
#[async_trait]
pub trait RecordStore<R>: Send + Sync
where
    R: Send + Sync,
{
    /// Insert all records in one statement
    async fn insert_batch(&self, records: &[R]) -> Result<Vec<R>, StoreError>;

    /// Insert all records, updating rows that collide on `conflict_key`
    async fn upsert(&self, records: &[R], conflict_key: &ConflictKey) -> Result<Vec<R>, StoreError>;

    async fn insert_one(&self, record: &R) -> Result<R, StoreError>;
}

#[async_trait]
impl<R, S> RecordStore<R> for Arc<S>
where
    R: Send + Sync + 'static,
    S: RecordStore<R> + ?Sized,
{
    async fn insert_batch(&self, records: &[R]) -> Result<Vec<R>, StoreError> {
        (**self).insert_batch(records).await
    }

    async fn upsert(
        &self,
        records: &[R],
        conflict_key: &ConflictKey,
    ) -> Result<Vec<R>, StoreError> {
        (**self).upsert(records, conflict_key).await
    }

    async fn insert_one(&self, record: &R) -> Result<R, StoreError> {
        (**self).insert_one(record).await
    }
}

/// Read-only reference table of supported variants
#[async_trait]
pub trait VariantCatalog: Send + Sync {
    async fn supported_variants(&self) -> Result<Vec<SupportedSnp>, StoreError>;
}

/// Processing status of the source report
#[async_trait]
pub trait ReportStatusStore: Send + Sync {
    async fn update_status(
        &self,
        report_id: Uuid,
        status: ProcessingStatus,
    ) -> Result<(), StoreError>;
}
