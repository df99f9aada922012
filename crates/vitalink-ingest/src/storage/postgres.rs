//! Postgres storage backend
//!
//! Every write is a single INSERT built with QueryBuilder::push_values and
//! RETURNING the record columns, so callers get back exactly the rows that
//! were persisted. Upserts use ON CONFLICT (...) DO UPDATE; the conflict
//! columns must match a unique index (see migrations/).

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::marker::PhantomData;
use tracing::debug;
use uuid::Uuid;
use vitalink_common::ProcessingStatus;

use super::{ConflictKey, RecordStore, ReportStatusStore, StoreError, VariantCatalog};
use crate::models::{BiomarkerRecord, SnpRecord, SupportedSnp};

/// A record type with a fixed Postgres table
pub trait PgTable: for<'r> FromRow<'r, PgRow> + Send + Sync + Unpin + 'static {
    const TABLE: &'static str;

    /// Insert columns, in the order [`bind_values`](Self::bind_values) binds them
    const COLUMNS: &'static [&'static str];

    fn bind_values<'args>(&self, row: &mut Separated<'_, 'args, Postgres, &'static str>);
}

impl PgTable for BiomarkerRecord {
    const TABLE: &'static str = "biomarkers";
    const COLUMNS: &'static [&'static str] = &[
        "user_id",
        "report_id",
        "marker_name",
        "value",
        "unit",
        "reference_range",
    ];

    fn bind_values<'args>(&self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.user_id)
            .push_bind(self.report_id)
            .push_bind(self.marker_name.clone())
            .push_bind(self.value.clone())
            .push_bind(self.unit.clone())
            .push_bind(self.reference_range.clone());
    }
}

impl PgTable for SnpRecord {
    const TABLE: &'static str = "user_snps";
    const COLUMNS: &'static [&'static str] = &[
        "user_id",
        "report_id",
        "supported_snp_id",
        "snp_id",
        "gene_name",
        "genotype",
    ];

    fn bind_values<'args>(&self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.user_id)
            .push_bind(self.report_id)
            .push_bind(self.supported_snp_id)
            .push_bind(self.snp_id.clone())
            .push_bind(self.gene_name.clone())
            .push_bind(self.genotype.clone());
    }
}

/// Build `INSERT ... VALUES ... [ON CONFLICT ...] RETURNING ...` for `records`
pub fn build_insert<R: PgTable>(
    records: &[R],
    conflict_key: Option<&ConflictKey>,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let columns = R::COLUMNS.join(", ");
    let mut query = QueryBuilder::new(format!("INSERT INTO {} ({}) ", R::TABLE, columns));

    query.push_values(records.iter(), |mut row, record| {
        record.bind_values(&mut row);
    });

    if let Some(key) = conflict_key {
        query.push(on_conflict_clause::<R>(key)?);
    }

    query.push(format!(" RETURNING {}", columns));
    Ok(query)
}

fn on_conflict_clause<R: PgTable>(key: &ConflictKey) -> Result<String, StoreError> {
    for column in key.columns() {
        if !R::COLUMNS.contains(&column.as_str()) {
            return Err(StoreError::InvalidConflictKey {
                table: R::TABLE.to_string(),
                column: column.clone(),
            });
        }
    }

    let mut updates: Vec<String> = R::COLUMNS
        .iter()
        .filter(|c| !key.contains(c))
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();

    // DO NOTHING would drop the row from RETURNING
    if updates.is_empty() {
        let first = &key.columns()[0];
        updates.push(format!("{first} = EXCLUDED.{first}"));
    }

    Ok(format!(
        " ON CONFLICT ({}) DO UPDATE SET {}",
        key.columns().join(", "),
        updates.join(", ")
    ))
}

/// [`RecordStore`] over one Postgres table
pub struct PgRecordStore<R> {
    pool: PgPool,
    _record: PhantomData<fn() -> R>,
}

impl<R> PgRecordStore<R> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _record: PhantomData,
        }
    }
}

impl<R> Clone for PgRecordStore<R> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

#[async_trait]
impl<R: PgTable> RecordStore<R> for PgRecordStore<R> {
    async fn insert_batch(&self, records: &[R]) -> Result<Vec<R>, StoreError> {
        let mut query = build_insert(records, None)?;
        let rows = query
            .build_query_as::<R>()
            .fetch_all(&self.pool)
            .await?;

        debug!(table = R::TABLE, inserted = rows.len(), "Batch insert");
        Ok(rows)
    }

    async fn upsert(
        &self,
        records: &[R],
        conflict_key: &ConflictKey,
    ) -> Result<Vec<R>, StoreError> {
        let mut query = build_insert(records, Some(conflict_key))?;
        let rows = query
            .build_query_as::<R>()
            .fetch_all(&self.pool)
            .await?;

        debug!(table = R::TABLE, %conflict_key, upserted = rows.len(), "Upsert");
        Ok(rows)
    }

    async fn insert_one(&self, record: &R) -> Result<R, StoreError> {
        let mut query = build_insert(std::slice::from_ref(record), None)?;
        let row = query
            .build_query_as::<R>()
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }
}

/// Reads `supported_snps`
#[derive(Clone)]
pub struct PgVariantCatalog {
    pool: PgPool,
}

impl PgVariantCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VariantCatalog for PgVariantCatalog {
    async fn supported_variants(&self) -> Result<Vec<SupportedSnp>, StoreError> {
        let variants = sqlx::query_as::<_, SupportedSnp>(
            "SELECT id, rsid, gene FROM supported_snps ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(variants)
    }
}

/// Updates `lab_reports.status`
#[derive(Clone)]
pub struct PgReportStatusStore {
    pool: PgPool,
}

impl PgReportStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStatusStore for PgReportStatusStore {
    async fn update_status(
        &self,
        report_id: Uuid,
        status: ProcessingStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE lab_reports
            SET status = $1, processed_at = $2
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(chrono::Utc::now())
        .bind(report_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ReportNotFound(report_id));
        }

        Ok(())
    }
}
