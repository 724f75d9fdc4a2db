/*
 * Audit Report
 *
 * One entry per configured table, in configuration order. Audited tables
 * carry their full result; failed and cancelled tables carry the reason.
 */

use lakeaudit_common::{AuditError, FailureKind, LakehouseType, Result, TableDescriptor};
use serde::Serialize;
use tracing::{info, warn};

use crate::advisor::CompactionVerdict;
use crate::reconcile::DeadFileSet;
use crate::stats::{SizeDistribution, TableMetrics};

/// Result of a successfully audited table.
///
/// The report carries the dead file count and a bounded sample; the full
/// set stays available to callers but is not serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditResult {
    pub metrics: TableMetrics,
    pub dead_file_count: usize,
    pub dead_file_sample: Vec<String>,
    #[serde(skip)]
    pub dead_files: DeadFileSet,
    pub advisory: CompactionVerdict,
    pub size_distribution: SizeDistribution,
    pub recommended_target_file_size_mb: f64,
}

impl AuditResult {
    /// Builds a result whose dead file sample holds at most `sample_size` names.
    pub fn new(
        metrics: TableMetrics,
        dead_files: DeadFileSet,
        sample_size: usize,
        advisory: CompactionVerdict,
        size_distribution: SizeDistribution,
        recommended_target_file_size_mb: f64,
    ) -> Self {
        Self {
            metrics,
            dead_file_count: dead_files.len(),
            dead_file_sample: dead_files.sample(sample_size),
            dead_files,
            advisory,
            size_distribution,
            recommended_target_file_size_mb,
        }
    }
}

/// How a table's audit ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Audited(AuditResult),
    Failed { kind: FailureKind, message: String },
    Cancelled,
}

impl TableOutcome {
    /// Converts a pipeline error into a report outcome.
    pub fn from_error(error: &AuditError) -> Self {
        match error {
            AuditError::Cancelled => TableOutcome::Cancelled,
            e => TableOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableAuditEntry {
    pub table: String,
    pub lakehouse_type: LakehouseType,
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

impl TableAuditEntry {
    pub fn new(table: &TableDescriptor, outcome: TableOutcome) -> Self {
        Self {
            table: table.table_prefix().to_string(),
            lakehouse_type: table.lakehouse_type(),
            outcome,
        }
    }

    pub fn result(&self) -> Option<&AuditResult> {
        match &self.outcome {
            TableOutcome::Audited(result) => Some(result),
            _ => None,
        }
    }

    /// Number of dead files; `None` unless the table was audited.
    pub fn dead_file_count(&self) -> Option<usize> {
        self.result().map(|r| r.dead_file_count)
    }

    /// Reported dead file names in sorted order; `None` unless the table was audited.
    pub fn dead_file_sample(&self) -> Option<&[String]> {
        self.result().map(|r| r.dead_file_sample.as_slice())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TableOutcome::Failed { .. })
    }
}

/// Outcome of a whole audit run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditReport {
    pub entries: Vec<TableAuditEntry>,
}

impl AuditReport {
    pub fn new(entries: Vec<TableAuditEntry>) -> Self {
        Self { entries }
    }

    pub fn entry(&self, table: &str) -> Option<&TableAuditEntry> {
        self.entries.iter().find(|e| e.table == table)
    }

    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(TableAuditEntry::is_failed)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Logs one summary block per table.
    pub fn log_summary(&self) {
        for entry in &self.entries {
            match &entry.outcome {
                TableOutcome::Audited(result) => {
                    info!(
                        table = %entry.table,
                        total_size_mb = result.metrics.total_size_mb,
                        total_parquet_files = result.metrics.total_parquet_files,
                        average_file_size_mb = result.metrics.average_file_size_mb,
                        "Table summary"
                    );
                    match result.advisory {
                        CompactionVerdict::IncreaseTargetSize => info!(
                            table = %entry.table,
                            recommended_target_mb = result.recommended_target_file_size_mb,
                            "Average file size is above the threshold, consider increasing the target file size"
                        ),
                        CompactionVerdict::RunCompaction => info!(
                            table = %entry.table,
                            "Average file size is below the threshold, run compaction"
                        ),
                    }
                    if result.dead_file_count > 0 {
                        info!(
                            table = %entry.table,
                            dead_files = result.dead_file_count,
                            sample = ?result.dead_file_sample,
                            "Dead files present"
                        );
                    }
                }
                TableOutcome::Failed { kind, message } => {
                    warn!(table = %entry.table, ?kind, %message, "Table audit failed");
                }
                TableOutcome::Cancelled => {
                    warn!(table = %entry.table, "Table audit cancelled");
                }
            }
        }
    }
}
