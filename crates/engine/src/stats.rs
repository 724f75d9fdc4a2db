/*
 * Table Metrics
 *
 * Folds a table's object listing into size/count/average statistics over
 * its data files, and buckets those files into size tiers relative to the
 * target file size.
 */

use lakeaudit_common::{AuditError, Result, StorageObject, DEFAULT_SIZE_THRESHOLD_MB};
use serde::Serialize;

use crate::path::file_name;
use crate::reconcile::is_checkpoint_artifact;

/// Substring that marks an object as a data file.
pub const DATA_FILE_MARKER: &str = ".parquet";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Returns true for objects counted as table data: Parquet files that are not checkpoints.
pub fn is_data_file(table_prefix: &str, key: &str) -> bool {
    key.contains(DATA_FILE_MARKER) && !is_checkpoint_artifact(table_prefix, key)
}

/// Aggregate storage health of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableMetrics {
    pub total_size_mb: f64,
    pub total_parquet_files: usize,
    pub average_file_size_mb: f64,
}

/// A qualifying data file, with its name normalized once for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    pub key: String,
    pub name: String,
    pub size_bytes: u64,
}

impl DataFile {
    pub fn from_object(object: &StorageObject) -> Self {
        Self {
            key: object.key.clone(),
            name: file_name(&object.key).to_string(),
            size_bytes: object.size_bytes,
        }
    }
}

/// Size tier of a data file relative to the target file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeTier {
    /// Below the tiny-file cutoff
    Tiny,
    /// Below a quarter of the target
    Small,
    /// Below the target
    Medium,
    /// At or above the target
    Large,
}

/// Tier boundaries, in MB.
#[derive(Debug, Clone, PartialEq)]
pub struct TierPolicy {
    pub tiny_below_mb: f64,
    pub target_mb: f64,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::for_target(DEFAULT_SIZE_THRESHOLD_MB)
    }
}

impl TierPolicy {
    pub fn for_target(target_mb: f64) -> Self {
        Self {
            tiny_below_mb: 8.0,
            target_mb,
        }
    }

    pub fn classify(&self, size_mb: f64) -> SizeTier {
        if size_mb < self.tiny_below_mb {
            SizeTier::Tiny
        } else if size_mb >= self.target_mb {
            SizeTier::Large
        } else if size_mb >= self.target_mb / 4.0 {
            SizeTier::Medium
        } else {
            SizeTier::Small
        }
    }
}

/// File count and volume for one tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierBucket {
    pub files: usize,
    pub size_mb: f64,
}

/// Data files per size tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SizeDistribution {
    pub tiny: TierBucket,
    pub small: TierBucket,
    pub medium: TierBucket,
    pub large: TierBucket,
}

impl SizeDistribution {
    fn bucket_mut(&mut self, tier: SizeTier) -> &mut TierBucket {
        match tier {
            SizeTier::Tiny => &mut self.tiny,
            SizeTier::Small => &mut self.small,
            SizeTier::Medium => &mut self.medium,
            SizeTier::Large => &mut self.large,
        }
    }

    pub fn bucket(&self, tier: SizeTier) -> &TierBucket {
        match tier {
            SizeTier::Tiny => &self.tiny,
            SizeTier::Small => &self.small,
            SizeTier::Medium => &self.medium,
            SizeTier::Large => &self.large,
        }
    }

    fn rounded(mut self) -> Self {
        for bucket in [&mut self.tiny, &mut self.small, &mut self.medium, &mut self.large] {
            bucket.size_mb = round2(bucket.size_mb);
        }
        self
    }
}

/// Everything computed from one table's listing.
#[derive(Debug, Clone)]
pub struct TableScan {
    pub metrics: TableMetrics,
    pub data_files: Vec<DataFile>,
    pub distribution: SizeDistribution,
}

#[derive(Default)]
struct Totals {
    size_mb: f64,
    data_files: Vec<DataFile>,
    distribution: SizeDistribution,
}

/// Computes table metrics from an object listing.
#[derive(Debug, Clone, Default)]
pub struct MetricsCalculator {
    tiers: TierPolicy,
}

impl MetricsCalculator {
    pub fn new(tiers: TierPolicy) -> Self {
        Self { tiers }
    }

    /// Computes metrics over the table's data files.
    ///
    /// Sizes are summed at full precision and rounded once at the end.
    /// A listing without data files yields `NoDataFiles`, never a zero average.
    pub fn calculate(&self, table: &str, objects: &[StorageObject]) -> Result<TableScan> {
        let totals = objects
            .iter()
            .filter(|object| is_data_file(table, &object.key))
            .fold(Totals::default(), |mut totals, object| {
                let size_mb = bytes_to_mb(object.size_bytes);
                let bucket = totals.distribution.bucket_mut(self.tiers.classify(size_mb));
                bucket.files += 1;
                bucket.size_mb += size_mb;
                totals.size_mb += size_mb;
                totals.data_files.push(DataFile::from_object(object));
                totals
            });

        let total_parquet_files = totals.data_files.len();
        if total_parquet_files == 0 {
            return Err(AuditError::NoDataFiles {
                table: table.to_string(),
            });
        }

        let total_size_mb = round2(totals.size_mb);
        let metrics = TableMetrics {
            total_size_mb,
            total_parquet_files,
            average_file_size_mb: round2(total_size_mb / total_parquet_files as f64),
        };
        tracing::info!(table, ?metrics, "Table metrics");

        Ok(TableScan {
            metrics,
            data_files: totals.data_files,
            distribution: totals.distribution.rounded(),
        })
    }
}
