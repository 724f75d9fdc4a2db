/*
 * Compaction advice from average file size.
 */

use lakeaudit_common::DEFAULT_SIZE_THRESHOLD_MB;
use serde::Serialize;

/// Advisory verdict for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionVerdict {
    /// Files already exceed the target; raise the target file size
    IncreaseTargetSize,
    /// Files are at or below the target; compaction will help
    RunCompaction,
}

/// Applies the average-file-size threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionAdvisor {
    threshold_mb: f64,
}

impl Default for CompactionAdvisor {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_THRESHOLD_MB)
    }
}

impl CompactionAdvisor {
    pub fn new(threshold_mb: f64) -> Self {
        Self { threshold_mb }
    }

    pub fn threshold_mb(&self) -> f64 {
        self.threshold_mb
    }

    /// The threshold itself counts as "run compaction".
    pub fn advise(&self, average_file_size_mb: f64) -> CompactionVerdict {
        if average_file_size_mb > self.threshold_mb {
            CompactionVerdict::IncreaseTargetSize
        } else {
            CompactionVerdict::RunCompaction
        }
    }
}

/// Table-size tiers of lakehouse target-file-size auto-tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSizePolicy {
    /// Tables below this size target `min_target_mb`
    pub small_table_mb: f64,
    /// Tables at or above this size target `max_target_mb`
    pub large_table_mb: f64,
    pub min_target_mb: f64,
    pub max_target_mb: f64,
}

impl Default for TargetSizePolicy {
    fn default() -> Self {
        const TB_IN_MB: f64 = 1024.0 * 1024.0;
        Self {
            small_table_mb: 2.56 * TB_IN_MB,
            large_table_mb: 10.0 * TB_IN_MB,
            min_target_mb: DEFAULT_SIZE_THRESHOLD_MB,
            max_target_mb: 1024.0,
        }
    }
}

impl TargetSizePolicy {
    /// Target file size for a table of `total_size_mb`, interpolated linearly between tiers.
    pub fn recommended_target_mb(&self, total_size_mb: f64) -> f64 {
        if total_size_mb < self.small_table_mb {
            return self.min_target_mb;
        }
        if total_size_mb >= self.large_table_mb {
            return self.max_target_mb;
        }

        let progress =
            (total_size_mb - self.small_table_mb) / (self.large_table_mb - self.small_table_mb);
        let target = self.min_target_mb + progress * (self.max_target_mb - self.min_target_mb);
        (target * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let advisor = CompactionAdvisor::default();
        assert_eq!(advisor.advise(256.00), CompactionVerdict::RunCompaction);
        assert_eq!(advisor.advise(256.01), CompactionVerdict::IncreaseTargetSize);
        assert_eq!(advisor.advise(0.5), CompactionVerdict::RunCompaction);
    }

    #[test]
    fn test_custom_threshold() {
        let advisor = CompactionAdvisor::new(512.0);
        assert_eq!(advisor.advise(300.0), CompactionVerdict::RunCompaction);
        assert_eq!(advisor.advise(512.5), CompactionVerdict::IncreaseTargetSize);
    }

    #[test]
    fn test_target_size_tiers() {
        let policy = TargetSizePolicy::default();
        assert_eq!(policy.recommended_target_mb(400.0), 256.0);
        assert_eq!(policy.recommended_target_mb(policy.large_table_mb), 1024.0);
        assert_eq!(policy.recommended_target_mb(policy.large_table_mb * 3.0), 1024.0);

        let midpoint = (policy.small_table_mb + policy.large_table_mb) / 2.0;
        assert_eq!(policy.recommended_target_mb(midpoint), 640.0);
    }

    #[test]
    fn test_target_size_grows_monotonically() {
        let policy = TargetSizePolicy::default();
        let mut previous = 0.0;
        for step in 0..=20 {
            let size = policy.small_table_mb * (step as f64 / 4.0);
            let target = policy.recommended_target_mb(size);
            assert!(target >= previous);
            previous = target;
        }
    }
}
