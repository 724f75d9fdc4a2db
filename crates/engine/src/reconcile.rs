/*
 * Manifest Reconciliation
 *
 * Finds data files that exist in storage but are no longer referenced by
 * the table's current snapshot. Comparison is by bare file name, so two
 * partitions holding the same file name are treated as one file.
 */

use serde::Serialize;
use std::collections::BTreeSet;

use crate::path::{file_name, table_relative};
use crate::stats::DataFile;

/// Substring marking table-format checkpoint artifacts.
///
/// Checkpoints summarize log state; they are never data and never dead.
pub const CHECKPOINT_MARKER: &str = "checkpoint";

/// Returns true when `key` names a checkpoint artifact of the table at `table_prefix`.
///
/// Only the part of the key below the table prefix is inspected, so a table
/// whose own name contains the marker keeps its data files.
pub fn is_checkpoint_artifact(table_prefix: &str, key: &str) -> bool {
    table_relative(key, table_prefix).contains(CHECKPOINT_MARKER)
}

/// Physically present data files that the manifest no longer references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeadFileSet(BTreeSet<String>);

impl DeadFileSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The first `n` dead file names in lexical order.
    pub fn sample(&self, n: usize) -> Vec<String> {
        self.0.iter().take(n).cloned().collect()
    }
}

impl FromIterator<String> for DeadFileSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Computes dead files from a physical listing and a manifest live list.
pub struct ManifestReconciler;

impl ManifestReconciler {
    /// Returns the names of `physical` files absent from `live_paths`.
    ///
    /// Checkpoint artifacts are dropped by table-relative key before names are compared.
    pub fn reconcile(table: &str, physical: &[DataFile], live_paths: &[String]) -> DeadFileSet {
        let live: BTreeSet<&str> = live_paths.iter().map(|p| file_name(p)).collect();

        let dead: DeadFileSet = physical
            .iter()
            .filter(|file| !is_checkpoint_artifact(table, &file.key))
            .filter(|file| !live.contains(file.name.as_str()))
            .map(|file| file.name.clone())
            .collect();

        if dead.is_empty() {
            tracing::info!(table, "No dead files found");
        } else {
            tracing::info!(
                table,
                dead_files = dead.len(),
                live_files = live.len(),
                "Found data files not referenced by the table"
            );
        }

        dead
    }
}
