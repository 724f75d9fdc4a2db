/*
 * Lakehouse Storage Audit Engine
 *
 * Compares what a table's manifest says is live against what actually sits
 * in object storage. For every table it reports size statistics, the data
 * files no snapshot references any more, and whether compaction or a larger
 * target file size is the better fix.
 *
 * Pipeline per table:
 *   listing -> stats -> manifest -> reconcile -> advisor
 */

pub mod advisor;
pub mod auditor;
pub mod cancel;
pub mod listing;
pub mod manifest;
pub mod path;
pub mod reconcile;
pub mod report;
pub mod stats;

pub use advisor::{CompactionAdvisor, CompactionVerdict, TargetSizePolicy};
pub use auditor::TableAuditor;
pub use cancel::{CancelHandle, CancelSignal};
pub use listing::{list_table_objects, ListPage, ObjectLister, OpendalLister};
pub use manifest::{DeltaLogReader, FormatManifestReader, IcebergMetadataReader, ManifestReader};
pub use reconcile::{DeadFileSet, ManifestReconciler};
pub use report::{AuditReport, AuditResult, TableAuditEntry, TableOutcome};
pub use stats::{MetricsCalculator, SizeDistribution, SizeTier, TableMetrics, TierPolicy};
