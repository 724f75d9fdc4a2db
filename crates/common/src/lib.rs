/*
 * Lakehouse Storage Audit - Common Types
 *
 * Shared errors, configuration, storage access and run counters used by
 * the audit engine and the command-line front end.
 */

pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod retry;
pub mod storage;

pub use config::{AuditConfig, AuditConfigBuilder, RetrySettings, DEFAULT_SIZE_THRESHOLD_MB};
pub use error::{AuditError, FailureKind, Result, ResultExt};
pub use metrics::{AuditMetrics, MetricsSnapshot, TableOutcomeKind, Timer};
pub use model::{LakehouseType, StorageObject, TableDescriptor};
pub use retry::{RetryBuilder, RetryConfig};
pub use storage::{build_operator, OperatorRegistry, StorageBackend, StorageConfig};
