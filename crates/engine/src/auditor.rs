/*
 * Table Auditor
 *
 * Runs the per-table pipeline (list, compute metrics, read manifest,
 * reconcile, advise) and fans it out over the configured tables with a
 * bounded number of tables in flight.
 */

use futures::future::join_all;
use lakeaudit_common::metrics::spans;
use lakeaudit_common::{
    AuditConfig, AuditError, AuditMetrics, Result, RetryConfig, TableDescriptor,
    TableOutcomeKind, Timer,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};

use crate::advisor::{CompactionAdvisor, TargetSizePolicy};
use crate::cancel::CancelSignal;
use crate::listing::{list_table_objects, ObjectLister};
use crate::manifest::ManifestReader;
use crate::reconcile::ManifestReconciler;
use crate::report::{AuditReport, AuditResult, TableAuditEntry, TableOutcome};
use crate::stats::{MetricsCalculator, TierPolicy};

/// Audits tables against their storage listing and manifest.
pub struct TableAuditor {
    lister: Arc<dyn ObjectLister>,
    manifests: Arc<dyn ManifestReader>,
    calculator: MetricsCalculator,
    advisor: CompactionAdvisor,
    target_policy: TargetSizePolicy,
    retry: RetryConfig,
    concurrency_limit: usize,
    dead_file_sample_size: usize,
    metrics: Arc<AuditMetrics>,
}

impl TableAuditor {
    pub fn new(
        config: &AuditConfig,
        lister: Arc<dyn ObjectLister>,
        manifests: Arc<dyn ManifestReader>,
    ) -> Self {
        Self {
            lister,
            manifests,
            calculator: MetricsCalculator::new(TierPolicy::for_target(config.size_threshold_mb)),
            advisor: CompactionAdvisor::new(config.size_threshold_mb),
            target_policy: TargetSizePolicy::default(),
            retry: RetryConfig::from(&config.retry),
            concurrency_limit: config.concurrency_limit.max(1),
            dead_file_sample_size: config.dead_file_sample_size,
            metrics: Arc::new(AuditMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AuditMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<AuditMetrics> {
        &self.metrics
    }

    /// Audits every table and returns one entry per table, in input order.
    ///
    /// Once `cancel` fires no further table starts; tables that were waiting
    /// or in flight are reported as cancelled.
    pub async fn run(&self, tables: &[TableDescriptor], cancel: &CancelSignal) -> AuditReport {
        let span = info_span!(spans::AUDIT_RUN, tables = tables.len());
        self.run_tables(tables, cancel).instrument(span).await
    }

    async fn run_tables(&self, tables: &[TableDescriptor], cancel: &CancelSignal) -> AuditReport {
        let _timer = Timer::audit(self.metrics.clone());
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        info!(
            tables = tables.len(),
            concurrency = self.concurrency_limit,
            "Starting audit run"
        );

        let audits = tables.iter().map(|table| {
            let semaphore = semaphore.clone();
            async move {
                if cancel.is_cancelled() {
                    return self.finish(table, Err(AuditError::Cancelled));
                }
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.finish(table, Err(AuditError::Cancelled)),
                    permit = semaphore.acquire_owned() => permit,
                };
                let _permit = match permit {
                    Ok(permit) => permit,
                    Err(e) => return self.finish(table, Err(AuditError::Unexpected(e.to_string()))),
                };
                self.audit_table(table, cancel).await
            }
        });

        let report = AuditReport::new(join_all(audits).await);
        let snapshot = self.metrics.snapshot();
        info!(
            audited = snapshot.tables_audited,
            failed = snapshot.tables_failed,
            cancelled = snapshot.tables_cancelled,
            success_rate = snapshot.success_rate(),
            "Audit run finished"
        );
        report
    }

    /// Audits one table. Failures are captured in the returned entry.
    pub async fn audit_table(&self, table: &TableDescriptor, cancel: &CancelSignal) -> TableAuditEntry {
        let span = info_span!(spans::AUDIT_TABLE, table = %table);
        let result = self.audit(table, cancel).instrument(span).await;
        self.finish(table, result)
    }

    async fn audit(&self, table: &TableDescriptor, cancel: &CancelSignal) -> Result<AuditResult> {
        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }
        let prefix = table.table_prefix();

        let objects = list_table_objects(self.lister.as_ref(), table, &self.retry, &self.metrics, cancel)
            .instrument(info_span!(spans::LIST_OBJECTS))
            .await?;
        info!(objects = objects.len(), "Listed table objects");

        let scan = self.calculator.calculate(prefix, &objects)?;
        let data_bytes: u64 = scan.data_files.iter().map(|f| f.size_bytes).sum();
        self.metrics.record_data_files(scan.data_files.len(), data_bytes);

        let live = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuditError::Cancelled),
            live = self.manifests.live_files(table).instrument(info_span!(spans::READ_MANIFEST)) => live?,
        };

        let dead_files = ManifestReconciler::reconcile(prefix, &scan.data_files, &live);
        self.metrics.record_dead_files(dead_files.len());

        let advisory = self.advisor.advise(scan.metrics.average_file_size_mb);
        info!(
            ?advisory,
            threshold_mb = self.advisor.threshold_mb(),
            "Compaction advice"
        );

        let recommended_mb = self.target_policy.recommended_target_mb(scan.metrics.total_size_mb);
        Ok(AuditResult::new(
            scan.metrics,
            dead_files,
            self.dead_file_sample_size,
            advisory,
            scan.distribution,
            recommended_mb,
        ))
    }

    fn finish(&self, table: &TableDescriptor, result: Result<AuditResult>) -> TableAuditEntry {
        let outcome = match result {
            Ok(result) => {
                self.metrics.record_table_outcome(TableOutcomeKind::Audited);
                TableOutcome::Audited(result)
            }
            Err(AuditError::Cancelled) => {
                self.metrics.record_table_outcome(TableOutcomeKind::Cancelled);
                TableOutcome::Cancelled
            }
            Err(e) => {
                if e.is_fatal() {
                    error!(table = %table, error = %e, "Table audit failed on configuration");
                } else {
                    warn!(table = %table, error = %e, "Table audit failed");
                }
                self.metrics.record_table_outcome(TableOutcomeKind::Failed);
                TableOutcome::from_error(&e)
            }
        };
        TableAuditEntry::new(table, outcome)
    }
}
