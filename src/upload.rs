//! Upload orchestration.
//!
//! [`Uploader::upload`] runs one invocation end to end:
//!
//! 1. validate the request and dataset (nothing touches the database before this passes)
//! 2. run the chosen [`Strategy`] in one transaction
//! 3. verify the target row count (DeleteThenInsert / CreateOrReplace only)
//! 4. finish the [`UploadJob`] exactly once
//! 5. write the audit row, if a log table was requested
//!
//! The outcome is available both on the job ([`UploadJob::commit_state`]) and as an explicit
//! result ([`UploadReport::outcome`]).

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::audit::{AuditLogger, LogRecord};
use crate::connection::ConnectionManager;
use crate::error::{UploadError, UploadResult};
use crate::execution::{Telemetry, UploadEvent, UploadMetrics, UploadObserver};
use crate::files::{FileService, LocalFileService};
use crate::job::{CommitState, LogTarget, UploadJob, UploadTarget};
use crate::strategy::{self, ExistencePolicy, LoadContext, Strategy};
use crate::types::DataSet;

/// Rows per chunk when the caller does not choose.
pub const DEFAULT_CHUNK_SIZE: usize = 300;

/// One upload invocation: what to load, where, and how.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    dataset: Arc<DataSet>,
    target: UploadTarget,
    strategy: Strategy,
    policy: ExistencePolicy,
    chunk_size: usize,
    log_target: Option<LogTarget>,
}

impl UploadRequest {
    /// Load `dataset` into `target` with [`Strategy::BatchedAppend`],
    /// [`ExistencePolicy::DeleteThenInsert`] and [`DEFAULT_CHUNK_SIZE`].
    pub fn new(dataset: Arc<DataSet>, target: UploadTarget) -> Self {
        Self {
            dataset,
            target,
            strategy: Strategy::default(),
            policy: ExistencePolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_target: None,
        }
    }

    /// Choose the load strategy.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Choose what happens to existing rows.
    pub fn policy(mut self, policy: ExistencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Rows per chunk. Must be > 0.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Write an audit row into `log_target` when the upload finishes.
    pub fn log_to(mut self, log_target: LogTarget) -> Self {
        self.log_target = Some(log_target);
        self
    }

    /// Dataset being loaded.
    pub fn dataset(&self) -> &Arc<DataSet> {
        &self.dataset
    }

    /// Target table.
    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// Selected strategy.
    pub fn selected_strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Selected existence policy.
    pub fn selected_policy(&self) -> ExistencePolicy {
        self.policy
    }

    fn validate(&self) -> UploadResult<()> {
        if self.chunk_size == 0 {
            return Err(UploadError::InvalidOptions {
                message: "chunk_size must be > 0".to_string(),
            });
        }
        if let Strategy::BulkFileLoad(staging) = &self.strategy {
            if staging.file_name.trim().is_empty() {
                return Err(UploadError::InvalidOptions {
                    message: "staging file name must not be empty".to_string(),
                });
            }
        }
        self.dataset.validate()
    }
}

/// Everything known about a finished upload.
#[derive(Debug)]
pub struct UploadReport {
    /// The finished job; its state is never [`CommitState::Pending`].
    pub job: UploadJob,
    /// `Ok` only when the job is [`CommitState::Committed`].
    pub outcome: UploadResult<()>,
    /// Audit result, when a log table was requested.
    pub log: Option<UploadResult<LogRecord>>,
}

impl UploadReport {
    /// Final state of the job.
    pub fn commit_state(&self) -> CommitState {
        self.job.commit_state()
    }

    /// `true` when the load committed and verified.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The job on success, the load/verification error otherwise.
    pub fn into_result(self) -> UploadResult<UploadJob> {
        self.outcome.map(|()| self.job)
    }
}

/// Runs uploads against one [`ConnectionManager`].
pub struct Uploader {
    conn: Arc<ConnectionManager>,
    files: Arc<dyn FileService>,
    observer: Option<Arc<dyn UploadObserver>>,
    metrics: Arc<UploadMetrics>,
}

impl fmt::Debug for Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uploader")
            .field("conn", &self.conn)
            .field("observer_set", &self.observer.is_some())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl Uploader {
    /// Uploader staging bulk-load files on the local file system.
    pub fn new(conn: Arc<ConnectionManager>) -> Self {
        Self {
            conn,
            files: Arc::new(LocalFileService),
            observer: None,
            metrics: Arc::new(UploadMetrics::new()),
        }
    }

    /// Use a different [`FileService`] for staging files.
    pub fn with_file_service(mut self, files: Arc<dyn FileService>) -> Self {
        self.files = files;
        self
    }

    /// Attach an observer for upload events.
    pub fn with_observer(mut self, observer: Arc<dyn UploadObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to live upload metrics.
    pub fn metrics(&self) -> Arc<UploadMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The connection manager uploads run against.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.conn
    }

    /// Run one upload on the calling thread.
    pub fn upload(&self, request: &UploadRequest) -> UploadReport {
        let job = UploadJob::start(request.target.clone(), request.strategy.kind());
        self.run(request, job)
    }

    pub(crate) fn run(&self, request: &UploadRequest, mut job: UploadJob) -> UploadReport {
        let telemetry = Telemetry::new(self.observer.clone(), Arc::clone(&self.metrics));
        let target = request.target.as_str();
        let expected = request.dataset.row_count();
        let clock = Instant::now();

        telemetry.metrics().on_upload_start();
        telemetry.emit(UploadEvent::UploadStarted {
            target: target.to_string(),
            strategy: job.strategy(),
            rows: expected,
        });
        info!(
            target_table = target,
            strategy = ?job.strategy(),
            policy = ?request.policy,
            rows = expected,
            "upload started"
        );

        let loaded = request.validate().and_then(|()| {
            let ctx = LoadContext {
                conn: &self.conn,
                files: self.files.as_ref(),
                dataset: &request.dataset,
                target: &request.target,
                policy: request.policy,
                chunk_size: request.chunk_size,
                telemetry: &telemetry,
            };
            strategy::run(&ctx, &request.strategy)
        });

        let (state, outcome) = match loaded {
            Err(err) => {
                warn!(target_table = target, error = %err, "upload rolled back");
                (CommitState::RolledBack, Err(err))
            }
            Ok(_) if !request.policy.verifies_row_count() => (CommitState::Committed, Ok(())),
            Ok(_) => self.verify(target, expected, &telemetry),
        };

        job.finish(state, expected);
        telemetry.metrics().on_upload_end(state);
        telemetry.emit(UploadEvent::UploadFinished {
            target: target.to_string(),
            state,
            elapsed: clock.elapsed(),
        });
        info!(target_table = target, ?state, elapsed = ?clock.elapsed(), "upload finished");

        let log = request
            .log_target
            .as_ref()
            .map(|log_target| self.audit(log_target, &job, expected, &telemetry));

        UploadReport { job, outcome, log }
    }

    fn verify(&self, target: &str, expected: usize, telemetry: &Telemetry) -> (CommitState, UploadResult<()>) {
        let expected = expected as u64;
        match self.conn.count_rows(target) {
            Ok(actual) => {
                telemetry.emit(UploadEvent::Verified {
                    target: target.to_string(),
                    expected,
                    actual,
                });
                if actual == expected {
                    (CommitState::Committed, Ok(()))
                } else {
                    warn!(target_table = target, expected, actual, "row count mismatch after load");
                    (
                        CommitState::Fault,
                        Err(UploadError::VerificationMismatch {
                            target: target.to_string(),
                            expected,
                            actual,
                        }),
                    )
                }
            }
            Err(err) => {
                warn!(target_table = target, error = %err, "row count verification failed");
                (CommitState::Fault, Err(err))
            }
        }
    }

    fn audit(
        &self,
        log_target: &LogTarget,
        job: &UploadJob,
        dataset_rows: usize,
        telemetry: &Telemetry,
    ) -> UploadResult<LogRecord> {
        let logger = AuditLogger::new(log_target.clone());
        let record = AuditLogger::record(job, dataset_rows)?;
        match logger.persist(&self.conn, &record) {
            Ok(()) => {
                telemetry.emit(UploadEvent::AuditPersisted {
                    log_target: log_target.to_string(),
                    target: record.target.clone(),
                });
                Ok(record)
            }
            Err(err) => {
                warn!(log_table = %log_target, error = %err, "failed to write audit row");
                Err(err)
            }
        }
    }
}
