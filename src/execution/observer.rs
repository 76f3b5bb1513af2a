use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::job::CommitState;
use crate::strategy::{ExistencePolicy, StrategyKind};

/// Events emitted while an upload runs.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    UploadStarted {
        target: String,
        strategy: StrategyKind,
        rows: usize,
    },
    PreloadApplied {
        target: String,
        policy: ExistencePolicy,
    },
    ChunkSent {
        target: String,
        index: usize,
        start_row: usize,
        row_count: usize,
    },
    StagingFileWritten {
        path: PathBuf,
        rows: usize,
    },
    StagingFileRemoved {
        path: PathBuf,
    },
    Verified {
        target: String,
        expected: u64,
        actual: u64,
    },
    UploadFinished {
        target: String,
        state: CommitState,
        elapsed: Duration,
    },
    AuditPersisted {
        log_target: String,
        target: String,
    },
}

/// Observer hook for upload events.
pub trait UploadObserver: Send + Sync {
    fn on_event(&self, event: &UploadEvent);
}

/// A simple stderr logger for upload events.
#[derive(Debug, Default)]
pub struct StdErrUploadObserver;

impl UploadObserver for StdErrUploadObserver {
    fn on_event(&self, event: &UploadEvent) {
        eprintln!("[upload] {event:?}");
    }
}

/// Fans events out to several observers.
#[derive(Default)]
pub struct CompositeUploadObserver {
    observers: Vec<Arc<dyn UploadObserver>>,
}

impl CompositeUploadObserver {
    pub fn new(observers: Vec<Arc<dyn UploadObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeUploadObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeUploadObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl UploadObserver for CompositeUploadObserver {
    fn on_event(&self, event: &UploadEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}

/// Live counters across every upload run by one [`crate::Uploader`].
///
/// Callers can snapshot them at any time, including while background uploads run.
pub struct UploadMetrics {
    uploads_started: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    faulted: AtomicU64,
    chunks_sent: AtomicU64,
    rows_sent: AtomicU64,

    active_uploads: AtomicUsize,
    max_active_uploads: AtomicUsize,
}

impl UploadMetrics {
    pub fn new() -> Self {
        Self {
            uploads_started: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
            faulted: AtomicU64::new(0),
            chunks_sent: AtomicU64::new(0),
            rows_sent: AtomicU64::new(0),
            active_uploads: AtomicUsize::new(0),
            max_active_uploads: AtomicUsize::new(0),
        }
    }

    pub fn on_upload_start(&self) {
        let _ = self.uploads_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_uploads.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_uploads, now);
    }

    pub fn on_upload_end(&self, state: CommitState) {
        let counter = match state {
            CommitState::Committed => &self.committed,
            CommitState::RolledBack => &self.rolled_back,
            CommitState::Fault => &self.faulted,
            CommitState::Pending => return,
        };
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_uploads.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_chunk_sent(&self, rows: usize) {
        let _ = self.chunks_sent.fetch_add(1, Ordering::SeqCst);
        let _ = self.rows_sent.fetch_add(rows as u64, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> UploadMetricsSnapshot {
        UploadMetricsSnapshot {
            uploads_started: self.uploads_started.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            rolled_back: self.rolled_back.load(Ordering::SeqCst),
            faulted: self.faulted.load(Ordering::SeqCst),
            chunks_sent: self.chunks_sent.load(Ordering::SeqCst),
            rows_sent: self.rows_sent.load(Ordering::SeqCst),
            active_uploads: self.active_uploads.load(Ordering::SeqCst),
            max_active_uploads: self.max_active_uploads.load(Ordering::SeqCst),
        }
    }
}

impl Default for UploadMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    loop {
        let cur = dst.load(Ordering::SeqCst);
        if now <= cur {
            break;
        }
        if dst.compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            break;
        }
    }
}

/// Immutable snapshot of [`UploadMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetricsSnapshot {
    pub uploads_started: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub faulted: u64,
    pub chunks_sent: u64,
    pub rows_sent: u64,
    pub active_uploads: usize,
    pub max_active_uploads: usize,
}

impl fmt::Display for UploadMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uploads={} (committed={}, rolled_back={}, faulted={}), chunks_sent={}, rows_sent={}, active={}, max_active={}",
            self.uploads_started,
            self.committed,
            self.rolled_back,
            self.faulted,
            self.chunks_sent,
            self.rows_sent,
            self.active_uploads,
            self.max_active_uploads
        )
    }
}

/// Observer + metrics handed to the strategies.
#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    observer: Option<Arc<dyn UploadObserver>>,
    metrics: Arc<UploadMetrics>,
}

impl Telemetry {
    pub(crate) fn new(observer: Option<Arc<dyn UploadObserver>>, metrics: Arc<UploadMetrics>) -> Self {
        Self { observer, metrics }
    }

    pub(crate) fn emit(&self, event: UploadEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }

    pub(crate) fn metrics(&self) -> &UploadMetrics {
        &self.metrics
    }

    pub(crate) fn chunk_sent(&self, target: &str, index: usize, range: &std::ops::Range<usize>) {
        self.metrics.on_chunk_sent(range.len());
        self.emit(UploadEvent::ChunkSent {
            target: target.to_string(),
            index,
            start_row: range.start,
            row_count: range.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl UploadObserver for Counting {
        fn on_event(&self, _event: &UploadEvent) {
            let _ = self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn composite_fans_out_to_every_observer() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let composite = CompositeUploadObserver::new(vec![a.clone(), b.clone()]);
        composite.on_event(&UploadEvent::StagingFileRemoved {
            path: PathBuf::from("tmp.csv"),
        });
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn metrics_track_outcomes_and_peak_concurrency() {
        let m = UploadMetrics::new();
        m.on_upload_start();
        m.on_upload_start();
        m.on_chunk_sent(300);
        m.on_chunk_sent(12);
        m.on_upload_end(CommitState::Committed);
        m.on_upload_end(CommitState::Fault);

        let snap = m.snapshot();
        assert_eq!(snap.uploads_started, 2);
        assert_eq!(snap.committed, 1);
        assert_eq!(snap.faulted, 1);
        assert_eq!(snap.rows_sent, 312);
        assert_eq!(snap.active_uploads, 0);
        assert_eq!(snap.max_active_uploads, 2);
        assert!(snap.to_string().contains("chunks_sent=2"));
    }
}
