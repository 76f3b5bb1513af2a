//! Background execution of uploads.
//!
//! [`TaskScheduler::submit`] starts each upload on its own named OS thread and hands back an
//! [`UploadHandle`]; [`TaskScheduler::wait_all`] joins a set of handles in submission order.
//!
//! This module also carries the observer/metrics hooks shared by every upload:
//!
//! - [`UploadObserver`] receives [`UploadEvent`]s as they happen
//! - [`UploadMetrics`] keeps live counters that can be snapshotted at any time

mod observer;

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::error::{UploadError, UploadResult};
use crate::job::{CommitState, UploadJob, UploadTarget};
use crate::upload::{UploadReport, UploadRequest, Uploader};

pub use observer::{
    CompositeUploadObserver, StdErrUploadObserver, UploadEvent, UploadMetrics, UploadMetricsSnapshot,
    UploadObserver,
};

pub(crate) use observer::Telemetry;

/// Runs uploads concurrently, one thread per submission.
///
/// The scheduler keeps no reference to what it started; callers own the handles. Two
/// submissions for the same target are not serialized.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    uploader: Arc<Uploader>,
}

impl TaskScheduler {
    /// Scheduler running uploads through `uploader`.
    pub fn new(uploader: Arc<Uploader>) -> Self {
        Self { uploader }
    }

    /// Start `request` in the background.
    ///
    /// The job is created (and its start time taken) before this returns. Fails only when the OS
    /// refuses to spawn a thread.
    pub fn submit(&self, request: UploadRequest) -> UploadResult<UploadHandle> {
        let job = UploadJob::start(request.target().clone(), request.selected_strategy().kind());
        let fallback = job.clone();
        let rows = request.dataset().row_count();
        let uploader = Arc::clone(&self.uploader);

        let handle = thread::Builder::new()
            .name(format!("upload:{}", request.target()))
            .spawn(move || uploader.run(&request, job))?;
        debug!(target_table = %fallback.target(), rows, "upload submitted");

        Ok(UploadHandle {
            fallback,
            rows,
            handle,
        })
    }

    /// Join every handle, returning reports in the order given.
    pub fn wait_all(handles: Vec<UploadHandle>) -> Vec<UploadReport> {
        handles.into_iter().map(UploadHandle::join).collect()
    }
}

/// A running upload.
#[derive(Debug)]
pub struct UploadHandle {
    fallback: UploadJob,
    rows: usize,
    handle: JoinHandle<UploadReport>,
}

impl UploadHandle {
    /// Target table of the running upload.
    pub fn target(&self) -> &UploadTarget {
        self.fallback.target()
    }

    /// `true` once the worker thread has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the upload finishes.
    ///
    /// A worker that panicked yields a [`CommitState::RolledBack`] report carrying
    /// [`UploadError::WorkerPanicked`].
    pub fn join(self) -> UploadReport {
        let Self {
            mut fallback,
            rows,
            handle,
        } = self;
        match handle.join() {
            Ok(report) => report,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(target_table = %fallback.target(), %message, "upload worker panicked");
                fallback.finish(CommitState::RolledBack, rows);
                UploadReport {
                    outcome: Err(UploadError::WorkerPanicked {
                        target: fallback.target().to_string(),
                        message,
                    }),
                    job: fallback,
                    log: None,
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::panic_message;
    use std::any::Any;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let a: Box<dyn Any + Send> = Box::new("boom");
        let b: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let c: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(a.as_ref()), "boom");
        assert_eq!(panic_message(b.as_ref()), "bang");
        assert_eq!(panic_message(c.as_ref()), "non-string panic payload");
    }
}
