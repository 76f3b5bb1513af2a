use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::driver::{Driver, Session};
use super::{ConnectionParams, CredentialProvider};
use crate::error::{ErrorKind, UploadError, UploadResult};

/// Bounded set of sessions shared by every upload running against one database.
///
/// Sessions are opened lazily, reused while healthy, and discarded after a connection failure.
pub(crate) struct Pool {
    driver: Arc<dyn Driver>,
    params: ConnectionParams,
    credentials: Arc<dyn CredentialProvider>,
    idle: Mutex<Vec<Box<dyn Session>>>,
    permits: Permits,
    wait_ns: AtomicU64,
}

impl Pool {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        params: ConnectionParams,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let size = params.pool_size.max(1);
        Self {
            driver,
            params,
            credentials,
            idle: Mutex::new(Vec::with_capacity(size)),
            permits: Permits::new(size),
            wait_ns: AtomicU64::new(0),
        }
    }

    /// Borrow a session, blocking while the pool is exhausted.
    pub(crate) fn checkout(&self) -> UploadResult<PooledSession<'_>> {
        let waited = self.permits.acquire();
        if waited > Duration::ZERO {
            let add = waited.as_nanos().min(u64::MAX as u128) as u64;
            let _ = self.wait_ns.fetch_add(add, Ordering::SeqCst);
            debug!(driver = self.driver.name(), ?waited, "waited for pooled session");
        }

        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let session = match reused {
            Some(session) => session,
            None => match self.open() {
                Ok(session) => session,
                Err(err) => {
                    self.permits.release();
                    return Err(err);
                }
            },
        };

        Ok(PooledSession {
            pool: self,
            session: Some(session),
            broken: false,
        })
    }

    /// Total time callers spent waiting for a session.
    pub(crate) fn total_wait(&self) -> Duration {
        Duration::from_nanos(self.wait_ns.load(Ordering::SeqCst))
    }

    /// Number of idle sessions ready for reuse.
    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    fn open(&self) -> UploadResult<Box<dyn Session>> {
        let credentials = self.credentials.credentials()?;
        debug!(
            driver = self.driver.name(),
            host = %self.params.host,
            database = %self.params.database,
            "opening session"
        );
        self.driver.connect(&self.params, credentials.as_ref())
    }

    fn give_back(&self, session: Box<dyn Session>) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(session);
        }
    }
}

/// Counting permits bounding how many sessions are on loan at once.
struct Permits {
    free: Mutex<usize>,
    cv: Condvar,
}

impl Permits {
    fn new(count: usize) -> Self {
        Self {
            free: Mutex::new(count),
            cv: Condvar::new(),
        }
    }

    /// Take one permit, blocking until one is free. Returns the time spent blocked.
    fn acquire(&self) -> Duration {
        let start = Instant::now();
        let mut free = self.free.lock().expect("pool permits mutex poisoned");
        if *free > 0 {
            *free -= 1;
            return Duration::ZERO;
        }
        while *free == 0 {
            free = self.cv.wait(free).expect("pool permits mutex poisoned");
        }
        *free -= 1;
        start.elapsed()
    }

    fn release(&self) {
        let mut free = self.free.lock().expect("pool permits mutex poisoned");
        *free += 1;
        self.cv.notify_one();
    }
}

/// A session on loan from the [`Pool`]; returned (or discarded) on drop.
pub(crate) struct PooledSession<'p> {
    pool: &'p Pool,
    session: Option<Box<dyn Session>>,
    broken: bool,
}

impl PooledSession<'_> {
    pub(crate) fn session(&mut self) -> UploadResult<&mut dyn Session> {
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(UploadError::Connection {
                message: "session already returned to the pool".to_string(),
            }),
        }
    }

    /// Drop the session instead of reusing it if `err` says the transport is gone.
    pub(crate) fn note_error(&mut self, err: &UploadError) {
        if err.kind() == ErrorKind::Connection {
            self.mark_broken();
        }
    }

    pub(crate) fn mark_broken(&mut self) {
        if !self.broken {
            warn!(driver = self.pool.driver.name(), "discarding broken session");
        }
        self.broken = true;
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if !self.broken {
                self.pool.give_back(session);
            }
        }
        self.pool.permits.release();
    }
}
