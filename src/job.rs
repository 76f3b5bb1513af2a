//! Per-upload state.

use std::fmt;

use chrono::{DateTime, Local};
use tracing::warn;

use crate::error::{UploadError, UploadResult};
use crate::strategy::StrategyKind;

/// Fully-qualified target table, e.g. `dbo.[orders]` or `main.orders`.
///
/// Used verbatim in generated statements; never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadTarget(String);

impl UploadTarget {
    /// Wrap a table name. Blank names are rejected.
    pub fn new(name: impl Into<String>) -> UploadResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(UploadError::InvalidOptions {
                message: "target table must not be empty".to_string(),
            });
        }
        Ok(Self(name))
    }

    /// The name as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Table that receives one audit row per logged upload.
pub type LogTarget = UploadTarget;

/// Where an upload ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// Still running.
    Pending,
    /// Committed, and the row count checked out (or was not checked).
    Committed,
    /// The load failed and its transaction was rolled back.
    RolledBack,
    /// The load committed but the target row count disagrees with the dataset.
    Fault,
}

impl CommitState {
    /// `true` for every state except [`CommitState::Pending`].
    pub fn is_terminal(self) -> bool {
        self != CommitState::Pending
    }
}

/// State and outcome of one upload invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadJob {
    target: UploadTarget,
    strategy: StrategyKind,
    started_at: DateTime<Local>,
    ended_at: Option<DateTime<Local>>,
    row_count: usize,
    commit_state: CommitState,
}

impl UploadJob {
    /// A pending job starting now.
    pub fn start(target: UploadTarget, strategy: StrategyKind) -> Self {
        Self::start_at(target, strategy, Local::now())
    }

    /// A pending job with an explicit start time.
    pub fn start_at(target: UploadTarget, strategy: StrategyKind, started_at: DateTime<Local>) -> Self {
        Self {
            target,
            strategy,
            started_at,
            ended_at: None,
            row_count: 0,
            commit_state: CommitState::Pending,
        }
    }

    /// Record the outcome, stamping the end time now.
    pub fn finish(&mut self, state: CommitState, row_count: usize) {
        self.finish_at(state, row_count, Local::now());
    }

    /// Record the outcome with an explicit end time. Only the first call takes effect.
    pub fn finish_at(&mut self, state: CommitState, row_count: usize, ended_at: DateTime<Local>) {
        if self.commit_state.is_terminal() {
            warn!(
                target_table = %self.target,
                state = ?self.commit_state,
                "upload job already finished; ignoring second outcome"
            );
            return;
        }
        self.commit_state = state;
        self.row_count = row_count;
        self.ended_at = Some(ended_at);
    }

    /// Target table.
    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// Strategy that ran.
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// When the upload started.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// When the upload finished, once it has.
    pub fn ended_at(&self) -> Option<DateTime<Local>> {
        self.ended_at
    }

    /// Dataset rows the upload was asked to load.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Current state.
    pub fn commit_state(&self) -> CommitState {
        self.commit_state
    }
}
