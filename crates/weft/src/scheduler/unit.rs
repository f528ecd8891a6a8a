use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::error::BoundaryFailure;
use crate::node::ResumeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundaryId(u32);

impl BoundaryId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Rendering,
    Complete,
    Error,
}

impl UnitStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitStatus::Complete | UnitStatus::Error)
    }
}

/// One asynchronous subtree awaiting resolution. Owned by the scheduler from
/// registration until it is handed back by `drain`.
#[derive(Debug)]
pub struct BoundaryUnit {
    id: BoundaryId,
    priority: i32,
    status: UnitStatus,
    fallback_markup: String,
    result_markup: Option<String>,
    failure: Option<BoundaryFailure>,
    started_at: Option<DateTime<Utc>>,
    needs_activation: bool,
    state: Option<ResumeState>,
    parent: Option<BoundaryId>,
    pub(crate) seq: u64,
    pub(crate) terminal_seq: Option<u64>,
    pub(crate) started: Option<Instant>,
    pub(crate) finished: Option<Instant>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) abort: Option<AbortHandle>,
}

impl BoundaryUnit {
    pub fn new(id: BoundaryId, fallback_markup: impl Into<String>) -> Self {
        Self {
            id,
            priority: 0,
            status: UnitStatus::Pending,
            fallback_markup: fallback_markup.into(),
            result_markup: None,
            failure: None,
            started_at: None,
            needs_activation: true,
            state: None,
            parent: None,
            seq: 0,
            terminal_seq: None,
            started: None,
            finished: None,
            deadline: None,
            abort: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_needs_activation(mut self, needs_activation: bool) -> Self {
        self.needs_activation = needs_activation;
        self
    }

    /// Set when the boundary sits inside another boundary's resolved content.
    pub fn with_parent(mut self, parent: Option<BoundaryId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn id(&self) -> BoundaryId {
        self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn status(&self) -> UnitStatus {
        self.status
    }

    pub fn fallback_markup(&self) -> &str {
        &self.fallback_markup
    }

    pub fn result_markup(&self) -> Option<&str> {
        self.result_markup.as_deref()
    }

    pub fn failure(&self) -> Option<&BoundaryFailure> {
        self.failure.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn needs_activation(&self) -> bool {
        self.needs_activation
    }

    pub fn state(&self) -> Option<&ResumeState> {
        self.state.as_ref()
    }

    /// The boundary whose patch carries this one's placeholder.
    pub fn parent(&self) -> Option<BoundaryId> {
        self.parent
    }

    /// Time between admission and reaching a terminal state.
    pub fn render_duration(&self) -> Option<std::time::Duration> {
        match (self.started, self.finished) {
            (Some(started), Some(finished)) => Some(finished.saturating_duration_since(started)),
            _ => None,
        }
    }

    pub(crate) fn start(&mut self, abort: AbortHandle, timeout: Option<std::time::Duration>) -> bool {
        if self.status != UnitStatus::Pending {
            return false;
        }
        let now = Instant::now();
        self.status = UnitStatus::Rendering;
        self.started_at = Some(Utc::now());
        self.started = Some(now);
        self.deadline = timeout.map(|timeout| now + timeout);
        self.abort = Some(abort);
        true
    }

    pub(crate) fn complete(&mut self, markup: String, state: Option<ResumeState>) -> bool {
        if self.status != UnitStatus::Rendering {
            return false;
        }
        self.status = UnitStatus::Complete;
        self.finished = Some(Instant::now());
        self.result_markup = Some(markup);
        self.state = state;
        self.abort = None;
        true
    }

    pub(crate) fn fail(&mut self, failure: BoundaryFailure) -> bool {
        if self.status != UnitStatus::Rendering {
            return false;
        }
        self.status = UnitStatus::Error;
        self.finished = Some(Instant::now());
        self.failure = Some(failure);
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
        true
    }

    pub(crate) fn abandon(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }

    pub(crate) fn is_overdue(&self, now: Instant) -> bool {
        self.status == UnitStatus::Rendering && self.deadline.is_some_and(|deadline| deadline <= now)
    }
}
