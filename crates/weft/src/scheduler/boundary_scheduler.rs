use futures::FutureExt;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::ordering::release_order;
use super::unit::{BoundaryId, BoundaryUnit, UnitStatus};
use crate::config::SchedulerConfig;
use crate::error::{BoundaryFailure, RenderError};
use crate::node::{BoundaryResult, BoundaryTask};
use crate::render::{BoundaryHost, DEFAULT_MAX_DEPTH, FragmentRenderer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub registered: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub abandoned: usize,
    pub discarded_results: usize,
    pub peak_rendering: usize,
}

struct CompletionEvent {
    id: BoundaryId,
    result: BoundaryResult,
}

enum Wake {
    Event(Option<CompletionEvent>),
    Deadline,
}

/// Owns every in-flight boundary of one render.
///
/// Tasks never touch the unit set: they push a completion event that the
/// next `drain` applies, so all mutation happens through `&mut self`.
pub struct BoundaryScheduler {
    config: SchedulerConfig,
    units: FxHashMap<BoundaryId, BoundaryUnit>,
    queued_tasks: FxHashMap<BoundaryId, BoundaryTask>,
    pending: VecDeque<BoundaryId>,
    rendering: usize,
    next_id: u32,
    next_seq: u64,
    next_terminal_seq: u64,
    max_depth: usize,
    events_tx: mpsc::UnboundedSender<CompletionEvent>,
    events_rx: mpsc::UnboundedReceiver<CompletionEvent>,
    stats: SchedulerStats,
}

impl BoundaryScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            units: FxHashMap::default(),
            queued_tasks: FxHashMap::default(),
            pending: VecDeque::new(),
            rendering: 0,
            next_id: 0,
            next_seq: 0,
            next_terminal_seq: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            events_tx,
            events_rx,
            stats: SchedulerStats::default(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn rendering_count(&self) -> usize {
        self.rendering
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn status(&self, id: BoundaryId) -> Option<UnitStatus> {
        self.units.get(&id).map(BoundaryUnit::status)
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Renders a tree, registering every boundary it contains with this
    /// scheduler. Returns the synchronous markup.
    pub fn render_tree(&mut self, node: crate::node::Node) -> Result<String, RenderError> {
        let max_depth = self.max_depth;
        let mut renderer = FragmentRenderer::new(&mut *self).with_max_depth(max_depth);
        let result = renderer.render(node);
        let registered = renderer.into_registered();
        if result.is_err() {
            self.abandon(&registered);
        }
        result
    }

    /// Waits until at least one unit can be emitted, then returns the newly
    /// emittable units in emission order. Returns an empty list only once the
    /// unit set is empty.
    pub async fn drain(&mut self) -> Vec<BoundaryUnit> {
        loop {
            self.expire_overdue(Instant::now());

            let batch = self.take_releasable();
            if !batch.is_empty() || self.units.is_empty() {
                return batch;
            }

            let deadline = self.next_deadline();
            let wake = tokio::select! {
                biased;
                event = self.events_rx.recv() => Wake::Event(event),
                () = wait_for_deadline(deadline) => Wake::Deadline,
            };

            match wake {
                Wake::Event(Some(event)) => {
                    self.apply(event);
                    while let Ok(event) = self.events_rx.try_recv() {
                        self.apply(event);
                    }
                }
                Wake::Event(None) => {
                    // Unreachable while we hold a sender, but never spin.
                    warn!("Completion channel closed with {} units outstanding", self.units.len());
                    self.cancel_all();
                }
                Wake::Deadline => {}
            }
        }
    }

    /// Aborts every outstanding task and empties the unit set. Returns how
    /// many non-terminal units were abandoned.
    pub fn cancel_all(&mut self) -> usize {
        let mut abandoned = 0;
        for (_, mut unit) in self.units.drain() {
            if !unit.status().is_terminal() {
                unit.abandon();
                abandoned += 1;
            }
        }
        self.queued_tasks.clear();
        self.pending.clear();
        self.rendering = 0;
        self.stats.abandoned += abandoned;

        if abandoned > 0 {
            debug!("Abandoned {} outstanding boundaries", abandoned);
        }
        abandoned
    }

    fn abandon(&mut self, ids: &[BoundaryId]) {
        for id in ids {
            if let Some(mut unit) = self.units.remove(id) {
                match unit.status() {
                    UnitStatus::Rendering => self.rendering -= 1,
                    UnitStatus::Pending => self.pending.retain(|pending| pending != id),
                    UnitStatus::Complete | UnitStatus::Error => {}
                }
                if !unit.status().is_terminal() {
                    self.stats.abandoned += 1;
                }
                unit.abandon();
            }
            self.queued_tasks.remove(id);
        }
    }

    fn admit(&mut self) {
        let limit = self.config.concurrency_limit.max(1);
        let timeout = self.config.boundary_timeout();

        while self.rendering < limit {
            let Some(id) = self.pending.pop_front() else { break };
            let Some(task) = self.queued_tasks.remove(&id) else { continue };
            let Some(unit) = self.units.get_mut(&id) else { continue };

            let events = self.events_tx.clone();
            let handle = tokio::spawn(async move {
                let result = match AssertUnwindSafe(async move { task().await }).catch_unwind().await
                {
                    Ok(result) => result,
                    Err(panic) => Err(BoundaryFailure::Panicked(panic_message(panic.as_ref()))),
                };
                let _ = events.send(CompletionEvent { id, result });
            });

            if unit.start(handle.abort_handle(), timeout) {
                self.rendering += 1;
                self.stats.peak_rendering = self.stats.peak_rendering.max(self.rendering);
                debug!("Boundary {} admitted ({} rendering)", id, self.rendering);
            } else {
                handle.abort();
            }
        }
    }

    fn apply(&mut self, event: CompletionEvent) {
        let CompletionEvent { id, result } = event;

        let is_live = self.units.get(&id).is_some_and(|unit| unit.status() == UnitStatus::Rendering);
        if !is_live {
            self.stats.discarded_results += 1;
            debug!("Discarding late result for boundary {}", id);
            return;
        }

        let outcome = match result {
            Ok(output) => {
                let max_depth = self.max_depth;
                let mut renderer =
                    FragmentRenderer::new(&mut *self).with_max_depth(max_depth).within(id);
                let rendered = renderer.render(output.node);
                let nested = renderer.into_registered();
                match rendered {
                    Ok(markup) => Ok((markup, output.state)),
                    Err(e) => {
                        self.abandon(&nested);
                        Err(BoundaryFailure::Render(e))
                    }
                }
            }
            Err(failure) => Err(failure),
        };

        self.finish(id, outcome);
    }

    fn finish(
        &mut self,
        id: BoundaryId,
        outcome: Result<(String, Option<crate::node::ResumeState>), BoundaryFailure>,
    ) {
        let Some(unit) = self.units.get_mut(&id) else { return };

        let transitioned = match outcome {
            Ok((markup, state)) => {
                let done = unit.complete(markup, state);
                if done {
                    self.stats.completed += 1;
                }
                done
            }
            Err(failure) => {
                warn!("Boundary {} failed: {}", id, failure);
                let done = unit.fail(failure);
                if done {
                    self.stats.failed += 1;
                }
                done
            }
        };

        if transitioned {
            unit.terminal_seq = Some(self.next_terminal_seq);
            self.next_terminal_seq += 1;
            self.rendering -= 1;
            self.admit();
        }
    }

    fn expire_overdue(&mut self, now: Instant) {
        let overdue: Vec<BoundaryId> = self
            .units
            .values()
            .filter(|unit| unit.is_overdue(now))
            .map(BoundaryUnit::id)
            .collect();

        if overdue.is_empty() {
            return;
        }

        let timeout_ms = self.config.boundary_timeout_ms.unwrap_or_default();
        for id in overdue {
            warn!("Boundary {} timed out after {}ms", id, timeout_ms);
            self.stats.timed_out += 1;
            self.finish(id, Err(BoundaryFailure::TimedOut(timeout_ms)));
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.units
            .values()
            .filter(|unit| unit.status() == UnitStatus::Rendering)
            .filter_map(|unit| unit.deadline)
            .min()
    }

    fn take_releasable(&mut self) -> Vec<BoundaryUnit> {
        release_order(&self.units, self.config.ordering_mode, self.config.out_of_order)
            .into_iter()
            .filter_map(|id| self.units.remove(&id))
            .collect()
    }
}

impl BoundaryHost for BoundaryScheduler {
    fn allocate_id(&mut self) -> BoundaryId {
        let id = BoundaryId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn register(&mut self, mut unit: BoundaryUnit, task: BoundaryTask) -> Result<(), RenderError> {
        let id = unit.id();
        if self.units.contains_key(&id)
            || id.get() >= self.next_id
            || unit.status() != UnitStatus::Pending
        {
            return Err(RenderError::DuplicateBoundary(id));
        }

        unit.seq = self.next_seq;
        self.next_seq += 1;
        self.units.insert(id, unit);
        self.queued_tasks.insert(id, task);
        self.pending.push_back(id);
        self.stats.registered += 1;

        self.admit();
        Ok(())
    }
}

impl Drop for BoundaryScheduler {
    fn drop(&mut self) {
        for unit in self.units.values_mut() {
            unit.abandon();
        }
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
