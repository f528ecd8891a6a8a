use serde::Serialize;
use tokio::time::Instant;

use crate::scheduler::SchedulerStats;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderStats {
    pub render_id: String,
    pub shell_ms: f64,
    pub total_ms: f64,
    pub shell_bytes: usize,
    pub bytes_written: usize,
    pub patches: usize,
    pub error_patches: usize,
    pub resumable_entries: usize,
    pub scheduler: SchedulerStats,
}

impl RenderStats {
    pub fn new(render_id: impl Into<String>) -> Self {
        Self { render_id: render_id.into(), ..Self::default() }
    }

    pub fn log_if_slow(&self, threshold_ms: f64) {
        if self.total_ms > threshold_ms {
            tracing::warn!(
                "Slow streaming render {}: {:.2}ms total (shell: {:.2}ms, patches: {}, errors: {}, timed out: {})",
                self.render_id,
                self.total_ms,
                self.shell_ms,
                self.patches,
                self.error_patches,
                self.scheduler.timed_out
            );
        }
    }

    pub fn log_summary(&self) {
        tracing::debug!(
            "Render {} finished: {} bytes, {} patches, peak concurrency {}, {:.2}ms",
            self.render_id,
            self.bytes_written,
            self.patches,
            self.scheduler.peak_rendering,
            self.total_ms
        );
    }
}

pub(crate) struct TimingScope {
    start: Instant,
}

impl TimingScope {
    pub(crate) fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub(crate) fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
