use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::order::ChunkOrder;
use super::sink::ChunkSink;
use super::stats::{RenderStats, TimingScope};
use super::types::{ChunkKind, StreamChunk};
use crate::config::RenderConfig;
use crate::error::StreamError;
use crate::node::{Node, ResumeState};
use crate::protocol::ProtocolEncoder;
use crate::scheduler::{BoundaryId, BoundaryScheduler, BoundaryUnit, UnitStatus};

/// Drives one render session: shell first, then a patch per resolved
/// boundary as the scheduler hands them over, then the end chunk.
pub struct StreamMultiplexer<S: ChunkSink> {
    sink: S,
    config: RenderConfig,
    encoder: ProtocolEncoder,
    order: ChunkOrder,
    cancel: CancellationToken,
    stats: RenderStats,
}

impl<S: ChunkSink> StreamMultiplexer<S> {
    pub fn new(sink: S, config: RenderConfig) -> Self {
        let encoder =
            ProtocolEncoder::new(config.protocol.clone()).resumable(config.stream.resumable);
        let stats = RenderStats::new(encoder.runtime_name());
        Self {
            sink,
            config,
            encoder,
            order: ChunkOrder::new(),
            cancel: CancellationToken::new(),
            stats,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_encoder(mut self, encoder: ProtocolEncoder) -> Self {
        self.stats.render_id = encoder.runtime_name().to_string();
        self.encoder = encoder.resumable(self.config.stream.resumable);
        self
    }

    pub fn encoder(&self) -> &ProtocolEncoder {
        &self.encoder
    }

    pub async fn run(mut self, root: Node) -> Result<RenderStats, StreamError> {
        let timing = TimingScope::new();
        let mut scheduler = BoundaryScheduler::new(self.config.scheduler.clone());

        let result = match self.config.validate() {
            Ok(()) => self.stream(&mut scheduler, root, &timing).await,
            Err(e) => Err(e.into()),
        };

        let abandoned = scheduler.cancel_all();
        self.stats.scheduler = scheduler.stats().clone();
        self.stats.total_ms = timing.elapsed_ms();

        let result = result.map_err(|e| e.with_property("render_id", &self.stats.render_id));
        match result {
            Ok(()) => {
                self.stats.log_if_slow(self.config.stream.slow_render_threshold_ms as f64);
                self.stats.log_summary();
                self.config.hooks.complete(&self.stats);
                Ok(self.stats)
            }
            Err(e) if e.is_cancelled() => {
                info!(
                    "Render {} cancelled after {} patches; {} boundaries abandoned",
                    self.stats.render_id, self.stats.patches, abandoned
                );
                Err(e)
            }
            Err(e) => {
                error!("Render {} failed: {}", self.stats.render_id, e);
                self.config.hooks.error(&e);
                Err(e)
            }
        }
    }

    async fn stream(
        &mut self,
        scheduler: &mut BoundaryScheduler,
        root: Node,
        timing: &TimingScope,
    ) -> Result<(), StreamError> {
        if let Err(e) = self.write_shell(scheduler, root).await {
            if e.is_shell_failure() {
                scheduler.cancel_all();
                self.write_error_document().await;
            }
            return Err(e);
        }
        self.stats.shell_ms = timing.elapsed_ms();
        self.config.hooks.shell_ready();

        let resumable = self.config.stream.resumable;
        let mut resume_entries: Vec<(BoundaryId, ResumeState)> = Vec::new();

        loop {
            let batch = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(StreamError::cancelled("render cancelled"));
                }
                () = self.sink.closed() => {
                    return Err(StreamError::cancelled("consumer disconnected"));
                }
                batch = scheduler.drain() => batch,
            };

            if batch.is_empty() {
                break;
            }

            for unit in batch {
                self.write_patch(&unit).await?;
                if resumable && let Some(state) = unit.state() {
                    resume_entries.push((unit.id(), state.clone()));
                }
                self.config.hooks.boundary_ready(unit.id());
            }
        }

        if resumable {
            let script = self.encoder.encode_resumability(&resume_entries);
            self.stats.resumable_entries = resume_entries.len();
            self.write_chunk(StreamChunk::new(ChunkKind::Resumability, script)).await?;
        }

        let epilogue = self.config.shell.epilogue.clone();
        self.write_chunk(StreamChunk::new(ChunkKind::End, epilogue)).await?;
        self.sink.close().await?;
        Ok(())
    }

    async fn write_shell(
        &mut self,
        scheduler: &mut BoundaryScheduler,
        root: Node,
    ) -> Result<(), StreamError> {
        let deadline = self.config.scheduler.shell_timeout().map(|timeout| Instant::now() + timeout);

        let body = scheduler.render_tree(root)?;
        debug!("Shell rendered with {} boundaries pending", scheduler.len());

        let shell = self.shell_markup(&body);
        self.stats.shell_bytes = shell.len();
        let chunk = StreamChunk::new(ChunkKind::Shell, shell);

        match deadline {
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return Err(StreamError::shell_timeout("shell render exceeded its deadline"));
                }
                tokio::time::timeout_at(deadline, self.write_chunk(chunk)).await??;
            }
            None => self.write_chunk(chunk).await?,
        }
        Ok(())
    }

    fn shell_markup(&self, body: &str) -> String {
        let shell = &self.config.shell;
        let bootstrap = self.encoder.bootstrap_script();
        let scripts: usize = shell.scripts.iter().map(String::len).sum();

        let mut out =
            String::with_capacity(shell.preamble.len() + bootstrap.len() + scripts + body.len());
        out.push_str(&shell.preamble);
        out.push_str(&bootstrap);
        for script in &shell.scripts {
            out.push_str(script);
        }
        out.push_str(body);
        out
    }

    async fn write_patch(&mut self, unit: &BoundaryUnit) -> Result<(), StreamError> {
        let script = self.encoder.encode_patch(unit)?;
        if unit.status() == UnitStatus::Error {
            self.stats.error_patches += 1;
        }
        self.write_chunk(StreamChunk::patch(unit.id(), script)).await?;
        self.stats.patches += 1;
        if let Some(elapsed) = unit.render_duration() {
            debug!("Boundary {} patched after {:?} of rendering", unit.id(), elapsed);
        }
        Ok(())
    }

    async fn write_error_document(&mut self) {
        let Some(document) = self.config.shell.error_document.clone() else { return };
        if self.order.shell_written() {
            debug!("Shell already started; no error document for render {}", self.stats.render_id);
            return;
        }

        if let Err(e) = self.write_chunk(StreamChunk::new(ChunkKind::ErrorDocument, document)).await
        {
            warn!("Failed to write error document: {}", e);
            return;
        }
        if let Err(e) = self.sink.close().await {
            warn!("Failed to close sink after error document: {}", e);
        }
    }

    async fn write_chunk(&mut self, chunk: StreamChunk) -> Result<(), StreamError> {
        self.order.admit(chunk.kind)?;
        let len = chunk.len();

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return Err(StreamError::cancelled("render cancelled"));
            }
            result = self.sink.write(chunk) => result?,
        }

        self.stats.bytes_written += len;
        Ok(())
    }
}
