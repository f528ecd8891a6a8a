use std::sync::Arc;

use super::{ConfigError, ProtocolConfig, SchedulerConfig, StreamConfig};
use crate::error::StreamError;
use crate::scheduler::BoundaryId;
use crate::streaming::RenderStats;

type ShellReadyHook = Arc<dyn Fn() + Send + Sync>;
type BoundaryReadyHook = Arc<dyn Fn(BoundaryId) + Send + Sync>;
type CompleteHook = Arc<dyn Fn(&RenderStats) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&StreamError) + Send + Sync>;

/// Document frame around the synchronously rendered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellTemplate {
    pub preamble: String,
    pub epilogue: String,
    pub scripts: Vec<String>,
    /// Written as the sole output when the shell fails.
    pub error_document: Option<String>,
}

impl Default for ShellTemplate {
    fn default() -> Self {
        Self {
            preamble: "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body>"
                .to_string(),
            epilogue: "</body></html>".to_string(),
            scripts: Vec::new(),
            error_document: None,
        }
    }
}

impl ShellTemplate {
    pub fn new(preamble: impl Into<String>, epilogue: impl Into<String>) -> Self {
        Self { preamble: preamble.into(), epilogue: epilogue.into(), ..Self::default() }
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.scripts.push(script.into());
        self
    }

    pub fn with_error_document(mut self, document: impl Into<String>) -> Self {
        self.error_document = Some(document.into());
        self
    }
}

#[derive(Clone, Default)]
pub struct RenderHooks {
    pub on_shell_ready: Option<ShellReadyHook>,
    pub on_boundary_ready: Option<BoundaryReadyHook>,
    pub on_complete: Option<CompleteHook>,
    pub on_error: Option<ErrorHook>,
}

impl std::fmt::Debug for RenderHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderHooks")
            .field("on_shell_ready", &self.on_shell_ready.is_some())
            .field("on_boundary_ready", &self.on_boundary_ready.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl RenderHooks {
    pub fn on_shell_ready(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_shell_ready = Some(Arc::new(hook));
        self
    }

    pub fn on_boundary_ready(mut self, hook: impl Fn(BoundaryId) + Send + Sync + 'static) -> Self {
        self.on_boundary_ready = Some(Arc::new(hook));
        self
    }

    pub fn on_complete(mut self, hook: impl Fn(&RenderStats) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&StreamError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub(crate) fn shell_ready(&self) {
        if let Some(hook) = &self.on_shell_ready {
            hook();
        }
    }

    pub(crate) fn boundary_ready(&self, id: BoundaryId) {
        if let Some(hook) = &self.on_boundary_ready {
            hook(id);
        }
    }

    pub(crate) fn complete(&self, stats: &RenderStats) {
        if let Some(hook) = &self.on_complete {
            hook(stats);
        }
    }

    pub(crate) fn error(&self, error: &StreamError) {
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}

/// Everything one render session needs. Built once per request and never
/// shared between sessions.
#[derive(Debug, Clone, Default)]
pub struct RenderConfig {
    pub shell: ShellTemplate,
    pub scheduler: SchedulerConfig,
    pub protocol: ProtocolConfig,
    pub stream: StreamConfig,
    pub hooks: RenderHooks,
}

impl RenderConfig {
    pub fn new(shell: ShellTemplate) -> Self {
        Self { shell, ..Self::default() }
    }

    pub fn from_config(config: &super::Config, shell: ShellTemplate) -> Self {
        Self {
            shell,
            scheduler: config.scheduler.clone(),
            protocol: config.protocol.clone(),
            stream: config.stream.clone(),
            hooks: RenderHooks::default(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_hooks(mut self, hooks: RenderHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn resumable(mut self, resumable: bool) -> Self {
        self.stream.resumable = resumable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig("channel_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
