use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::config::ConfigError;
use crate::scheduler::BoundaryId;

/// Synchronous failure while walking a node tree.
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("component '{component}' failed: {message}")]
    Component { component: String, message: String },

    #[error("invalid attribute name '{0}'")]
    InvalidAttribute(String),

    #[error("invalid tag name '{0}'")]
    InvalidTag(String),

    #[error("fallback content must not contain a boundary")]
    SuspendingFallback,

    #[error("render depth exceeded {0}")]
    DepthExceeded(usize),

    #[error("boundary {0} is already registered")]
    DuplicateBoundary(BoundaryId),
}

impl RenderError {
    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component { component: component.into(), message: message.into() }
    }
}

/// Why a boundary ended in the `error` state.
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum BoundaryFailure {
    #[error("{0}")]
    Task(String),

    #[error("boundary task panicked: {0}")]
    Panicked(String),

    #[error("boundary timed out after {0}ms")]
    TimedOut(u64),

    #[error("resolved content failed to render: {0}")]
    Render(#[from] RenderError),
}

impl BoundaryFailure {
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

#[derive(ThisError, Debug)]
pub enum SinkError {
    #[error("consumer closed the stream")]
    Closed,

    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub code: String,
    pub details: Option<FxHashMap<String, String>>,
    pub source: Option<String>,
    #[serde(skip)]
    pub error_source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Clone for ErrorMetadata {
    fn clone(&self) -> Self {
        Self {
            code: self.code.clone(),
            details: self.details.clone(),
            source: self.source.clone(),
            error_source: None,
        }
    }
}

impl PartialEq for ErrorMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.details == other.details && self.source == other.source
    }
}

/// Stream-level failure surfaced to `on_error` and returned from a render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamError {
    Shell(String, Option<ErrorMetadata>),
    ShellTimeout(String, Option<ErrorMetadata>),
    Sink(String, Option<ErrorMetadata>),
    Cancelled(String, Option<ErrorMetadata>),
    Encoding(String, Option<ErrorMetadata>),
    Validation(String, Option<ErrorMetadata>),
    Internal(String, Option<ErrorMetadata>),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shell(msg, _) => write!(f, "Shell render failed: {msg}"),
            Self::ShellTimeout(msg, _) => write!(f, "Shell timed out: {msg}"),
            Self::Sink(msg, _) => write!(f, "Sink error: {msg}"),
            Self::Cancelled(msg, _) => write!(f, "Cancelled: {msg}"),
            Self::Encoding(msg, _) => write!(f, "Encoding error: {msg}"),
            Self::Validation(msg, _) => write!(f, "Validation error: {msg}"),
            Self::Internal(msg, _) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.metadata()
            .and_then(|meta| meta.error_source.as_ref())
            .map(|source| source.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl StreamError {
    pub fn message(&self) -> String {
        match self {
            Self::Shell(msg, _)
            | Self::ShellTimeout(msg, _)
            | Self::Sink(msg, _)
            | Self::Cancelled(msg, _)
            | Self::Encoding(msg, _)
            | Self::Validation(msg, _)
            | Self::Internal(msg, _) => msg.clone(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Shell(_, _) => "SHELL_ERROR",
            Self::ShellTimeout(_, _) => "SHELL_TIMEOUT",
            Self::Sink(_, _) => "SINK_ERROR",
            Self::Cancelled(_, _) => "CANCELLED",
            Self::Encoding(_, _) => "ENCODING_ERROR",
            Self::Validation(_, _) => "VALIDATION",
            Self::Internal(_, _) => "INTERNAL",
        }
    }

    fn metadata(&self) -> Option<&ErrorMetadata> {
        match self {
            Self::Shell(_, meta)
            | Self::ShellTimeout(_, meta)
            | Self::Sink(_, meta)
            | Self::Cancelled(_, meta)
            | Self::Encoding(_, meta)
            | Self::Validation(_, meta)
            | Self::Internal(_, meta) => meta.as_ref(),
        }
    }

    fn metadata_mut(&mut self) -> &mut Option<ErrorMetadata> {
        match self {
            Self::Shell(_, meta)
            | Self::ShellTimeout(_, meta)
            | Self::Sink(_, meta)
            | Self::Cancelled(_, meta)
            | Self::Encoding(_, meta)
            | Self::Validation(_, meta)
            | Self::Internal(_, meta) => meta,
        }
    }

    pub fn shell(message: impl Into<String>) -> Self {
        Self::Shell(message.into(), None)
    }

    pub fn shell_timeout(message: impl Into<String>) -> Self {
        Self::ShellTimeout(message.into(), None)
    }

    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink(message.into(), None)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into(), None)
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding(message.into(), None)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into(), None)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into(), None)
    }

    /// Shell failures and timeouts happen before any byte of the document is
    /// written; the caller may still answer with an error page.
    pub fn is_shell_failure(&self) -> bool {
        matches!(self, Self::Shell(_, _) | Self::ShellTimeout(_, _))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_, _))
    }

    pub fn with_source(mut self, source: Box<dyn std::error::Error + Send + Sync>) -> Self {
        let code = self.code().to_string();
        let metadata = self.metadata_mut();
        let mut new_meta = metadata.clone().unwrap_or_else(|| ErrorMetadata {
            code,
            details: Some(FxHashMap::default()),
            source: None,
            error_source: None,
        });
        new_meta.source = Some(source.to_string());
        new_meta.error_source = Some(source);
        *metadata = Some(new_meta);
        self
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn set_property(&mut self, key: &str, value: &str) {
        let code = self.code().to_string();
        let metadata = self.metadata_mut();
        if metadata.is_none() {
            *metadata = Some(ErrorMetadata {
                code,
                details: Some(FxHashMap::default()),
                source: None,
                error_source: None,
            });
        }

        if let Some(meta) = metadata {
            if meta.details.is_none() {
                meta.details = Some(FxHashMap::default());
            }
            if let Some(details) = &mut meta.details {
                details.insert(key.to_string(), value.to_string());
            }
        }
    }

    pub fn get_property(&self, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|meta| meta.details.as_ref())
            .and_then(|details| details.get(key))
            .map(String::as_str)
    }
}

impl From<RenderError> for StreamError {
    fn from(error: RenderError) -> Self {
        Self::shell(error.to_string()).with_source(Box::new(error))
    }
}

impl From<SinkError> for StreamError {
    fn from(error: SinkError) -> Self {
        match error {
            SinkError::Closed => Self::cancelled(error.to_string()),
            SinkError::Io(io_error) => {
                Self::sink(io_error.to_string()).with_source(Box::new(io_error))
            }
        }
    }
}

impl From<ConfigError> for StreamError {
    fn from(error: ConfigError) -> Self {
        Self::validation(error.to_string()).with_source(Box::new(error))
    }
}

impl From<tokio::time::error::Elapsed> for StreamError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::shell_timeout(error.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(error: serde_json::Error) -> Self {
        Self::encoding(error.to_string()).with_source(Box::new(error))
    }
}
