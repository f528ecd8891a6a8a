use tracing::warn;
use uuid::Uuid;

use super::escape::{script_json, script_string};
use super::runtime::RUNTIME_SOURCE;
use crate::config::ProtocolConfig;
use crate::error::{BoundaryFailure, StreamError};
use crate::node::ResumeState;
use crate::render::html::escape_html;
use crate::scheduler::{BoundaryId, BoundaryUnit, UnitStatus};

/// Serializes terminal units into inline script instructions addressed to
/// one page's runtime instance.
#[derive(Debug, Clone)]
pub struct ProtocolEncoder {
    runtime: String,
    config: ProtocolConfig,
    resumable: bool,
}

impl ProtocolEncoder {
    pub fn new(config: ProtocolConfig) -> Self {
        let runtime = format!("{}{}", config.runtime_name_prefix, Uuid::new_v4().simple());
        Self { runtime, config, resumable: false }
    }

    pub fn with_runtime_name(config: ProtocolConfig, runtime: impl Into<String>) -> Self {
        Self { runtime: runtime.into(), config, resumable: false }
    }

    /// A resumable page defers idle activation until `resumed()` has
    /// delivered every state.
    pub fn resumable(mut self, resumable: bool) -> Self {
        self.resumable = resumable;
        self
    }

    pub fn runtime_name(&self) -> &str {
        &self.runtime
    }

    /// Script that constructs this page's runtime instance. Goes in the shell.
    pub fn bootstrap_script(&self) -> String {
        format!(
            "<script>window.{}={}(document,{{resumable:{}}});</script>",
            self.runtime, RUNTIME_SOURCE, self.resumable
        )
    }

    pub fn encode_patch(&self, unit: &BoundaryUnit) -> Result<String, StreamError> {
        let (markup, needs_activation) = match (unit.status(), unit.result_markup()) {
            (UnitStatus::Complete, Some(markup)) => (markup.to_string(), unit.needs_activation()),
            (UnitStatus::Error, _) => {
                let failure = unit
                    .failure()
                    .cloned()
                    .unwrap_or_else(|| BoundaryFailure::task("unknown failure"));
                (self.error_fragment(&failure), false)
            }
            (status, _) => {
                return Err(StreamError::internal(format!(
                    "Boundary {} cannot be encoded in state {:?}",
                    unit.id(),
                    status
                )));
            }
        };

        Ok(format!(
            "<script>{}.inject({},{},{})</script>",
            self.runtime,
            unit.id(),
            script_string(&markup),
            needs_activation
        ))
    }

    pub fn error_fragment(&self, failure: &BoundaryFailure) -> String {
        let message = if self.config.verbose_errors {
            format!("{}: {}", self.config.error_message, failure)
        } else {
            self.config.error_message.clone()
        };
        format!(r#"<div data-boundary-error role="alert">{}</div>"#, escape_html(&message))
    }

    /// One `resume` call per serializable entry followed by `resumed()`.
    /// Entries that cannot be serialized are logged and left out.
    pub fn encode_resumability(&self, entries: &[(BoundaryId, ResumeState)]) -> String {
        let mut script = String::from("<script>");
        for (id, state) in entries {
            let encoded = match state {
                ResumeState::Value(value) => script_json(value),
                ResumeState::Unserializable(reason) => Err(StreamError::encoding(reason.clone())),
            };
            match encoded {
                Ok(json) => script.push_str(&format!("{}.resume({},{});", self.runtime, id, json)),
                Err(e) => warn!("Omitting resume state for boundary {} ({}): {}", id, e.code(), e),
            }
        }
        script.push_str(&format!("{}.resumed()</script>", self.runtime));
        script
    }
}
