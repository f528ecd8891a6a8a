use bytes::Bytes;
use serde::Serialize;
use std::borrow::Cow;

use crate::scheduler::BoundaryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Shell,
    Patch,
    Resumability,
    End,
    /// Replaces the whole stream when the shell fails.
    ErrorDocument,
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Shell => "shell",
            Self::Patch => "patch",
            Self::Resumability => "resumability",
            Self::End => "end",
            Self::ErrorDocument => "error_document",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub kind: ChunkKind,
    pub payload: Bytes,
    pub boundary_id: Option<BoundaryId>,
}

impl StreamChunk {
    pub fn new(kind: ChunkKind, payload: impl Into<Bytes>) -> Self {
        Self { kind, payload: payload.into(), boundary_id: None }
    }

    pub fn patch(id: BoundaryId, payload: impl Into<Bytes>) -> Self {
        Self { kind: ChunkKind::Patch, payload: payload.into(), boundary_id: Some(id) }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}
