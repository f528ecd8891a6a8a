use super::types::ChunkKind;
use crate::error::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Start,
    Patching,
    Resumed,
    Finished,
}

/// Guards the wire order: one shell, any number of patches, at most one
/// resumability chunk, then exactly one end.
#[derive(Debug, Default)]
pub struct ChunkOrder {
    phase: Phase,
}

impl ChunkOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, kind: ChunkKind) -> Result<(), StreamError> {
        let next = match (self.phase, kind) {
            (Phase::Start, ChunkKind::Shell) => Phase::Patching,
            (Phase::Start, ChunkKind::ErrorDocument) => Phase::Finished,
            (Phase::Patching, ChunkKind::Patch) => Phase::Patching,
            (Phase::Patching, ChunkKind::Resumability) => Phase::Resumed,
            (Phase::Patching | Phase::Resumed, ChunkKind::End) => Phase::Finished,
            (phase, kind) => {
                return Err(StreamError::internal(format!(
                    "{kind} chunk is not allowed in phase {phase:?}"
                )));
            }
        };
        self.phase = next;
        Ok(())
    }

    pub fn shell_written(&self) -> bool {
        self.phase != Phase::Start
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }
}
