pub mod config;
pub mod error;
pub mod node;
pub mod protocol;
pub mod render;
pub mod scheduler;
pub mod server;
pub mod streaming;

pub use config::{Config, OrderingMode, RenderConfig, RenderHooks, SchedulerConfig, ShellTemplate};
pub use error::{BoundaryFailure, RenderError, SinkError, StreamError};
pub use node::{BoundaryOutput, Node, ResumeState};
pub use scheduler::{BoundaryId, BoundaryScheduler, BoundaryUnit, UnitStatus};
pub use server::StreamingHtmlResponse;
pub use streaming::{
    ChunkKind, ChunkSink, RenderStats, RenderStream, StreamChunk, StreamMultiplexer,
    render_to_stream, render_to_string,
};
