pub mod multiplexer;
pub mod order;
pub mod sink;
pub mod stats;
pub mod stream;
pub mod types;

pub use multiplexer::StreamMultiplexer;
pub use order::ChunkOrder;
pub use sink::{BufferSink, ChunkSink, WriterSink};
pub use stats::RenderStats;
pub use stream::{RenderStream, render_to_stream, render_to_stream_with_cancellation, render_to_string};
pub use types::{ChunkKind, StreamChunk};
