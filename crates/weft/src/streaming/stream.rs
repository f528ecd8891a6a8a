use bytes::Bytes;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::multiplexer::StreamMultiplexer;
use super::sink::BufferSink;
use super::stats::RenderStats;
use super::types::StreamChunk;
use crate::config::RenderConfig;
use crate::error::StreamError;
use crate::node::Node;

/// Byte stream of one render. Dropping it cancels the render.
pub struct RenderStream {
    receiver: mpsc::Receiver<StreamChunk>,
    handle: Option<JoinHandle<Result<RenderStats, StreamError>>>,
    cancel: CancellationToken,
}

impl RenderStream {
    pub fn new(
        receiver: mpsc::Receiver<StreamChunk>,
        handle: JoinHandle<Result<RenderStats, StreamError>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { receiver, handle: Some(handle), cancel }
    }

    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        self.receiver.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_complete(&self) -> bool {
        self.receiver.is_closed() && self.receiver.is_empty()
    }
}

impl Stream for RenderStream {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => return Poll::Ready(Some(Ok(chunk.payload))),
            Poll::Pending => return Poll::Pending,
            Poll::Ready(None) => {}
        }

        // Channel drained: surface how the render ended, once.
        let Some(handle) = self.handle.as_mut() else { return Poll::Ready(None) };
        let outcome = match Pin::new(handle).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(outcome) => outcome,
        };
        self.handle = None;

        match outcome {
            Ok(Ok(_)) => Poll::Ready(None),
            Ok(Err(e)) if e.is_cancelled() => Poll::Ready(None),
            Ok(Err(e)) => Poll::Ready(Some(Err(e))),
            Err(join_error) => Poll::Ready(Some(Err(StreamError::internal(format!(
                "render task failed: {join_error}"
            ))))),
        }
    }
}

impl Drop for RenderStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns the render on the current runtime and returns its byte stream.
pub fn render_to_stream(root: Node, config: RenderConfig) -> RenderStream {
    render_to_stream_with_cancellation(root, config, CancellationToken::new())
}

/// Like [`render_to_stream`]; cancelling `parent` also aborts the render.
pub fn render_to_stream_with_cancellation(
    root: Node,
    config: RenderConfig,
    parent: CancellationToken,
) -> RenderStream {
    let cancel = parent.child_token();
    let (sender, receiver) = mpsc::channel(config.stream.channel_capacity.max(1));
    let multiplexer = StreamMultiplexer::new(sender, config).with_cancellation(cancel.clone());
    let handle = tokio::spawn(multiplexer.run(root));
    RenderStream::new(receiver, handle, cancel)
}

/// Renders the whole document into memory, waiting for every boundary.
pub async fn render_to_string(root: Node, config: RenderConfig) -> Result<String, StreamError> {
    let sink = BufferSink::new();
    StreamMultiplexer::new(sink.clone(), config).run(root).await?;
    Ok(sink.to_string_lossy())
}
