use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::types::StreamChunk;
use crate::error::SinkError;

/// Destination of the byte stream. `write` must not return before the sink
/// can take more data.
#[async_trait]
pub trait ChunkSink: Send {
    async fn write(&mut self, chunk: StreamChunk) -> Result<(), SinkError>;

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Resolves once the consumer has gone away.
    async fn closed(&mut self) {
        std::future::pending::<()>().await
    }
}

#[async_trait]
impl ChunkSink for mpsc::Sender<StreamChunk> {
    async fn write(&mut self, chunk: StreamChunk) -> Result<(), SinkError> {
        self.send(chunk).await.map_err(|_| SinkError::Closed)
    }

    async fn closed(&mut self) {
        mpsc::Sender::closed(self).await
    }
}

pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChunkSink for WriterSink<W> {
    async fn write(&mut self, chunk: StreamChunk) -> Result<(), SinkError> {
        self.writer.write_all(&chunk.payload).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Keeps every chunk in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    chunks: Arc<Mutex<Vec<StreamChunk>>>,
    closed: Arc<Mutex<bool>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> Vec<StreamChunk> {
        self.chunks.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.chunks.lock().iter().flat_map(|chunk| chunk.payload.iter().copied()).collect()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }
}

#[async_trait]
impl ChunkSink for BufferSink {
    async fn write(&mut self, chunk: StreamChunk) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.chunks.lock().push(chunk);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        *self.closed.lock() = true;
        Ok(())
    }
}
