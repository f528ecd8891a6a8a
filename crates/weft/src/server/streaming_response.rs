use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tracing::{error, warn};

use crate::config::RenderConfig;
use crate::error::StreamError;
use crate::node::Node;
use crate::streaming::{RenderStream, render_to_stream};

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Chunked `text/html` response over a render stream. Dropping the body,
/// for instance on client disconnect, cancels the render.
pub struct StreamingHtmlResponse {
    stream: ByteStream,
}

impl StreamingHtmlResponse {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
    {
        Self { stream: Box::pin(stream) }
    }

    /// Starts rendering `root` and streams it as the response body.
    pub fn render(root: Node, config: RenderConfig) -> Self {
        Self::new(render_to_stream(root, config))
    }
}

impl From<RenderStream> for StreamingHtmlResponse {
    fn from(stream: RenderStream) -> Self {
        Self::new(stream)
    }
}

impl IntoResponse for StreamingHtmlResponse {
    fn into_response(self) -> Response {
        let stream = self.stream.map(|chunk| {
            chunk.map_err(|e| {
                if e.is_shell_failure() {
                    error!("Streaming render failed before the shell: {}", e);
                } else {
                    warn!("Streaming render ended early: {}", e);
                }
                std::io::Error::other(e.to_string())
            })
        });

        Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/html; charset=utf-8")
            .header("transfer-encoding", "chunked")
            .header("x-content-type-options", "nosniff")
            .header("x-accel-buffering", "no")
            .header("cache-control", "no-cache")
            .body(Body::from_stream(stream))
            .unwrap_or_else(|e| {
                error!("Failed to build streaming response: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })
    }
}
