use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::{stream, StreamExt};
use reqwest::{Response as HttpResponse, StatusCode};

use crate::{classify::classify_transport_error, errors::Result};

/// Live byte stream of a successful ask call.
///
/// The handle is the only channel for the response body: nothing is buffered
/// on the side, and chunks are yielded as the transport delivers them.
pub struct AskStream {
    status: StatusCode,
    request_id: Option<String>,
    stream: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    cancelled: bool,
}

impl AskStream {
    pub(crate) fn new(response: HttpResponse, request_id: Option<String>) -> Self {
        let status = response.status();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(classify_transport_error));
        Self::from_stream(body, status, request_id)
    }

    /// Build a stream from in-memory chunks (useful for tests/mocks).
    pub fn from_chunks(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        let collected: Vec<Bytes> = chunks.into_iter().collect();
        Self::from_stream(
            stream::iter(collected.into_iter().map(Ok)),
            StatusCode::OK,
            None,
        )
    }

    pub(crate) fn from_stream<S>(body: S, status: StatusCode, request_id: Option<String>) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        let stream = stream::unfold((Box::pin(body), false), |(mut body, failed)| async move {
            if failed {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk), (body, false))),
                Some(Err(err)) => Some((Err(err), (body, true))),
                None => None,
            }
        });
        Self {
            status,
            request_id,
            stream: Box::pin(stream),
            cancelled: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Request identifier returned by the server (if any).
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Stop yielding chunks and drop the response body, closing the connection.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.stream = Box::pin(stream::empty::<Result<Bytes>>());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Drain the remaining body into a single buffer, consuming the handle.
    pub async fn collect_bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for AskStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for AskStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AskStream")
            .field("status", &self.status)
            .field("request_id", &self.request_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
