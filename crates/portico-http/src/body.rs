//! Gateway response body supporting buffered, empty, and streaming modes.
//!
//! - **Buffered**: XML listings, JSON upload results, error text, and
//!   cache-served bodies.
//! - **Empty**: 204 responses and HEAD responses.
//! - **Streaming**: object content piped straight from the backend to the
//!   caller without full buffering, so memory use stays bounded regardless
//!   of object size.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body_util::Full;

use portico_core::backend::ByteStream;

/// HTTP response body used throughout the gateway.
///
/// Implements [`http_body::Body`] so it can be used directly with hyper
/// responses.
#[derive(Default)]
pub enum GatewayBody {
    /// Buffered body for small responses.
    Buffered(Full<Bytes>),
    /// Empty body for 204 responses, DELETE confirmations, HEAD responses.
    #[default]
    Empty,
    /// Streaming body piped from a backend read.
    Streaming(ByteStream),
}

impl std::fmt::Debug for GatewayBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(full) => f.debug_tuple("Buffered").field(full).finish(),
            Self::Empty => f.write_str("Empty"),
            Self::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

impl GatewayBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Create a streaming body from a backend byte stream.
    #[must_use]
    pub fn streaming(stream: ByteStream) -> Self {
        Self::Streaming(stream)
    }
}

impl http_body::Body for GatewayBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Empty => Poll::Ready(None),
            Self::Streaming(stream) => match stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    Poll::Ready(Some(Ok(http_body::Frame::data(chunk))))
                }
                Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Empty => true,
            Self::Streaming(_) => false,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Empty => http_body::SizeHint::with_exact(0),
            Self::Streaming(_) => http_body::SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body::Body;

    use super::*;

    #[test]
    fn test_should_report_empty_body_as_end_of_stream() {
        let body = GatewayBody::empty();
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
    }

    #[test]
    fn test_should_create_buffered_body_from_string() {
        let body = GatewayBody::from_string("hello world");
        assert!(!body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(11));
    }

    #[test]
    fn test_should_not_know_streaming_size_upfront() {
        let stream = portico_core::backend::stream_from_bytes(Bytes::from("chunk"));
        let body = GatewayBody::streaming(stream);
        assert!(!body.is_end_stream());
        assert_eq!(body.size_hint().exact(), None);
    }

    #[tokio::test]
    async fn test_should_stream_chunks_through() {
        use http_body_util::BodyExt;

        let stream = portico_core::backend::stream_from_bytes(Bytes::from("Hello World"));
        let body = GatewayBody::streaming(stream);
        let collected = body.collect().await.expect("stream should not error");
        assert_eq!(collected.to_bytes(), Bytes::from("Hello World"));
    }

    #[test]
    fn test_should_default_to_empty() {
        assert!(GatewayBody::default().is_end_stream());
    }
}
