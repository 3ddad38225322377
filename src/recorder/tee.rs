//! Request body tee for side-channel capture

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{ready, Context, Poll};

use bytes::BytesMut;
use hyper::body::{Body, Bytes, Frame, SizeHint};

/// Shared buffer receiving the bytes a [`TeeBody`] yields
#[derive(Debug, Clone, Default)]
pub struct BodySink {
    buffer: Arc<Mutex<BytesMut>>,
}

impl BodySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything captured so far
    #[must_use]
    pub fn snapshot(&self) -> Bytes {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        Bytes::copy_from_slice(&buffer)
    }

    fn extend(&self, data: &[u8]) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
    }
}

/// Body wrapper that passes frames through unchanged while copying data
/// frames into a [`BodySink`]
#[derive(Debug)]
pub struct TeeBody<B> {
    inner: B,
    sink: Option<BodySink>,
}

impl<B> TeeBody<B> {
    /// Wrap `inner`, capturing its data into `sink`
    pub fn new(inner: B, sink: BodySink) -> Self {
        Self {
            inner,
            sink: Some(sink),
        }
    }

    /// Wrap `inner` without capturing anything
    pub fn passthrough(inner: B) -> Self {
        Self { inner, sink: None }
    }

    /// Check if this body captures its data
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.sink.is_some()
    }
}

impl<B> Body for TeeBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));

        if let (Some(Ok(frame)), Some(sink)) = (&frame, &this.sink) {
            if let Some(data) = frame.data_ref() {
                sink.extend(data);
            }
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use std::collections::VecDeque;
    use std::convert::Infallible;

    #[tokio::test]
    async fn test_tee_captures_while_forwarding() {
        let sink = BodySink::new();
        let body = TeeBody::new(Full::new(Bytes::from_static(b"name=reel")), sink.clone());

        assert!(body.is_capturing());
        assert_eq!(body.size_hint().exact(), Some(9));

        let forwarded = body.collect().await.unwrap().to_bytes();
        assert_eq!(forwarded, Bytes::from_static(b"name=reel"));
        assert_eq!(sink.snapshot(), forwarded);
    }

    #[tokio::test]
    async fn test_tee_captures_every_chunk() {
        let chunks = Chunked(
            [&b"ab"[..], b"cd", b"e"]
                .into_iter()
                .map(Bytes::from_static)
                .collect(),
        );
        let sink = BodySink::new();

        let forwarded = TeeBody::new(chunks, sink.clone())
            .collect()
            .await
            .unwrap()
            .to_bytes();

        assert_eq!(forwarded, Bytes::from_static(b"abcde"));
        assert_eq!(sink.snapshot(), Bytes::from_static(b"abcde"));
    }

    #[tokio::test]
    async fn test_passthrough_captures_nothing() {
        let body = TeeBody::passthrough(Full::new(Bytes::from_static(b"x")));
        assert!(!body.is_capturing());

        let forwarded = body.collect().await.unwrap().to_bytes();
        assert_eq!(forwarded, Bytes::from_static(b"x"));
    }

    #[test]
    fn test_empty_body_is_end_stream() {
        let body = TeeBody::new(Full::<Bytes>::default(), BodySink::new());
        assert!(body.is_end_stream());
    }

    /// Body yielding one data frame per queued chunk
    struct Chunked(VecDeque<Bytes>);

    impl Body for Chunked {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
            Poll::Ready(self.0.pop_front().map(|chunk| Ok(Frame::data(chunk))))
        }
    }
}
