//! Round-trip transport backed by a cassette

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode, Version};
use tracing::warn;

use crate::cassette::Interaction;
use crate::config::{LimitsConfig, Mode};
use crate::network::{BoxError, HttpClient, Upstream};
use crate::{ReelError, Result};

use super::capture::{capture, reason_phrase, SharedCassette};

/// Response extension marking a response synthesized from a cassette
///
/// A synthesized response never comes from a pooled connection and must not
/// be handed back to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Synthesized {
    /// Mode of the transport that produced the response
    pub mode: Mode,
}

impl Synthesized {
    /// Synthesized responses are never reusable by connection pools
    #[must_use]
    pub fn is_reusable(&self) -> bool {
        false
    }
}

/// Transport that records or replays responses, depending on its mode
///
/// Cloning is cheap; clones share the cassette and upstream.
pub struct Transport<U = HttpClient> {
    cassette: SharedCassette,
    mode: Mode,
    upstream: Arc<U>,
    limits: LimitsConfig,
}

impl<U> Clone for Transport<U> {
    fn clone(&self) -> Self {
        Self {
            cassette: Arc::clone(&self.cassette),
            mode: self.mode,
            upstream: Arc::clone(&self.upstream),
            limits: self.limits,
        }
    }
}

impl<U: Upstream> Transport<U> {
    pub(super) fn new(
        cassette: SharedCassette,
        mode: Mode,
        upstream: Arc<U>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            cassette,
            mode,
            upstream,
            limits,
        }
    }

    /// Operating mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Send `request` and return its recorded or replayed response
    ///
    /// # Errors
    ///
    /// Returns [`ReelError::RoundTrip`] wrapping the capture failure: a
    /// replay miss, an upstream failure, or a request that could not be
    /// duplicated or buffered.
    pub async fn round_trip<B>(&self, request: Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let url = request.uri().to_string();

        let result = capture(
            request,
            &self.cassette,
            self.mode,
            self.upstream.as_ref(),
            &self.limits,
        )
        .await
        .and_then(|interaction| synthesize_response(&interaction, self.mode));

        result.map_err(|source| {
            warn!("Round trip failed for {url}: {source}");
            ReelError::RoundTrip {
                url,
                source: Box::new(source),
            }
        })
    }

    /// Cancel an in-flight request
    ///
    /// Round trips complete before [`Transport::round_trip`] returns, so
    /// there is never anything to cancel.
    pub fn cancel_request<B>(&self, _request: &Request<B>) {}
}

impl<U, B> Service<Request<B>> for Transport<U>
where
    U: Upstream,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<Full<Bytes>>;
    type Error = ReelError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn call(&self, request: Request<B>) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.round_trip(request).await })
    }
}

/// Build a fresh response from a recorded interaction
///
/// The response carries the recorded status and headers, protocol HTTP/1.0,
/// a `Content-Length` matching the stored body and a [`Synthesized`]
/// extension.
///
/// # Errors
///
/// Returns error if the recorded status code or a header is not valid HTTP
pub fn synthesize_response(interaction: &Interaction, mode: Mode) -> Result<Response<Full<Bytes>>> {
    let recorded = &interaction.response;

    let status = StatusCode::from_u16(recorded.code).map_err(|e| {
        ReelError::Serialization(format!("Invalid recorded status {}: {e}", recorded.code))
    })?;

    let body = Bytes::from(recorded.body.clone());
    let mut response = Response::new(Full::new(body.clone()));
    *response.status_mut() = status;
    *response.version_mut() = Version::HTTP_10;

    let headers = response.headers_mut();
    for (name, value) in &recorded.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ReelError::Serialization(format!("Invalid recorded header name {name:?}: {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            ReelError::Serialization(format!("Invalid recorded header value {value:?}: {e}"))
        })?;
        headers.append(name, value);
    }
    headers.remove(TRANSFER_ENCODING);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

    let extensions = response.extensions_mut();
    extensions.insert(Synthesized { mode });
    if let Some(reason) = reason_phrase(&recorded.status) {
        if status.canonical_reason() != Some(reason) {
            if let Ok(reason) = ReasonPhrase::try_from(reason.as_bytes()) {
                extensions.insert(reason);
            }
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::{Cassette, RecordedRequest, RecordedResponse};
    use http_body_util::BodyExt;
    use tokio::sync::Mutex;

    fn recorded(code: u16, status: &str, headers: &[(&str, &str)], body: &str) -> Interaction {
        Interaction {
            request: RecordedRequest {
                method: "GET".to_string(),
                url: "http://example.test/a".to_string(),
                ..RecordedRequest::default()
            },
            response: RecordedResponse {
                status: status.to_string(),
                code,
                headers: headers
                    .iter()
                    .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
                    .collect(),
                body: body.as_bytes().to_vec(),
            },
        }
    }

    #[tokio::test]
    async fn test_synthesize_response() {
        let interaction = recorded(
            201,
            "201 Created",
            &[("content-type", "application/json"), ("set-cookie", "a=1"), ("set-cookie", "b=2")],
            "{\"id\":7}",
        );

        let response = synthesize_response(&interaction, Mode::Replaying).unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.version(), Version::HTTP_10);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.headers().get_all("set-cookie").iter().count(), 2);
        assert_eq!(response.headers()[CONTENT_LENGTH], "8");
        assert!(response.extensions().get::<ReasonPhrase>().is_none());

        let synthesized = response.extensions().get::<Synthesized>().unwrap();
        assert_eq!(synthesized.mode, Mode::Replaying);
        assert!(!synthesized.is_reusable());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"{\"id\":7}"));
    }

    #[test]
    fn test_synthesize_replaces_framing_headers() {
        let interaction = recorded(
            200,
            "200 OK",
            &[("transfer-encoding", "chunked"), ("content-length", "999")],
            "ok",
        );

        let response = synthesize_response(&interaction, Mode::Recording).unwrap();
        assert!(response.headers().get(TRANSFER_ENCODING).is_none());
        assert_eq!(response.headers().get_all(CONTENT_LENGTH).iter().count(), 1);
        assert_eq!(response.headers()[CONTENT_LENGTH], "2");
    }

    #[test]
    fn test_synthesize_custom_reason() {
        let interaction = recorded(200, "200 Looks Good", &[], "");

        let response = synthesize_response(&interaction, Mode::Replaying).unwrap();
        let reason = response.extensions().get::<ReasonPhrase>().unwrap();
        assert_eq!(reason.as_bytes(), b"Looks Good");
    }

    #[test]
    fn test_synthesize_invalid_status() {
        let interaction = recorded(42, "42", &[], "");
        assert!(matches!(
            synthesize_response(&interaction, Mode::Replaying),
            Err(ReelError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_round_trip_miss_is_an_error() {
        let cassette = Arc::new(Mutex::new(Cassette::new("miss", "miss.cassette")));
        let transport = Transport::new(
            cassette,
            Mode::Replaying,
            Arc::new(HttpClient::new()),
            LimitsConfig::default(),
        );

        let request = Request::get("http://example.test/nothing")
            .body(Full::<Bytes>::default())
            .unwrap();
        transport.cancel_request(&request);

        let err = transport.round_trip(request).await.unwrap_err();
        match err {
            ReelError::RoundTrip { url, source } => {
                assert_eq!(url, "http://example.test/nothing");
                assert!(matches!(*source, ReelError::InteractionNotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_service_call_replays() {
        let cassette = Arc::new(Mutex::new(Cassette::new("svc", "svc.cassette")));
        cassette
            .lock()
            .await
            .append(recorded(200, "200 OK", &[], "from cassette"));
        let transport = Transport::new(
            cassette,
            Mode::Replaying,
            Arc::new(HttpClient::new()),
            LimitsConfig::default(),
        );

        let request = Request::get("http://example.test/a")
            .body(Full::<Bytes>::default())
            .unwrap();
        let response = transport.call(request).await.unwrap();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"from cassette"));
    }
}
