//! HTTP client for forwarding requests to their real destination

use std::future::Future;
use std::time::Duration;

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::recorder::TeeBody;
use crate::{ReelError, Result};

use super::{POOL_IDLE_TIMEOUT_SECS, POOL_MAX_IDLE_PER_HOST};

/// Boxed error type carried by upstream response bodies
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Request body handed to the upstream while recording
pub type CaptureBody = TeeBody<Full<Bytes>>;

/// Response body returned by an upstream
pub type UpstreamBody = BoxBody<Bytes, BoxError>;

/// Performs the real network call while recording
pub trait Upstream: Send + Sync + 'static {
    /// Send `request` to its destination and return the response head and body
    fn send(
        &self,
        request: Request<CaptureBody>,
    ) -> impl Future<Output = Result<Response<UpstreamBody>>> + Send;
}

/// HTTP and HTTPS client over pooled hyper connections
///
/// Server certificates are verified against the platform's native roots.
/// Redirects are not followed: a 3xx response is returned, and recorded, as
/// is.
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, CaptureBody>,
}

impl HttpClient {
    /// Create a new HTTP client
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build(https_connector());

        Self { client }
    }
}

fn https_connector() -> HttpsConnector<HttpConnector> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let builder = HttpsConnectorBuilder::new()
        .with_native_roots()
        .unwrap_or_else(|e| {
            warn!("No native root certificates ({e}); https destinations will fail verification");
            HttpsConnectorBuilder::new().with_tls_config(
                rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth(),
            )
        });

    builder.https_or_http().enable_http1().wrap_connector(http)
}

/// Error message including every cause in the chain
fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Upstream for HttpClient {
    fn send(
        &self,
        request: Request<CaptureBody>,
    ) -> impl Future<Output = Result<Response<UpstreamBody>>> + Send {
        debug!("Forwarding {} to {}", request.method(), request.uri());
        let response = self.client.request(request);

        async move {
            let response = response.await.map_err(|e| {
                let message = describe(&e);
                warn!("Request failed: {message}");
                ReelError::Network(message)
            })?;

            Ok(response.map(|body| body.map_err(BoxError::from).boxed()))
        }
    }
}
