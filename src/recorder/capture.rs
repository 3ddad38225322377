//! Interaction capture: replay lookup or record-through

use std::sync::Arc;
use std::time::Instant;

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::ext::ReasonPhrase;
use hyper::{Request, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cassette::{Cassette, Interaction, RecordedRequest, RecordedResponse};
use crate::config::{LimitsConfig, Mode};
use crate::network::{header_pairs, read_body, validate_request, BoxError, Upstream};
use crate::{ReelError, Result};

use super::duplicate::{dump_request, DuplicateRequest};
use super::tee::{BodySink, TeeBody};

/// Cassette shared between a recorder and its transports
pub type SharedCassette = Arc<Mutex<Cassette>>;

/// Produce the interaction answering `request`
///
/// Replaying looks the request up in the cassette. Recording sends it to its
/// destination through `upstream`, appends the resulting interaction to the
/// cassette and returns it. The cassette lock is never held across the
/// upstream call, so appends happen in completion order.
///
/// # Errors
///
/// Returns error if no recorded interaction matches (replaying), or if
/// duplication, the upstream call or body buffering fails (recording).
/// Nothing is appended on error.
pub async fn capture<B, U>(
    request: Request<B>,
    cassette: &SharedCassette,
    mode: Mode,
    upstream: &U,
    limits: &LimitsConfig,
) -> Result<Arc<Interaction>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
    U: Upstream,
{
    match mode {
        Mode::Replaying => replay(request, cassette, limits).await,
        Mode::Recording => record(request, cassette, upstream, limits).await,
    }
}

async fn replay<B>(
    request: Request<B>,
    cassette: &SharedCassette,
    limits: &LimitsConfig,
) -> Result<Arc<Interaction>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (parts, body) = request.into_parts();
    let body = read_body(body, limits.max_request_size).await?;

    // Matchers never look at form fields, so replay skips duplication
    let lookup = RecordedRequest {
        method: parts.method.to_string(),
        url: parts.uri.to_string(),
        headers: header_pairs(&parts.headers),
        body: body.to_vec(),
        form: Vec::new(),
    };

    let found = cassette.lock().await.find_match(&lookup);
    match found {
        Some(interaction) => {
            debug!(
                "Replay hit: {} {} -> {}",
                lookup.method, lookup.url, interaction.response.code
            );
            Ok(interaction)
        }
        None => {
            warn!("Replay miss: {} {}", lookup.method, lookup.url);
            Err(ReelError::InteractionNotFound {
                method: lookup.method,
                url: lookup.url,
            })
        }
    }
}

async fn record<B, U>(
    request: Request<B>,
    cassette: &SharedCassette,
    upstream: &U,
    limits: &LimitsConfig,
) -> Result<Arc<Interaction>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
    U: Upstream,
{
    validate_request(&request, limits.max_headers)?;
    let started = Instant::now();

    let (parts, body) = request.into_parts();
    let has_body = !body.is_end_stream();
    let body = read_body(body, limits.max_request_size).await?;

    // Form fields come from an independent copy of the request
    let duplicate = DuplicateRequest::parse(&dump_request(&parts, &body))?;
    let form = duplicate.post_form();

    let sink = BodySink::new();
    let upstream_body = if has_body {
        TeeBody::new(Full::new(body), sink.clone())
    } else {
        TeeBody::passthrough(Full::default())
    };

    let method = parts.method.to_string();
    let url = parts.uri.to_string();
    let headers = header_pairs(&parts.headers);

    let response = upstream
        .send(Request::from_parts(parts, upstream_body))
        .await?;

    let (response_parts, response_body) = response.into_parts();
    let response_body = read_body(response_body, limits.max_response_size).await?;

    let interaction = Interaction {
        request: RecordedRequest {
            method,
            url,
            headers,
            body: sink.snapshot().to_vec(),
            form,
        },
        response: RecordedResponse {
            status: status_line(
                response_parts.status,
                response_parts.extensions.get::<ReasonPhrase>(),
            ),
            code: response_parts.status.as_u16(),
            headers: header_pairs(&response_parts.headers),
            body: response_body.to_vec(),
        },
    };

    let interaction = cassette.lock().await.append(interaction);

    debug!(
        "Recorded interaction: {} {} -> {} ({} bytes, {:?})",
        interaction.request.method,
        interaction.request.url,
        interaction.response.code,
        interaction.response.body.len(),
        started.elapsed()
    );

    Ok(interaction)
}

/// Status line of a response, e.g. "200 OK"
fn status_line(status: StatusCode, reason: Option<&ReasonPhrase>) -> String {
    let reason = reason
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| status.canonical_reason().map(str::to_string));

    match reason {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

/// Split a status line into its reason phrase
pub(super) fn reason_phrase(status_line: &str) -> Option<&str> {
    status_line
        .split_once(' ')
        .map(|(_, reason)| reason.trim())
        .filter(|reason| !reason.is_empty())
}

/// Response type produced by upstreams in tests
#[cfg(test)]
pub(crate) fn upstream_response(
    status: u16,
    headers: &[(&str, &str)],
    body: &'static [u8],
) -> hyper::Response<crate::network::UpstreamBody> {
    use http_body_util::BodyExt;

    let mut builder = hyper::Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(
            Full::new(Bytes::from_static(body))
                .map_err(|never| match never {})
                .boxed(),
        )
        .unwrap()
}
