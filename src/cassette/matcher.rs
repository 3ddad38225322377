//! Matching policies for replay lookups

use std::sync::Arc;

use crate::config::MatcherKind;
use crate::fingerprint::fingerprint_request;

use super::RecordedRequest;

/// Decides whether a recorded request answers an incoming one
pub trait Matcher: Send + Sync {
    /// Return true if `recorded` matches `request`
    fn matches(&self, request: &RecordedRequest, recorded: &RecordedRequest) -> bool;
}

/// Matches on method (case-insensitive) and exact URL
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodUrlMatcher;

impl Matcher for MethodUrlMatcher {
    fn matches(&self, request: &RecordedRequest, recorded: &RecordedRequest) -> bool {
        request.method.eq_ignore_ascii_case(&recorded.method) && request.url == recorded.url
    }
}

/// Matches on the request fingerprint (method, normalized URL, body)
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintMatcher;

impl Matcher for FingerprintMatcher {
    fn matches(&self, request: &RecordedRequest, recorded: &RecordedRequest) -> bool {
        fingerprint_request(request) == fingerprint_request(recorded)
    }
}

impl<F> Matcher for F
where
    F: Fn(&RecordedRequest, &RecordedRequest) -> bool + Send + Sync,
{
    fn matches(&self, request: &RecordedRequest, recorded: &RecordedRequest) -> bool {
        self(request, recorded)
    }
}

impl From<MatcherKind> for Arc<dyn Matcher> {
    fn from(kind: MatcherKind) -> Self {
        match kind {
            MatcherKind::MethodUrl => Arc::new(MethodUrlMatcher),
            MatcherKind::Fingerprint => Arc::new(FingerprintMatcher),
        }
    }
}
