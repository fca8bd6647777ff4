//! Header utilities for upstream proxying
//!
//! Inbound headers are relayed to the upstream verbatim except for the
//! connection-scoped ones and the caller's own credential, which is replaced
//! by the endpoint's API key so upstream secrets never reach callers.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Hop-by-hop headers that must never be forwarded
const HOP_BY_HOP_HEADERS: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Check if a header is a hop-by-hop header that should not be forwarded
pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(name) || name.as_str() == "keep-alive"
}

/// Build the outbound header set for an upstream request.
///
/// `Host` and `Content-Length` are left to the HTTP client, which derives them
/// from the target URL and the buffered body.
pub fn build_upstream_headers(incoming: &HeaderMap, authorization: &HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len() + 1);

    for (name, value) in incoming {
        if is_hop_by_hop_header(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers.insert(header::AUTHORIZATION, authorization.clone());
    headers
}

/// Filter hop-by-hop headers from an upstream response
///
/// Multi-valued headers such as `Set-Cookie` keep every value.
pub fn filter_response_headers(response_headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(response_headers.len());

    for (name, value) in response_headers {
        if !is_hop_by_hop_header(name) {
            filtered.append(name.clone(), value.clone());
        }
    }

    filtered
}

/// Mark a relayed response as an incrementally flushed event stream
///
/// The upstream's own content type wins when it sent one.
pub fn apply_event_stream_headers(headers: &mut HeaderMap) {
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream"),
        );
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
}
