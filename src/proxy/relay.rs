//! Response relay
//!
//! Turns an upstream response into the client response. Status and headers
//! are copied before the first body byte; the body is then relayed as it
//! arrives. The admission slot and connection permit ride along with the
//! body stream, so they are released when the relay finishes, fails, or the
//! client goes away and hyper drops the body.

use axum::{body::Body, response::Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use crate::admission::AdmissionSlot;

use super::{
    client::UpstreamResponse,
    headers::{apply_event_stream_headers, filter_response_headers},
};

/// Largest frame handed to the client in streamed mode
pub const STREAM_CHUNK_SIZE: usize = 4096;

/// How the upstream body is relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Plain pass-through of the upstream body
    Buffered,
    /// Event stream: bounded frames, each flushed to the client on its own
    Streamed,
}

impl RelayMode {
    pub fn for_request(streaming: bool) -> Self {
        if streaming {
            RelayMode::Streamed
        } else {
            RelayMode::Buffered
        }
    }
}

/// Resources held for the lifetime of one relay
struct RelayGuard {
    client: String,
    mode: RelayMode,
    relayed: usize,
    finished: bool,
    _slot: AdmissionSlot,
    _conn_permit: Option<OwnedSemaphorePermit>,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if self.finished {
            debug!(
                client = %self.client,
                mode = ?self.mode,
                bytes = self.relayed,
                "Relay finished"
            );
        } else {
            // Client disconnects land here; nothing is left to report to.
            debug!(
                client = %self.client,
                mode = ?self.mode,
                bytes = self.relayed,
                "Relay ended early"
            );
        }
    }
}

/// Build the client response for an upstream response
pub fn relay_response(
    upstream: UpstreamResponse,
    slot: AdmissionSlot,
    mode: RelayMode,
    client: &str,
) -> Response {
    let UpstreamResponse {
        response,
        conn_permit,
    } = upstream;

    let status = response.status();
    let mut headers = filter_response_headers(response.headers());
    if mode == RelayMode::Streamed {
        apply_event_stream_headers(&mut headers);
    }

    let guard = RelayGuard {
        client: client.to_string(),
        mode,
        relayed: 0,
        finished: false,
        _slot: slot,
        _conn_permit: conn_permit,
    };

    let body = relay_body(response.bytes_stream(), mode, guard);

    let mut relayed = Response::new(Body::from_stream(body));
    *relayed.status_mut() = status;
    *relayed.headers_mut() = headers;
    relayed
}

fn relay_body<S>(
    upstream: S,
    mode: RelayMode,
    mut guard: RelayGuard,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    async_stream::stream! {
        let mut upstream = Box::pin(upstream);

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    guard.relayed += bytes.len();
                    match mode {
                        RelayMode::Buffered => {
                            yield Ok::<Bytes, std::io::Error>(bytes);
                        }
                        RelayMode::Streamed => {
                            for frame in split_frames(bytes, STREAM_CHUNK_SIZE) {
                                yield Ok(frame);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(client = %guard.client, error = %e, "Upstream body read failed");
                    yield Err(std::io::Error::other(e));
                    return;
                }
            }
        }

        guard.finished = true;
    }
}

/// Split a chunk into frames of at most `max` bytes without copying
fn split_frames(mut bytes: Bytes, max: usize) -> Vec<Bytes> {
    let mut frames = Vec::with_capacity(bytes.len() / max + 1);
    while bytes.len() > max {
        frames.push(bytes.split_to(max));
    }
    if !bytes.is_empty() {
        frames.push(bytes);
    }
    frames
}
