//! Proxy dispatcher
//!
//! Catch-all handler mounted under the API prefix. Each request moves through
//! parse, admission, routing, forwarding and relay; any step before the relay
//! can reject it with an explicit status.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::{
    admission::Pool,
    error::{ProxyError, ProxyResult},
    proxy::{relay_response, ProxyRequest, RelayMode},
    routes::{
        metrics::{record_admission_rejected, record_request},
        models::list_models_response,
    },
    AppState,
};

/// Metric label for requests whose model is not registered
const UNROUTED_LABEL: &str = "unrouted";

/// Handle every method and path under the proxy prefix
pub async fn proxy_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();
    let sub_path = sub_path(parts.uri.path(), &state.api_prefix).to_string();

    info!(method = %parts.method, sub_path = %sub_path, "Proxy request received");

    // The model listing is answered locally and never takes an admission slot
    if sub_path.starts_with("/models") {
        return list_models_response(&state.registry).into_response();
    }

    let request = match read_request(body).await {
        Ok(request) => request,
        Err(e) => return reject(e, UNROUTED_LABEL, start_time),
    };

    let label = if state.registry.contains(&request.model) {
        request.model.clone()
    } else {
        UNROUTED_LABEL.to_string()
    };

    match forward(&state, parts, request, &sub_path).await {
        Ok(response) => {
            record_request("relayed", &label, start_time.elapsed().as_secs_f64());
            response
        }
        Err(e) => reject(e, &label, start_time),
    }
}

/// Strip the mount prefix from a request path
fn sub_path<'a>(path: &'a str, prefix: &str) -> &'a str {
    path.strip_prefix(prefix).unwrap_or(path)
}

async fn read_request(body: Body) -> ProxyResult<ProxyRequest> {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ProxyError::BodyRead(e.to_string()))?;

    ProxyRequest::parse(bytes)
}

async fn forward(
    state: &AppState,
    parts: Parts,
    request: ProxyRequest,
    sub_path: &str,
) -> ProxyResult<Response> {
    // Held until the relay ends; every early return below drops it
    let slot = state.admission.try_acquire(request.stream).ok_or_else(|| {
        record_admission_rejected(Pool::for_request(request.stream).as_str());
        ProxyError::TooManyRequests
    })?;

    let client = state
        .router
        .pick(&request.model)
        .ok_or_else(|| ProxyError::UnknownModel(request.model.clone()))?;

    let url = client.target_url(sub_path, parts.uri.query());

    info!(
        client = %client.name(),
        target = %url,
        model = %request.model,
        stream = request.stream,
        "Forwarding request"
    );

    let upstream = client
        .send(parts.method, &url, &parts.headers, request.body)
        .await?;

    Ok(relay_response(
        upstream,
        slot,
        RelayMode::for_request(request.stream),
        client.name(),
    ))
}

fn reject(error: ProxyError, label: &str, start_time: Instant) -> Response {
    let duration = start_time.elapsed().as_secs_f64();
    record_request(error.outcome(), label, duration);

    warn!(
        status = %error.status(),
        error = %error,
        duration_ms = %format!("{:.2}", duration * 1000.0),
        "Proxy request rejected"
    );

    error.into_response()
}
