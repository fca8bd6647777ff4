//! Inbound request inspection
//!
//! Only `model` and `stream` are read from the payload. Everything else is
//! opaque, and the original bytes are what gets forwarded.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::{ProxyError, ProxyResult};

/// A proxied call after its routing fields have been extracted
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub model: String,
    pub stream: bool,
    /// Original request body, forwarded verbatim
    pub body: Bytes,
}

impl ProxyRequest {
    /// Inspect a request body.
    ///
    /// The payload must be a JSON object with a non-empty string `model`;
    /// `stream` is optional and must be a boolean when present.
    pub fn parse(body: Bytes) -> ProxyResult<Self> {
        let payload: Map<String, Value> =
            serde_json::from_slice(&body).map_err(|_| ProxyError::MissingModel)?;

        let model = match payload.get("model") {
            Some(Value::String(model)) if !model.is_empty() => model.clone(),
            _ => return Err(ProxyError::MissingModel),
        };

        let stream = match payload.get("stream") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(stream)) => *stream,
            Some(_) => return Err(ProxyError::MissingModel),
        };

        Ok(Self {
            model,
            stream,
            body,
        })
    }
}
