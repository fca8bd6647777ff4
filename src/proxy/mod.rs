//! Proxy module
//!
//! Upstream clients, the model registry, load balancing, and the response
//! relay.

pub mod balancer;
pub mod client;
pub mod headers;
pub mod registry;
pub mod relay;
pub mod request;

pub use balancer::RoundRobinRouter;
pub use client::{EndpointError, UpstreamClient, UpstreamResponse};
pub use registry::ModelRegistry;
pub use relay::{relay_response, RelayMode};
pub use request::ProxyRequest;
