//! Admission control
//!
//! Two independent counting limiters, one for streaming and one for
//! non-streaming traffic. Admission never waits: a full pool rejects the
//! request immediately and the caller answers 429.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::{config::LimitsConfig, routes::metrics::record_inflight};

/// Which admission pool a request draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    NonStream,
    Stream,
}

impl Pool {
    pub fn for_request(streaming: bool) -> Self {
        if streaming {
            Pool::Stream
        } else {
            Pool::NonStream
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pool::NonStream => "non_stream",
            Pool::Stream => "stream",
        }
    }
}

/// Held admission slot.
///
/// The slot returns to its pool when dropped, so it is released exactly once
/// on every exit path, including a client hanging up mid-relay.
#[derive(Debug)]
pub struct AdmissionSlot {
    pool: Pool,
    _permit: OwnedSemaphorePermit,
}

impl AdmissionSlot {
    pub fn pool(&self) -> Pool {
        self.pool
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        record_inflight(self.pool.as_str(), -1.0);
    }
}

/// Fail-fast admission controller
#[derive(Debug)]
pub struct AdmissionController {
    non_stream: Arc<Semaphore>,
    stream: Arc<Semaphore>,
    non_stream_capacity: usize,
    stream_capacity: usize,
}

impl AdmissionController {
    /// Create a controller with explicit ceilings
    pub fn new(non_stream_capacity: usize, stream_capacity: usize) -> Self {
        Self {
            non_stream: Arc::new(Semaphore::new(non_stream_capacity)),
            stream: Arc::new(Semaphore::new(stream_capacity)),
            non_stream_capacity,
            stream_capacity,
        }
    }

    /// Create a controller from configuration, applying the safe defaults
    pub fn from_config(limits: &LimitsConfig) -> Self {
        let controller = Self::new(limits.non_stream_capacity(), limits.stream_capacity());
        info!(
            non_stream = controller.non_stream_capacity,
            stream = controller.stream_capacity,
            "Admission pools initialized"
        );
        controller
    }

    fn semaphore(&self, pool: Pool) -> &Arc<Semaphore> {
        match pool {
            Pool::NonStream => &self.non_stream,
            Pool::Stream => &self.stream,
        }
    }

    /// Take a slot without blocking; `None` when the pool is exhausted
    pub fn try_acquire(&self, streaming: bool) -> Option<AdmissionSlot> {
        let pool = Pool::for_request(streaming);
        match self.semaphore(pool).clone().try_acquire_owned() {
            Ok(permit) => {
                record_inflight(pool.as_str(), 1.0);
                Some(AdmissionSlot {
                    pool,
                    _permit: permit,
                })
            }
            Err(_) => {
                debug!(pool = pool.as_str(), "Admission pool exhausted");
                None
            }
        }
    }

    /// Free slots currently left in a pool
    pub fn available(&self, streaming: bool) -> usize {
        self.semaphore(Pool::for_request(streaming)).available_permits()
    }

    /// Configured ceiling of a pool
    pub fn capacity(&self, streaming: bool) -> usize {
        match Pool::for_request(streaming) {
            Pool::NonStream => self.non_stream_capacity,
            Pool::Stream => self.stream_capacity,
        }
    }
}
