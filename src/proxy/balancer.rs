//! Round-robin load balancing across a model's endpoints

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{client::UpstreamClient, registry::ModelRegistry};

/// Per-model round-robin selector.
///
/// All cursors sit behind one lock; selection and increment happen in the
/// same critical section so concurrent callers never observe the same
/// cursor value.
#[derive(Debug)]
pub struct RoundRobinRouter {
    registry: Arc<ModelRegistry>,
    cursors: Mutex<HashMap<String, u64>>,
}

impl RoundRobinRouter {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        let cursors = registry
            .model_names()
            .map(|name| (name.to_string(), 0))
            .collect();

        Self {
            registry,
            cursors: Mutex::new(cursors),
        }
    }

    /// Pick the next client for a model, or `None` if the model is unknown
    pub fn pick(&self, model: &str) -> Option<Arc<UpstreamClient>> {
        let clients = self.registry.clients(model)?;

        let mut cursors = self.cursors.lock();
        let cursor = cursors.entry(model.to_string()).or_insert(0);
        let idx = (*cursor % clients.len() as u64) as usize;
        *cursor = cursor.wrapping_add(1);

        Some(clients[idx].clone())
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }
}
