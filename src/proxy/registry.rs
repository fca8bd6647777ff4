//! Endpoint registry
//!
//! Maps every model name to the ordered list of upstream clients serving it.
//! Built once at startup and read-only afterwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{HttpClientConfig, ModelConfig};

use super::client::{validate_endpoint, EndpointError, UpstreamClient};

/// Model name -> non-empty list of upstream clients
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Vec<Arc<UpstreamClient>>>,
}

impl ModelRegistry {
    /// Build the registry from the configured model table.
    ///
    /// Incomplete endpoints and models left without any endpoint are skipped
    /// with a warning. Endpoints sharing a `name` share one client and thus
    /// one connection pool; the first definition of a name wins.
    pub fn build(
        models: &BTreeMap<String, ModelConfig>,
        pool: &HttpClientConfig,
    ) -> Result<Self, EndpointError> {
        let mut shared: HashMap<String, Arc<UpstreamClient>> = HashMap::new();
        let mut registry = BTreeMap::new();

        for (model, model_config) in models {
            if model_config.endpoints.is_empty() {
                warn!(model = %model, "Model has no endpoints, skipped");
                continue;
            }

            let mut clients = Vec::with_capacity(model_config.endpoints.len());

            for (idx, endpoint) in model_config.endpoints.iter().enumerate() {
                if let Err(reason) = validate_endpoint(endpoint) {
                    warn!(
                        model = %model,
                        index = idx,
                        endpoint = ?endpoint,
                        reason = %reason,
                        "Invalid endpoint, skipped"
                    );
                    continue;
                }

                if let Some(existing) = shared.get(&endpoint.name) {
                    if existing.base_url() != endpoint.api_base.trim().trim_end_matches('/') {
                        warn!(
                            model = %model,
                            endpoint = %endpoint.name,
                            kept_base = %existing.base_url(),
                            ignored_base = %endpoint.api_base,
                            "Endpoint name reused with a different api_base, keeping first definition"
                        );
                    }
                    clients.push(existing.clone());
                    continue;
                }

                let client = Arc::new(UpstreamClient::new(endpoint, pool)?);

                info!(
                    model = %model,
                    index = idx,
                    endpoint = %endpoint.name,
                    base = %client.base_url(),
                    "Endpoint registered"
                );
                shared.insert(endpoint.name.clone(), client.clone());
                clients.push(client);
            }

            if clients.is_empty() {
                warn!(model = %model, "Model has no valid endpoints, skipped");
                continue;
            }

            registry.insert(model.clone(), clients);
        }

        info!(
            models = registry.len(),
            clients = shared.len(),
            "Model registry initialized"
        );

        Ok(Self { models: registry })
    }

    /// Clients serving a model, in configuration order
    pub fn clients(&self, model: &str) -> Option<&[Arc<UpstreamClient>]> {
        self.models.get(model).map(Vec::as_slice)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Registered model names, sorted
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
