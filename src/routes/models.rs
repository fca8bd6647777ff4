//! Models endpoint
//!
//! Lists the models this proxy routes, answered locally without touching any
//! upstream.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::proxy::ModelRegistry;

/// Owner tag reported for every proxied model
pub const MODEL_OWNER: &str = "proxy";

/// Model information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// Models list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<Model>,
}

/// Build the listing of every registered model, stamped with the current time
pub fn list_models(registry: &ModelRegistry) -> ModelsResponse {
    let created = chrono::Utc::now().timestamp();

    let data = registry
        .model_names()
        .map(|id| Model {
            id: id.to_string(),
            object: "model".to_string(),
            created,
            owned_by: MODEL_OWNER.to_string(),
        })
        .collect();

    ModelsResponse {
        object: "list".to_string(),
        data,
    }
}

pub fn list_models_response(registry: &ModelRegistry) -> (StatusCode, Json<ModelsResponse>) {
    (StatusCode::OK, Json(list_models(registry)))
}
