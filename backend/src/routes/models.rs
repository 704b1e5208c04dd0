// backend/src/routes/models.rs
// The model catalog: registered models, capabilities, and the alias table.

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::llm::model_manager::ModelSummary;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ModelCatalogResponse {
    pub models: Vec<ModelSummary>,
    /// alias -> canonical model id, sorted for stable output.
    pub aliases: BTreeMap<String, String>,
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelCatalogResponse> {
    let models = state.models.catalog();
    let aliases = state
        .models
        .aliases()
        .iter()
        .map(|(alias, canonical)| (alias.clone(), canonical.clone()))
        .collect();
    Json(ModelCatalogResponse { models, aliases })
}
