//! GET /models - the models the caller may use from their region.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use tollgate_types::model::LanguageModel;

use crate::http::extractors::auth::LlmAuth;
use crate::http::extractors::country::CountryCode;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListModelsResponse {
    pub models: Vec<LanguageModel>,
}

pub async fn list_models(
    State(state): State<AppState>,
    LlmAuth(token): LlmAuth,
    CountryCode(country_code): CountryCode,
) -> Json<ListModelsResponse> {
    let models = state.gateway.list_models(&token, country_code.as_deref());
    tracing::debug!(user_id = token.user_id(), count = models.len(), "listed models");
    Json(ListModelsResponse { models })
}
