use super::SharedBridge;
use crate::errors::AppResult;
use crate::models::{
    AppSettings, ChatPayload, ChatResponse, ConfigQuery, ConfigResponse, ConfigStatusResponse, ConfigsResponse,
    DatabaseStructure, ExistenceResponse, HealthResponse, MessageResponse, PropertiesResponse, SaveConfigPayload,
    SaveConfigResponse, SaveDynamicFieldsPayload, SavePropertiesPayload, UpdateConfigPayload,
    ValidatePropertiesPayload, ValidateValuesPayload, ValueValidationResponse,
};
use axum::extract::{Path, Query, State};
use axum::Json;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// GET /api/config
pub async fn config_status(
    State(bridge): State<SharedBridge>,
    Query(query): Query<ConfigQuery>,
) -> AppResult<Json<ConfigStatusResponse>> {
    bridge.config_status(query.config_id).map(Json)
}

/// POST /api/config
pub async fn save_config(
    State(bridge): State<SharedBridge>,
    Json(payload): Json<SaveConfigPayload>,
) -> AppResult<Json<SaveConfigResponse>> {
    bridge.save_config(payload).await.map(Json)
}

/// GET /api/config/properties
pub async fn list_properties(
    State(bridge): State<SharedBridge>,
    Query(query): Query<ConfigQuery>,
) -> AppResult<Json<PropertiesResponse>> {
    bridge.properties(query.config_id).await.map(Json)
}

/// POST /api/config/properties
pub async fn save_properties(
    State(bridge): State<SharedBridge>,
    Json(payload): Json<SavePropertiesPayload>,
) -> AppResult<Json<MessageResponse>> {
    bridge.save_additional_properties(payload).map(Json)
}

/// GET /api/config/database-structure
pub async fn database_structure(
    State(bridge): State<SharedBridge>,
    Query(query): Query<ConfigQuery>,
) -> AppResult<Json<DatabaseStructure>> {
    bridge.database_structure(query.config_id).await.map(Json)
}

pub async fn save_dynamic_fields(
    State(bridge): State<SharedBridge>,
    Json(payload): Json<SaveDynamicFieldsPayload>,
) -> AppResult<Json<MessageResponse>> {
    bridge.save_dynamic_fields(payload).map(Json)
}

pub async fn validate_properties(
    State(bridge): State<SharedBridge>,
    Json(payload): Json<ValidatePropertiesPayload>,
) -> AppResult<Json<ExistenceResponse>> {
    bridge.validate_properties(payload).await.map(Json)
}

pub async fn validate_property_values(
    State(bridge): State<SharedBridge>,
    Json(payload): Json<ValidateValuesPayload>,
) -> AppResult<Json<ValueValidationResponse>> {
    bridge.validate_property_values(payload).await.map(Json)
}

/// GET /api/configs
pub async fn list_configs(State(bridge): State<SharedBridge>) -> AppResult<Json<ConfigsResponse>> {
    bridge.list_configs().map(Json)
}

/// POST /api/configs
pub async fn create_config(
    State(bridge): State<SharedBridge>,
    Json(payload): Json<SaveConfigPayload>,
) -> AppResult<Json<ConfigResponse>> {
    bridge.create_config(payload).await.map(Json)
}

/// PUT /api/configs/:id
pub async fn update_config(
    State(bridge): State<SharedBridge>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateConfigPayload>,
) -> AppResult<Json<ConfigResponse>> {
    bridge.update_config(id, payload).await.map(Json)
}

/// DELETE /api/configs/:id
pub async fn delete_config(
    State(bridge): State<SharedBridge>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    bridge.delete_config(id).map(Json)
}

/// PATCH /api/configs/:id/select
pub async fn select_config(
    State(bridge): State<SharedBridge>,
    Path(id): Path<i64>,
) -> AppResult<Json<ConfigResponse>> {
    bridge.select_config(id).map(Json)
}

pub async fn get_settings(State(bridge): State<SharedBridge>) -> AppResult<Json<AppSettings>> {
    bridge.settings().map(Json)
}

pub async fn update_settings(
    State(bridge): State<SharedBridge>,
    Json(update): Json<serde_json::Value>,
) -> AppResult<Json<AppSettings>> {
    bridge.update_settings(update).map(Json)
}

/// POST /api/chat
pub async fn submit_chat(
    State(bridge): State<SharedBridge>,
    Json(payload): Json<ChatPayload>,
) -> AppResult<Json<ChatResponse>> {
    bridge.submit_chat(payload).await.map(Json)
}
