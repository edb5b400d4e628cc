use crate::errors::{AppError, AppResult};
use crate::models::{
    ChatPayload, ChatResponse, ConfigResponse, ConfigStatusResponse, ConfigsResponse, DatabaseStructure, ErrorBody,
    ExistenceResponse, HealthResponse, MessageResponse, PropertiesResponse, SaveConfigPayload, SaveConfigResponse,
    SaveDynamicFieldsPayload, SavePropertiesPayload, UpdateConfigPayload, ValidatePropertiesPayload,
    ValidateValuesPayload, ValueValidationResponse,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// The `/api/*` surface as seen by the form engine.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn health(&self) -> AppResult<HealthResponse>;
    async fn config_status(&self, config_id: Option<i64>) -> AppResult<ConfigStatusResponse>;
    async fn save_config(&self, payload: SaveConfigPayload) -> AppResult<SaveConfigResponse>;
    async fn list_configs(&self) -> AppResult<ConfigsResponse>;
    async fn create_config(&self, payload: SaveConfigPayload) -> AppResult<ConfigResponse>;
    async fn update_config(&self, id: i64, payload: UpdateConfigPayload) -> AppResult<ConfigResponse>;
    async fn delete_config(&self, id: i64) -> AppResult<MessageResponse>;
    async fn select_config(&self, id: i64) -> AppResult<ConfigResponse>;
    async fn fetch_properties(&self, config_id: Option<i64>) -> AppResult<PropertiesResponse>;
    async fn database_structure(&self, config_id: Option<i64>) -> AppResult<DatabaseStructure>;
    async fn save_properties(&self, payload: SavePropertiesPayload) -> AppResult<MessageResponse>;
    async fn save_dynamic_fields(&self, payload: SaveDynamicFieldsPayload) -> AppResult<MessageResponse>;
    async fn validate_properties(&self, payload: ValidatePropertiesPayload) -> AppResult<ExistenceResponse>;
    async fn validate_property_values(&self, payload: ValidateValuesPayload) -> AppResult<ValueValidationResponse>;
    async fn submit_chat(&self, payload: ChatPayload) -> AppResult<ChatResponse>;
}

/// reqwest client for a running backend, embedded or remote.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    fn scoped(builder: RequestBuilder, config_id: Option<i64>) -> RequestBuilder {
        match config_id {
            Some(id) => builder.query(&[("configId", id)]),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> AppResult<T> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|body| body.error)
            .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
        Err(match status {
            StatusCode::BAD_REQUEST => AppError::InvalidInput(message),
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            StatusCode::BAD_GATEWAY => AppError::Notion(message),
            _ => AppError::Internal(message),
        })
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn health(&self) -> AppResult<HealthResponse> {
        Self::send(self.request(Method::GET, "/api/health")).await
    }

    async fn config_status(&self, config_id: Option<i64>) -> AppResult<ConfigStatusResponse> {
        Self::send(Self::scoped(self.request(Method::GET, "/api/config"), config_id)).await
    }

    async fn save_config(&self, payload: SaveConfigPayload) -> AppResult<SaveConfigResponse> {
        Self::send(self.request(Method::POST, "/api/config").json(&payload)).await
    }

    async fn list_configs(&self) -> AppResult<ConfigsResponse> {
        Self::send(self.request(Method::GET, "/api/configs")).await
    }

    async fn create_config(&self, payload: SaveConfigPayload) -> AppResult<ConfigResponse> {
        Self::send(self.request(Method::POST, "/api/configs").json(&payload)).await
    }

    async fn update_config(&self, id: i64, payload: UpdateConfigPayload) -> AppResult<ConfigResponse> {
        Self::send(self.request(Method::PUT, &format!("/api/configs/{}", id)).json(&payload)).await
    }

    async fn delete_config(&self, id: i64) -> AppResult<MessageResponse> {
        Self::send(self.request(Method::DELETE, &format!("/api/configs/{}", id))).await
    }

    async fn select_config(&self, id: i64) -> AppResult<ConfigResponse> {
        Self::send(self.request(Method::PATCH, &format!("/api/configs/{}/select", id))).await
    }

    async fn fetch_properties(&self, config_id: Option<i64>) -> AppResult<PropertiesResponse> {
        Self::send(Self::scoped(self.request(Method::GET, "/api/config/properties"), config_id)).await
    }

    async fn database_structure(&self, config_id: Option<i64>) -> AppResult<DatabaseStructure> {
        Self::send(Self::scoped(
            self.request(Method::GET, "/api/config/database-structure"),
            config_id,
        ))
        .await
    }

    async fn save_properties(&self, payload: SavePropertiesPayload) -> AppResult<MessageResponse> {
        Self::send(self.request(Method::POST, "/api/config/properties").json(&payload)).await
    }

    async fn save_dynamic_fields(&self, payload: SaveDynamicFieldsPayload) -> AppResult<MessageResponse> {
        Self::send(self.request(Method::POST, "/api/config/dynamic-fields").json(&payload)).await
    }

    async fn validate_properties(&self, payload: ValidatePropertiesPayload) -> AppResult<ExistenceResponse> {
        Self::send(self.request(Method::POST, "/api/config/validate-properties").json(&payload)).await
    }

    async fn validate_property_values(&self, payload: ValidateValuesPayload) -> AppResult<ValueValidationResponse> {
        Self::send(
            self.request(Method::POST, "/api/config/validate-property-values")
                .json(&payload),
        )
        .await
    }

    async fn submit_chat(&self, payload: ChatPayload) -> AppResult<ChatResponse> {
        Self::send(self.request(Method::POST, "/api/chat").json(&payload)).await
    }
}
