use super::backend::BackendApi;
use crate::errors::{AppError, AppResult};
use crate::models::PropertyDefinition;

/// Property definitions fetched for one configuration.
#[derive(Debug, Clone, PartialEq)]
struct SchemaSnapshot {
    config_id: i64,
    properties: Vec<PropertyDefinition>,
}

/// Local copy of the active configuration's schema. A failed fetch leaves
/// the cache empty with the error kept for display.
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    snapshot: Option<SchemaSnapshot>,
    last_error: Option<String>,
}

impl SchemaCache {
    /// Properties for `config_id`; empty when nothing was fetched for it.
    pub fn properties_for(&self, config_id: i64) -> &[PropertyDefinition] {
        match &self.snapshot {
            Some(snapshot) if snapshot.config_id == config_id => &snapshot.properties,
            _ => &[],
        }
    }

    pub fn find(&self, config_id: i64, name: &str) -> Option<&PropertyDefinition> {
        self.properties_for(config_id).iter().find(|property| property.name == name)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn store(&mut self, config_id: i64, properties: Vec<PropertyDefinition>) {
        self.snapshot = Some(SchemaSnapshot {
            config_id,
            properties,
        });
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: &AppError) {
        self.snapshot = None;
        self.last_error = Some(error.message().to_string());
    }

    pub fn invalidate(&mut self) {
        self.snapshot = None;
        self.last_error = None;
    }
}

/// Fetches the form-fillable properties of a configuration. Any failure is
/// reported as [`AppError::SchemaFetch`].
pub async fn fetch_schema(backend: &dyn BackendApi, config_id: i64) -> AppResult<Vec<PropertyDefinition>> {
    backend
        .fetch_properties(Some(config_id))
        .await
        .map(|response| response.properties)
        .map_err(|error| AppError::SchemaFetch(error.message().to_string()))
}
