use crate::content::{content_to_blocks, parse_chat};
use crate::db::{Database, NewConfig, StoredConfig};
use crate::errors::{AppError, AppResult};
use crate::models::{
    AppSettings, ChatPayload, ChatResponse, ConfigResponse, ConfigStatusResponse, ConfigsResponse, DatabaseStructure,
    ExistenceResponse, MessageResponse, PropertiesResponse, PropertyExistence, SaveConfigPayload, SaveConfigResponse,
    SaveDynamicFieldsPayload, SavePropertiesPayload, UpdateConfigPayload, ValidatePropertiesPayload,
    ValidateValuesPayload, ValueValidationResponse,
};
use crate::notion::{build_page_properties, create_page_with_blocks, DatabaseSchema, NotionApi, NotionClient};
use crate::redaction::Redactor;
use crate::validation::validate_batch;
use crate::vault::CredentialVault;
use chrono::{Local, NaiveDate};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DATABASE_FILE_NAME: &str = "chat_to_notion.sqlite";

const NO_TITLE_PROPERTY: &str =
    "No property of type 'title' found in the database. Please create a title property.";

/// Backend service behind the `/api/*` surface. Owns the configuration store,
/// the credential vault and the Notion client; every operation is scoped to
/// an explicit configuration id or, when none is given, the active one.
pub struct BridgeCore {
    db: Arc<Database>,
    vault: CredentialVault,
    notion: Arc<dyn NotionApi>,
    redactor: Redactor,
    data_dir: PathBuf,
}

/// Unsealed view of a configuration, only ever held for one request.
struct ResolvedConfig {
    stored: StoredConfig,
    api_key: String,
}

impl BridgeCore {
    pub fn new(data_dir: PathBuf) -> AppResult<Arc<Self>> {
        std::fs::create_dir_all(&data_dir)?;
        let db = Arc::new(Database::new(&data_dir.join(DATABASE_FILE_NAME))?);
        let vault = CredentialVault::open(&data_dir)?;
        let notion: Arc<dyn NotionApi> = Arc::new(NotionClient::new(&db.get_settings()?)?);
        Ok(Arc::new(Self::with_parts(db, vault, notion, data_dir)))
    }

    pub fn with_parts(
        db: Arc<Database>,
        vault: CredentialVault,
        notion: Arc<dyn NotionApi>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            vault,
            notion,
            redactor: Redactor::new(),
            data_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings(&self) -> AppResult<AppSettings> {
        self.db.get_settings()
    }

    /// Merges `update` into the stored settings. Notion client settings take
    /// effect on the next start.
    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let settings = self.db.update_settings(update)?;
        tracing::info!(
            notion_version = %settings.notion_version,
            timeout_secs = settings.request_timeout_secs,
            "settings updated"
        );
        Ok(settings)
    }

    /// `POST /api/config`: validates credentials and stores them, reusing the
    /// configuration that already targets the same database.
    pub async fn save_config(&self, payload: SaveConfigPayload) -> AppResult<SaveConfigResponse> {
        let (api_key, database_id) = required_credentials(&payload.api_key, &payload.database_id)?;
        let new_config = self.inspect_credentials(api_key, database_id, clean_label(payload.label.clone())).await?;

        let stored = match self.db.find_by_database_id(database_id)? {
            Some(existing) => self
                .db
                .update_credentials(existing.id, &new_config, true)?
                .ok_or_else(|| AppError::NotFound(format!("Configuration {} not found", existing.id)))?,
            None => self.db.insert_config(&new_config, true)?,
        };
        tracing::info!(config_id = stored.id, database_id = %stored.database_id, "configuration saved");

        Ok(SaveConfigResponse {
            message: "Configuration saved successfully".to_string(),
            config_id: stored.id,
            title_property: stored.title_property.clone().unwrap_or_default(),
            date_property: stored.date_property.clone(),
        })
    }

    /// `POST /api/configs`: always creates a new configuration and activates it.
    pub async fn create_config(&self, payload: SaveConfigPayload) -> AppResult<ConfigResponse> {
        let (api_key, database_id) = required_credentials(&payload.api_key, &payload.database_id)?;
        let new_config = self.inspect_credentials(api_key, database_id, clean_label(payload.label)).await?;
        let stored = self.db.insert_config(&new_config, true)?;
        tracing::info!(config_id = stored.id, "configuration created");
        Ok(ConfigResponse {
            config: stored.summary(),
        })
    }

    pub fn list_configs(&self) -> AppResult<ConfigsResponse> {
        let configs = self.db.list_configs()?.iter().map(StoredConfig::summary).collect();
        Ok(ConfigsResponse { configs })
    }

    /// Credentials are re-validated only when the key or the database changes.
    pub async fn update_config(&self, id: i64, payload: UpdateConfigPayload) -> AppResult<ConfigResponse> {
        let existing = self
            .db
            .get_config(id)?
            .ok_or_else(|| AppError::NotFound(format!("Configuration {} not found", id)))?;

        let new_key = payload.api_key.as_deref().map(str::trim).filter(|key| !key.is_empty());
        let new_database = payload
            .database_id
            .as_deref()
            .map(str::trim)
            .filter(|database| !database.is_empty() && *database != existing.database_id);
        let label = clean_label(payload.label);

        if new_key.is_none() && new_database.is_none() {
            if let Some(label) = label.as_deref() {
                self.db.update_label(id, Some(label))?;
            }
        } else {
            let api_key = match new_key {
                Some(key) => key.to_string(),
                None => self.vault.unseal(&existing.api_key_sealed)?,
            };
            let database_id = new_database.unwrap_or(existing.database_id.as_str()).to_string();
            let new_config = self.inspect_credentials(&api_key, &database_id, label).await?;
            self.db.update_credentials(id, &new_config, false)?;
        }

        let updated = self
            .db
            .get_config(id)?
            .ok_or_else(|| AppError::NotFound(format!("Configuration {} not found", id)))?;
        tracing::info!(config_id = id, "configuration updated");
        Ok(ConfigResponse {
            config: updated.summary(),
        })
    }

    pub fn delete_config(&self, id: i64) -> AppResult<MessageResponse> {
        if !self.db.delete_config(id)? {
            return Err(AppError::NotFound(format!("Configuration {} not found", id)));
        }
        tracing::info!(config_id = id, "configuration deleted");
        Ok(MessageResponse {
            message: "Configuration deleted".to_string(),
        })
    }

    pub fn select_config(&self, id: i64) -> AppResult<ConfigResponse> {
        if !self.db.set_active_config(id)? {
            return Err(AppError::NotFound(format!("Configuration {} not found", id)));
        }
        let selected = self
            .db
            .get_config(id)?
            .ok_or_else(|| AppError::NotFound(format!("Configuration {} not found", id)))?;
        tracing::info!(config_id = id, "configuration selected");
        Ok(ConfigResponse {
            config: selected.summary(),
        })
    }

    /// `GET /api/config`. An empty store reports `configured: false` rather
    /// than an error.
    pub fn config_status(&self, config_id: Option<i64>) -> AppResult<ConfigStatusResponse> {
        let stored = match self.stored_config(config_id) {
            Ok(stored) => stored,
            Err(AppError::ConfigurationMissing(_)) => return Ok(ConfigStatusResponse::default()),
            Err(error) => return Err(error),
        };
        Ok(ConfigStatusResponse {
            configured: true,
            config_id: Some(stored.id),
            database_id: stored.database_id,
            title_property: stored.title_property,
            date_property: stored.date_property,
            additional_properties: stored.additional_properties,
            dynamic_fields: stored.dynamic_fields,
        })
    }

    /// Schema properties the form can fill in (title and date excluded).
    pub async fn properties(&self, config_id: Option<i64>) -> AppResult<PropertiesResponse> {
        let config = self.resolve(config_id)?;
        let schema = self.fetch_schema(&config).await?;
        Ok(PropertiesResponse {
            properties: schema.form_properties(),
        })
    }

    pub async fn database_structure(&self, config_id: Option<i64>) -> AppResult<DatabaseStructure> {
        let config = self.resolve(config_id)?;
        let schema = self.fetch_schema(&config).await?;
        Ok(schema.structure())
    }

    pub fn save_additional_properties(&self, payload: SavePropertiesPayload) -> AppResult<MessageResponse> {
        let stored = self.stored_config(payload.config_id)?;
        self.db.save_additional_properties(stored.id, &payload.additional_properties)?;
        tracing::info!(
            config_id = stored.id,
            selected = payload.additional_properties.values().filter(|selected| **selected).count(),
            "additional properties saved"
        );
        Ok(MessageResponse {
            message: "Additional properties saved successfully".to_string(),
        })
    }

    /// Stores field shapes only; values never reach the backend store.
    pub fn save_dynamic_fields(&self, payload: SaveDynamicFieldsPayload) -> AppResult<MessageResponse> {
        let stored = self.stored_config(payload.config_id)?;
        let max_fields = self.db.get_settings()?.max_dynamic_fields;
        if payload.dynamic_fields.len() > max_fields {
            return Err(AppError::Validation(format!(
                "At most {} dynamic fields are allowed",
                max_fields
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for field in &payload.dynamic_fields {
            let name = field.name.trim();
            if !name.is_empty() && !seen.insert(name) {
                return Err(AppError::Validation(format!("Duplicate dynamic field name: {}", name)));
            }
        }
        self.db.save_dynamic_fields(stored.id, &payload.dynamic_fields)?;
        tracing::info!(config_id = stored.id, count = payload.dynamic_fields.len(), "dynamic fields saved");
        Ok(MessageResponse {
            message: "Dynamic fields saved successfully".to_string(),
        })
    }

    /// Reports, per requested name, whether the live schema has it and with
    /// which type. `matches` is only set for existing properties.
    pub async fn validate_properties(&self, payload: ValidatePropertiesPayload) -> AppResult<ExistenceResponse> {
        let config = self.resolve(payload.config_id)?;
        let schema = self.fetch_schema(&config).await?;

        let validation: BTreeMap<String, PropertyExistence> = payload
            .properties
            .into_iter()
            .map(|probe| {
                let existence = match schema.find(&probe.name) {
                    Some(existing) => PropertyExistence {
                        exists: true,
                        matches: Some(existing.property_type == probe.property_type),
                        property_type: existing.property_type.clone(),
                    },
                    None => PropertyExistence {
                        exists: false,
                        property_type: probe.property_type,
                        matches: None,
                    },
                };
                (probe.name, existence)
            })
            .collect();
        Ok(ExistenceResponse { validation })
    }

    pub async fn validate_property_values(&self, payload: ValidateValuesPayload) -> AppResult<ValueValidationResponse> {
        let config = self.resolve(payload.config_id)?;
        let schema = self.fetch_schema(&config).await?;
        let definitions = schema.structure().properties;
        Ok(ValueValidationResponse {
            validation: validate_batch(&definitions, &payload.property_values),
        })
    }

    /// `POST /api/chat`: turns the transcript into a Notion page.
    pub async fn submit_chat(&self, payload: ChatPayload) -> AppResult<ChatResponse> {
        self.submit_chat_on(payload, Local::now().date_naive()).await
    }

    async fn submit_chat_on(&self, payload: ChatPayload, today: NaiveDate) -> AppResult<ChatResponse> {
        let config = self.resolve(payload.config_id)?;
        if payload.content.trim().is_empty() {
            return Err(AppError::InvalidInput("Chat content is required".to_string()));
        }

        let parsed = parse_chat(&payload.content, payload.date.as_deref(), today);
        let schema = self.fetch_schema(&config).await?;

        let configured_title = config.stored.title_property.clone();
        let title_property = configured_title
            .clone()
            .or_else(|| schema.title_property().map(ToString::to_string))
            .ok_or_else(|| AppError::InvalidInput(NO_TITLE_PROPERTY.to_string()))?;

        let page = build_page_properties(
            &schema,
            &title_property,
            config.stored.date_property.as_deref(),
            &parsed,
            &payload.additional_properties,
        );
        if page.date_detected || configured_title.is_none() {
            self.db.update_detected_properties(
                config.stored.id,
                Some(&title_property),
                page.date_property.as_deref(),
            )?;
            tracing::info!(
                config_id = config.stored.id,
                title_property = %title_property,
                date_property = ?page.date_property,
                "persisted detected properties"
            );
        }

        let blocks = content_to_blocks(&parsed.content);
        let (page_id, blocks_count) = create_page_with_blocks(
            self.notion.as_ref(),
            &config.api_key,
            &config.stored.database_id,
            page.properties,
            blocks,
        )
        .await
        .map_err(|error| self.scrub(error))?;

        let date_sent = page.date_property.is_some();
        let mut message = format!("Chat sent to Notion successfully ({} blocks created)", blocks_count);
        if date_sent {
            message.push_str(&format!(" - Date: {}", parsed.date));
        } else {
            message.push_str(" - No date property found in your database");
        }
        if !page.missing_properties.is_empty() {
            tracing::warn!(
                config_id = config.stored.id,
                missing = ?page.missing_properties,
                "submitted values name properties absent from the database"
            );
        }
        tracing::info!(config_id = config.stored.id, page_id = %page_id, blocks = blocks_count, "chat page created");

        Ok(ChatResponse {
            message: Some(message),
            notion_page_id: Some(page_id),
            date_sent,
            missing_properties: page.missing_properties,
        })
    }

    fn stored_config(&self, config_id: Option<i64>) -> AppResult<StoredConfig> {
        match config_id {
            Some(id) => self
                .db
                .get_config(id)?
                .ok_or_else(|| AppError::NotFound(format!("Configuration {} not found", id))),
            None => self.db.get_active_config()?.ok_or_else(AppError::not_configured),
        }
    }

    fn resolve(&self, config_id: Option<i64>) -> AppResult<ResolvedConfig> {
        let stored = self.stored_config(config_id)?;
        let api_key = self.vault.unseal(&stored.api_key_sealed)?;
        Ok(ResolvedConfig { stored, api_key })
    }

    async fn fetch_schema(&self, config: &ResolvedConfig) -> AppResult<DatabaseSchema> {
        self.notion
            .retrieve_database(&config.api_key, &config.stored.database_id)
            .await
            .map_err(|error| {
                tracing::warn!(config_id = config.stored.id, "database schema fetch failed");
                self.scrub(error)
            })
    }

    /// Retrieves the database with the given credentials and detects the
    /// title and date properties. Any Notion failure is reported as invalid
    /// credentials.
    async fn inspect_credentials(
        &self,
        api_key: &str,
        database_id: &str,
        label: Option<String>,
    ) -> AppResult<NewConfig> {
        let schema = self
            .notion
            .retrieve_database(api_key, database_id)
            .await
            .map_err(|error| {
                let detail = self.redactor.redact(error.message());
                tracing::warn!(database_id = %database_id, error = %detail, "credential check failed");
                AppError::InvalidInput(format!("Invalid Notion credentials: {}", detail))
            })?;

        let title_property = schema
            .title_property()
            .ok_or_else(|| AppError::InvalidInput(NO_TITLE_PROPERTY.to_string()))?
            .to_string();

        Ok(NewConfig {
            api_key_sealed: self.vault.seal(api_key)?,
            database_id: database_id.to_string(),
            label,
            database_title: Some(schema.title.clone()).filter(|title| !title.is_empty()),
            title_property: Some(title_property),
            date_property: schema.date_property().map(ToString::to_string),
        })
    }

    fn scrub(&self, error: AppError) -> AppError {
        match error {
            AppError::Notion(message) => AppError::Notion(self.redactor.redact(&message)),
            AppError::Io(message) => AppError::Io(self.redactor.redact(&message)),
            other => other,
        }
    }
}

fn required_credentials<'a>(api_key: &'a str, database_id: &'a str) -> AppResult<(&'a str, &'a str)> {
    let (api_key, database_id) = (api_key.trim(), database_id.trim());
    if api_key.is_empty() || database_id.is_empty() {
        return Err(AppError::InvalidInput("API key and database ID are required".to_string()));
    }
    Ok((api_key, database_id))
}

fn clean_label(label: Option<String>) -> Option<String> {
    label.map(|label| label.trim().to_string()).filter(|label| !label.is_empty())
}
