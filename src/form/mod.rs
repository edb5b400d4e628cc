//! Client-side form engine: the state behind the submission form and every
//! named operation that mutates it.
//!
//! All state lives in one [`FormSession`]. Async operations capture the
//! active configuration id and the session epoch before awaiting and drop
//! their result if either changed in the meantime, so a configuration switch
//! never sees data that belongs to the previous configuration.

pub mod backend;
pub mod fields;
pub mod remote;
pub mod schema;
pub mod submission;
pub mod translate;

pub use backend::{BackendApi, HttpBackend};
pub use fields::{DynamicFieldList, FieldUpdate};
pub use remote::{RemoteOutcome, RemoteValidator};
pub use schema::{fetch_schema, SchemaCache};
pub use submission::{run_submission, SubmissionDraft, SubmissionReport, SubmissionTracker};
pub use translate::translate_backend_error;

use crate::errors::{AppError, AppResult};
use crate::models::{
    AppSettings, ConfigStatusResponse, Configuration, DynamicField, FieldValidation, PropertyDefinition, PropertyType,
    PropertyValue, PropertyValues, SaveConfigPayload, SaveConfigResponse, SaveDynamicFieldsPayload,
    SavePropertiesPayload, SelectedProperties, SubmissionProgress, SubmissionResult, UpdateConfigPayload,
    ValidationSummary,
};
use crate::validation::{summarize, validate_local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Serializable view of the whole form, handed to the UI after every
/// operation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormSnapshot {
    pub active_config_id: Option<i64>,
    pub properties: Vec<PropertyDefinition>,
    pub schema_error: Option<String>,
    pub selected_properties: SelectedProperties,
    pub visible_properties: Vec<String>,
    pub property_values: PropertyValues,
    pub field_errors: BTreeMap<String, FieldValidation>,
    pub remote_validation: BTreeMap<String, FieldValidation>,
    pub validation_summary: Option<ValidationSummary>,
    pub dynamic_fields: Vec<DynamicField>,
    pub can_add_dynamic_field: bool,
    pub missing_properties: Vec<String>,
    pub content: String,
    pub date: Option<String>,
    pub progress: SubmissionProgress,
}

#[derive(Debug, Default)]
struct FormState {
    active_config: Option<i64>,
    epoch: u64,
    schema: SchemaCache,
    selected: SelectedProperties,
    values: PropertyValues,
    field_errors: BTreeMap<String, FieldValidation>,
    remote_results: BTreeMap<String, FieldValidation>,
    remote_summary: Option<ValidationSummary>,
    dynamic: DynamicFieldList,
    missing_properties: Vec<String>,
    content: String,
    date: Option<String>,
}

impl FormState {
    fn is_current(&self, config_id: i64, epoch: u64) -> bool {
        self.active_config == Some(config_id) && self.epoch == epoch
    }

    fn properties(&self) -> &[PropertyDefinition] {
        match self.active_config {
            Some(config_id) => self.schema.properties_for(config_id),
            None => &[],
        }
    }

    fn definition(&self, name: &str) -> Option<&PropertyDefinition> {
        self.schema.find(self.active_config?, name)
    }

    /// Properties rendered in the form: selected by the user, or required.
    fn visible(&self) -> Vec<PropertyDefinition> {
        self.properties()
            .iter()
            .filter(|property| property.required || self.selected.get(&property.name).copied().unwrap_or(false))
            .cloned()
            .collect()
    }

    fn empty_value(&self, name: &str) -> PropertyValue {
        let property_type = self
            .definition(name)
            .map(|property| property.property_type.clone())
            .unwrap_or(PropertyType::RichText);
        PropertyValue::empty_for(&property_type)
    }

    fn seed_values(&mut self) {
        for property in self.visible() {
            self.values
                .entry(property.name.clone())
                .or_insert_with(|| PropertyValue::empty_for(&property.property_type));
        }
    }

    fn prune_missing(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.missing_properties.retain(|missing| missing != name);
        }
    }

    fn reset_after_submission(&mut self) {
        self.content.clear();
        self.date = None;
        let names: Vec<String> = self.values.keys().cloned().collect();
        for name in names {
            let empty = self.empty_value(&name);
            self.values.insert(name, empty);
        }
        self.field_errors.clear();
        self.remote_results.clear();
        self.remote_summary = None;
        self.dynamic.reset_values();
    }
}

pub struct FormSession {
    backend: Arc<dyn BackendApi>,
    state: Mutex<FormState>,
    remote: RemoteValidator,
    tracker: SubmissionTracker,
    max_dynamic_fields: usize,
}

impl FormSession {
    pub fn new(backend: Arc<dyn BackendApi>, settings: &AppSettings) -> Self {
        Self {
            backend,
            state: Mutex::new(FormState {
                dynamic: DynamicFieldList::new(settings.max_dynamic_fields),
                ..FormState::default()
            }),
            remote: RemoteValidator::new(Duration::from_millis(settings.validation_debounce_ms)),
            tracker: SubmissionTracker::new(),
            max_dynamic_fields: settings.max_dynamic_fields,
        }
    }

    pub fn backend(&self) -> &Arc<dyn BackendApi> {
        &self.backend
    }

    fn lock(&self) -> MutexGuard<'_, FormState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scope(&self) -> Option<(i64, u64)> {
        let state = self.lock();
        state.active_config.map(|config_id| (config_id, state.epoch))
    }

    pub fn active_config_id(&self) -> Option<i64> {
        self.lock().active_config
    }

    pub fn snapshot(&self) -> FormSnapshot {
        let progress = self.tracker.current();
        let state = self.lock();
        FormSnapshot {
            active_config_id: state.active_config,
            properties: state.properties().to_vec(),
            schema_error: state.schema.last_error().map(ToString::to_string),
            selected_properties: state.selected.clone(),
            visible_properties: state.visible().into_iter().map(|property| property.name).collect(),
            property_values: state.values.clone(),
            field_errors: state.field_errors.clone(),
            remote_validation: state.remote_results.clone(),
            validation_summary: state.remote_summary.clone(),
            dynamic_fields: state.dynamic.fields().to_vec(),
            can_add_dynamic_field: state.active_config.is_some() && state.dynamic.len() < self.max_dynamic_fields,
            missing_properties: state.missing_properties.clone(),
            content: state.content.clone(),
            date: state.date.clone(),
            progress,
        }
    }

    /// Loads a configuration into the form, discarding all state that
    /// belonged to the previous one. `None` lets the backend pick the
    /// active configuration.
    pub async fn activate(&self, config_id: Option<i64>) -> AppResult<FormSnapshot> {
        let epoch = {
            let mut state = self.lock();
            state.epoch += 1;
            state.epoch
        };
        self.remote.cancel();

        let status = self.backend.config_status(config_id).await?;
        let activated = {
            let mut state = self.lock();
            if state.epoch != epoch {
                tracing::debug!(?config_id, "configuration switched during activation, dropping status");
                None
            } else {
                Some(self.apply_status(&mut state, config_id, &status))
            }
        };

        if let Some(Some(active)) = activated {
            tracing::info!(config_id = active, "configuration activated");
            self.refresh_schema().await;
        }
        Ok(self.snapshot())
    }

    fn apply_status(&self, state: &mut FormState, requested: Option<i64>, status: &ConfigStatusResponse) -> Option<i64> {
        let active = if status.configured {
            status.config_id.or(requested)
        } else {
            None
        };
        let content = std::mem::take(&mut state.content);
        let date = state.date.take();
        *state = FormState {
            active_config: active,
            epoch: state.epoch,
            selected: if active.is_some() {
                status.additional_properties.clone()
            } else {
                SelectedProperties::new()
            },
            dynamic: match active {
                Some(_) => DynamicFieldList::from_shapes(&status.dynamic_fields, self.max_dynamic_fields),
                None => DynamicFieldList::new(self.max_dynamic_fields),
            },
            content,
            date,
            ..FormState::default()
        };
        active
    }

    /// Re-fetches the schema of the active configuration. A failed fetch
    /// leaves the property list empty and records the error.
    pub async fn refresh_schema(&self) -> FormSnapshot {
        let Some((config_id, epoch)) = self.scope() else {
            return self.snapshot();
        };
        self.lock().schema.invalidate();

        let fetched = fetch_schema(self.backend.as_ref(), config_id).await;
        {
            let mut state = self.lock();
            if !state.is_current(config_id, epoch) {
                tracing::debug!(config_id, "discarding schema fetched for a stale configuration");
            } else {
                match fetched {
                    Ok(properties) => {
                        tracing::debug!(config_id, count = properties.len(), "schema refreshed");
                        state.schema.store(config_id, properties);
                        state.seed_values();
                    }
                    Err(error) => {
                        tracing::warn!(config_id, error = %error, "schema fetch failed");
                        state.schema.record_failure(&error);
                    }
                }
            }
        }
        self.snapshot()
    }

    pub fn set_property_selected(&self, name: &str, selected: bool) -> AppResult<()> {
        let mut state = self.lock();
        if state.active_config.is_none() {
            return Err(AppError::not_configured());
        }
        self.remote.cancel();
        state.selected.insert(name.to_string(), selected);
        if selected {
            let empty = state.empty_value(name);
            state.values.entry(name.to_string()).or_insert(empty);
        } else if !state.definition(name).is_some_and(|property| property.required) {
            state.values.remove(name);
            state.field_errors.remove(name);
            state.remote_results.remove(name);
        }
        Ok(())
    }

    /// Persists the selected-property map for the active configuration.
    pub async fn save_selected_properties(&self) -> AppResult<String> {
        let (config_id, selected) = {
            let state = self.lock();
            let config_id = state.active_config.ok_or_else(AppError::not_configured)?;
            (config_id, state.selected.clone())
        };
        let response = self
            .backend
            .save_properties(SavePropertiesPayload {
                additional_properties: selected,
                config_id: Some(config_id),
            })
            .await?;
        Ok(response.message)
    }

    /// Converts raw input by the property's declared type, stores it and
    /// returns the inline validation result.
    pub fn set_value(&self, name: &str, raw: &str) -> FieldValidation {
        let property_type = {
            let state = self.lock();
            state
                .definition(name)
                .map(|property| property.property_type.clone())
                .unwrap_or(PropertyType::RichText)
        };
        self.set_typed_value(name, PropertyValue::from_input(&property_type, raw))
    }

    /// Stores `value` and supersedes any pending remote validation, which
    /// was issued for the previous values.
    pub fn set_typed_value(&self, name: &str, value: PropertyValue) -> FieldValidation {
        let mut state = self.lock();
        self.remote.cancel();
        let result = match state.definition(name) {
            Some(property) => validate_local(property, &value),
            None => FieldValidation::ok(),
        };
        state.values.insert(name.to_string(), value);
        if result.valid {
            state.field_errors.remove(name);
        } else {
            state.field_errors.insert(name.to_string(), result.clone());
        }
        result
    }

    /// Local validation summary over the visible properties.
    pub fn summary(&self) -> ValidationSummary {
        let state = self.lock();
        let visible = state.visible();
        let results: BTreeMap<String, FieldValidation> = visible
            .iter()
            .map(|property| {
                let empty = PropertyValue::empty_for(&property.property_type);
                let value = state.values.get(&property.name).unwrap_or(&empty);
                (property.name.clone(), validate_local(property, value))
            })
            .collect();
        summarize(&visible, &state.values, &results)
    }

    /// Debounced server-side validation of the current values. Returns
    /// `None` when a newer request or a configuration switch superseded it.
    pub async fn validate_remote(&self) -> Option<ValidationSummary> {
        let (config_id, epoch, values, visible) = {
            let state = self.lock();
            let config_id = state.active_config?;
            (config_id, state.epoch, state.values.clone(), state.visible())
        };

        let outcome = self
            .remote
            .validate(self.backend.as_ref(), config_id, values, visible)
            .await?;

        let mut state = self.lock();
        if !state.is_current(outcome.config_id, epoch) {
            tracing::debug!(config_id, "discarding remote validation for a stale configuration");
            return None;
        }
        if !self.remote.is_current(outcome.ticket) {
            tracing::debug!(config_id, "values changed during remote validation, discarding");
            return None;
        }
        state.remote_results = outcome.results;
        state.remote_summary = Some(outcome.summary.clone());
        Some(outcome.summary)
    }

    /// Appends a blank dynamic field. `None` when no configuration is active
    /// or the list is full.
    pub fn add_dynamic_field(&self) -> Option<String> {
        let mut state = self.lock();
        state.active_config?;
        state.dynamic.add()
    }

    pub fn remove_dynamic_field(&self, id: &str) -> bool {
        let mut state = self.lock();
        match state.dynamic.remove(id) {
            Some(removed) => {
                state.prune_missing(&removed.name);
                true
            }
            None => false,
        }
    }

    /// Applies `update` to one field. `false` for an unknown id or a name
    /// another dynamic field already uses; the field is left untouched then.
    pub fn update_dynamic_field(&self, id: &str, update: FieldUpdate) -> bool {
        let mut state = self.lock();
        let renamed = update.name.is_some();
        let new_name = update.name.clone();
        match state.dynamic.update(id, update) {
            Some(previous) => {
                if renamed && new_name.as_deref() != Some(previous.as_str()) {
                    state.prune_missing(&previous);
                }
                true
            }
            None => false,
        }
    }

    pub fn reset_dynamic_values(&self) {
        self.lock().dynamic.reset_values();
    }

    /// Writes the dynamic field shapes of the active configuration. Values
    /// are never persisted.
    pub async fn persist_dynamic_fields(&self) -> AppResult<String> {
        let (config_id, shapes) = {
            let state = self.lock();
            let config_id = state.active_config.ok_or_else(AppError::not_configured)?;
            (config_id, state.dynamic.shapes())
        };
        let response = self
            .backend
            .save_dynamic_fields(SaveDynamicFieldsPayload {
                dynamic_fields: shapes,
                config_id: Some(config_id),
            })
            .await?;
        Ok(response.message)
    }

    pub fn set_content(&self, content: impl Into<String>) {
        self.lock().content = content.into();
    }

    pub fn set_date(&self, date: Option<String>) {
        self.lock().date = date.filter(|date| !date.trim().is_empty());
    }

    pub fn progress(&self) -> SubmissionProgress {
        self.tracker.current()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<SubmissionProgress> {
        self.tracker.subscribe()
    }

    /// Validates, assembles and sends the form. Without an active
    /// configuration nothing leaves the process.
    pub async fn submit(&self) -> SubmissionResult {
        if self.active_config_id().is_none() {
            return SubmissionResult::failed(translate_backend_error(Some(AppError::not_configured().message())));
        }
        let guard = match self.tracker.try_begin() {
            Ok(guard) => guard,
            Err(error) => return SubmissionResult::failed(error.message()),
        };

        let (draft, epoch) = {
            let state = self.lock();
            let Some(config_id) = state.active_config else {
                return SubmissionResult::failed(translate_backend_error(Some(AppError::not_configured().message())));
            };
            let draft = SubmissionDraft {
                config_id,
                content: state.content.clone(),
                date: state.date.clone(),
                values: state.values.clone(),
                visible: state.visible(),
                dynamic_fields: state.dynamic.named().cloned().collect(),
            };
            (draft, state.epoch)
        };
        let config_id = draft.config_id;

        let report = run_submission(self.backend.as_ref(), &guard, draft).await;
        {
            let mut state = self.lock();
            if state.is_current(config_id, epoch) {
                if let Some(missing) = report.missing_properties {
                    state.missing_properties = missing;
                }
                if report.reset_form {
                    state.reset_after_submission();
                }
            } else {
                tracing::debug!(config_id, "configuration switched during submission, form left untouched");
            }
        }
        drop(guard);
        report.result
    }

    pub async fn list_configs(&self) -> AppResult<Vec<Configuration>> {
        Ok(self.backend.list_configs().await?.configs)
    }

    /// Saves credentials for a database and activates the resulting
    /// configuration.
    pub async fn save_config(&self, payload: SaveConfigPayload) -> AppResult<SaveConfigResponse> {
        let response = self.backend.save_config(payload).await?;
        self.activate(Some(response.config_id)).await?;
        Ok(response)
    }

    pub async fn create_config(&self, payload: SaveConfigPayload) -> AppResult<Configuration> {
        let config = self.backend.create_config(payload).await?.config;
        self.activate(Some(config.id)).await?;
        Ok(config)
    }

    pub async fn update_config(&self, id: i64, payload: UpdateConfigPayload) -> AppResult<Configuration> {
        let config = self.backend.update_config(id, payload).await?.config;
        if self.active_config_id() == Some(id) {
            self.activate(Some(id)).await?;
        }
        Ok(config)
    }

    pub async fn select_config(&self, id: i64) -> AppResult<FormSnapshot> {
        self.backend.select_config(id).await?;
        self.activate(Some(id)).await
    }

    pub async fn delete_config(&self, id: i64) -> AppResult<String> {
        let response = self.backend.delete_config(id).await?;
        if self.active_config_id() == Some(id) {
            self.activate(None).await?;
        }
        Ok(response.message)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBackend;
    use super::{FieldUpdate, FormSession};
    use crate::models::{AppSettings, PropertyDefinition, PropertyType, PropertyValue, SubmissionPhase};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    fn settings() -> AppSettings {
        AppSettings {
            validation_debounce_ms: 1,
            ..AppSettings::default()
        }
    }

    fn session(backend: &Arc<FakeBackend>) -> FormSession {
        FormSession::new(backend.clone(), &settings())
    }

    fn priority() -> PropertyDefinition {
        PropertyDefinition::new("Priority", PropertyType::Select)
            .with_options(["Low", "Med", "High"])
            .required()
    }

    #[tokio::test]
    async fn activation_loads_selection_fields_and_schema() {
        let backend = Arc::new(FakeBackend::configured(
            1,
            vec![PropertyDefinition::new("Notes", PropertyType::RichText), priority()],
        ));
        {
            let mut status = backend.status.lock().expect("lock");
            status.additional_properties.insert("Notes".to_string(), true);
            status.dynamic_fields = vec![crate::models::DynamicFieldShape {
                id: "f1".to_string(),
                name: "Tag".to_string(),
                field_type: PropertyType::RichText,
            }];
        }
        let session = session(&backend);

        let snapshot = session.activate(None).await.expect("activate");
        assert_eq!(snapshot.active_config_id, Some(1));
        assert_eq!(snapshot.properties.len(), 2);
        assert_eq!(snapshot.visible_properties, vec!["Notes".to_string(), "Priority".to_string()]);
        assert_eq!(snapshot.dynamic_fields.len(), 1);
        assert!(snapshot.property_values.contains_key("Priority"));
    }

    #[tokio::test]
    async fn schema_failure_is_not_fatal() {
        let backend = Arc::new(FakeBackend::configured(1, vec![priority()]));
        backend.fail_properties.store(true, Ordering::SeqCst);
        let session = session(&backend);

        let snapshot = session.activate(Some(1)).await.expect("activate");
        assert_eq!(snapshot.active_config_id, Some(1));
        assert!(snapshot.properties.is_empty());
        assert_eq!(snapshot.schema_error.as_deref(), Some("API token is invalid."));
    }

    #[tokio::test]
    async fn stale_schema_is_discarded_after_switch() {
        let backend = Arc::new(FakeBackend::configured(1, vec![priority()]));
        backend
            .properties
            .lock()
            .expect("lock")
            .insert(2, vec![PropertyDefinition::new("Mood", PropertyType::RichText)]);
        let session = session(&backend);
        session.activate(Some(1)).await.expect("activate");

        *backend.fetch_delay.lock().expect("lock") = Duration::from_millis(40);
        let (_, switched) = tokio::join!(session.refresh_schema(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            session.activate(Some(2)).await
        });
        let switched = switched.expect("switch");
        assert_eq!(switched.active_config_id, Some(2));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.properties.len(), 1);
        assert_eq!(snapshot.properties[0].name, "Mood");
        assert!(!snapshot.property_values.contains_key("Priority"));
    }

    #[tokio::test]
    async fn values_convert_by_type_and_validate_inline() {
        let backend = Arc::new(FakeBackend::configured(
            1,
            vec![priority(), PropertyDefinition::new("Tags", PropertyType::MultiSelect).with_options(["a", "b"])],
        ));
        let session = session(&backend);
        session.activate(Some(1)).await.expect("activate");

        let result = session.set_value("Priority", "Urgent");
        assert!(!result.valid);
        assert!(session.snapshot().field_errors.contains_key("Priority"));
        assert!(session.set_value("Priority", "High").valid);
        assert!(session.snapshot().field_errors.is_empty());

        session.set_property_selected("Tags", true).expect("select");
        session.set_value("Tags", "a, b");
        assert_eq!(
            session.snapshot().property_values["Tags"],
            PropertyValue::Multi(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(session.summary().valid, 2);
    }

    #[tokio::test]
    async fn selected_properties_round_trip() {
        let backend = Arc::new(FakeBackend::configured(1, vec![PropertyDefinition::new("Notes", PropertyType::RichText)]));
        let session = session(&backend);
        session.activate(Some(1)).await.expect("activate");

        session.set_property_selected("Notes", true).expect("select");
        session.set_property_selected("Mood", false).expect("select");
        let before = session.snapshot().selected_properties;
        session.save_selected_properties().await.expect("save");

        let after = session.activate(Some(1)).await.expect("reload").selected_properties;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn remote_validation_records_summary() {
        let backend = Arc::new(FakeBackend::configured(1, vec![priority()]));
        let session = session(&backend);
        session.activate(Some(1)).await.expect("activate");
        session.set_value("Priority", "Low");

        let summary = session.validate_remote().await.expect("summary");
        assert_eq!(summary.total, 1);
        assert_eq!(summary.valid, 1);
        assert!(summary.missing_required.is_empty());
        assert_eq!(session.snapshot().validation_summary, Some(summary));
    }

    #[tokio::test]
    async fn editing_a_value_supersedes_pending_remote_validation() {
        let backend = Arc::new(FakeBackend::configured(1, vec![priority()]));
        let slow = AppSettings {
            validation_debounce_ms: 40,
            ..AppSettings::default()
        };
        let session = FormSession::new(backend.clone(), &slow);
        session.activate(Some(1)).await.expect("activate");

        let (pending, _) = tokio::join!(session.validate_remote(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            session.set_value("Priority", "High");
        });
        assert!(pending.is_none());
        assert!(session.snapshot().validation_summary.is_none());
        assert_eq!(backend.value_calls.load(Ordering::SeqCst), 0);

        let summary = session.validate_remote().await.expect("summary");
        assert!(summary.missing_required.is_empty());
        assert_eq!(summary.valid, 1);
        assert_eq!(session.snapshot().validation_summary, Some(summary));
    }

    #[tokio::test]
    async fn duplicate_dynamic_field_name_is_refused() {
        let backend = Arc::new(FakeBackend::configured(1, Vec::new()));
        let session = session(&backend);
        session.activate(Some(1)).await.expect("activate");
        let first = session.add_dynamic_field().expect("first");
        let second = session.add_dynamic_field().expect("second");
        let rename = |name: &str| FieldUpdate {
            name: Some(name.to_string()),
            ..FieldUpdate::default()
        };

        assert!(session.update_dynamic_field(&first, rename("Tag")));
        assert!(!session.update_dynamic_field(&second, rename("Tag")));
        session.add_dynamic_field().expect("third");
        session.persist_dynamic_fields().await.expect("persist");

        let names: Vec<String> = session
            .snapshot()
            .dynamic_fields
            .into_iter()
            .map(|field| field.name)
            .collect();
        assert_eq!(names, vec!["Tag".to_string(), String::new(), String::new()]);
        let reloaded = session.activate(Some(1)).await.expect("reload");
        assert_eq!(reloaded.dynamic_fields.len(), 3);
        assert_eq!(reloaded.dynamic_fields[0].name, "Tag");
        assert_eq!(reloaded.dynamic_fields[1].id, second);
    }

    #[tokio::test]
    async fn dynamic_fields_need_an_active_configuration() {
        let backend = Arc::new(FakeBackend::default());
        let session = session(&backend);
        assert!(session.add_dynamic_field().is_none());
        assert!(!session.snapshot().can_add_dynamic_field);
    }

    #[tokio::test]
    async fn removing_or_renaming_prunes_missing_properties() {
        let backend = Arc::new(FakeBackend::configured(1, Vec::new()));
        let session = session(&backend);
        session.activate(Some(1)).await.expect("activate");
        session.set_content("hello");

        let tag = session.add_dynamic_field().expect("tag");
        let mood = session.add_dynamic_field().expect("mood");
        for (id, name) in [(&tag, "Tag"), (&mood, "Mood")] {
            assert!(session.update_dynamic_field(
                id,
                FieldUpdate {
                    name: Some(name.to_string()),
                    value: Some(PropertyValue::Text("x".to_string())),
                    ..FieldUpdate::default()
                }
            ));
        }

        let result = session.submit().await;
        assert_eq!(result.missing_properties, vec!["Tag".to_string(), "Mood".to_string()]);
        assert!(backend.chat_calls.lock().expect("lock").is_empty());
        assert_eq!(session.progress().phase, SubmissionPhase::Idle);
        assert_eq!(session.progress().progress, 0);

        assert!(session.remove_dynamic_field(&tag));
        assert!(!session.remove_dynamic_field("unknown"));
        assert_eq!(session.snapshot().missing_properties, vec!["Mood".to_string()]);

        session.update_dynamic_field(
            &mood,
            FieldUpdate {
                name: Some("Feeling".to_string()),
                ..FieldUpdate::default()
            },
        );
        assert!(session.snapshot().missing_properties.is_empty());
        assert_eq!(session.snapshot().content, "hello");
    }

    #[tokio::test]
    async fn submit_without_configuration_is_rejected_locally() {
        let backend = Arc::new(FakeBackend::default());
        let session = session(&backend);
        session.set_content("hello");

        let result = session.submit().await;
        assert!(!result.success);
        assert!(result.error.expect("error").contains("not configured"));
        assert!(backend.chat_calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn required_property_blocks_submission() {
        let backend = Arc::new(FakeBackend::configured(1, vec![priority()]));
        let session = session(&backend);
        session.activate(Some(1)).await.expect("activate");
        session.set_content("hello");

        let result = session.submit().await;
        assert!(!result.success);
        assert!(result.error.expect("error").contains("Priority"));
        assert!(backend.chat_calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn successful_submission_resets_the_form() {
        let backend = Arc::new(FakeBackend::configured(1, Vec::new()));
        backend.live_names.lock().expect("lock").push("Tag".to_string());
        let session = session(&backend);
        session.activate(Some(1)).await.expect("activate");
        session.set_content("User: what is rust?\nAssistant: a language");
        session.set_date(Some("2025-01-02".to_string()));
        let tag = session.add_dynamic_field().expect("field");
        session.update_dynamic_field(
            &tag,
            FieldUpdate {
                name: Some("Tag".to_string()),
                value: Some(PropertyValue::Text("rust".to_string())),
                ..FieldUpdate::default()
            },
        );

        let mut progress = session.subscribe_progress();
        let result = session.submit().await;
        assert!(result.success, "{:?}", result.error);
        assert!(progress.has_changed().expect("sender alive"));
        assert_eq!(progress.borrow_and_update().progress, 0);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.content, "");
        assert_eq!(snapshot.date, None);
        assert_eq!(snapshot.progress.progress, 0);
        assert_eq!(snapshot.dynamic_fields.len(), 1);
        assert_eq!(snapshot.dynamic_fields[0].name, "Tag");
        assert!(snapshot.dynamic_fields[0].value.is_empty());
    }

    #[tokio::test]
    async fn dynamic_field_shapes_persist_without_values() {
        let backend = Arc::new(FakeBackend::configured(1, Vec::new()));
        let session = session(&backend);
        session.activate(Some(1)).await.expect("activate");
        let id = session.add_dynamic_field().expect("field");
        session.update_dynamic_field(
            &id,
            FieldUpdate {
                name: Some("Source".to_string()),
                field_type: Some(PropertyType::Url),
                value: Some(PropertyValue::Text("https://example.com".to_string())),
            },
        );

        session.persist_dynamic_fields().await.expect("persist");
        let saved = backend.saved_dynamic_fields.lock().expect("lock");
        assert_eq!(saved[0].config_id, Some(1));
        assert_eq!(saved[0].dynamic_fields[0].name, "Source");
        assert_eq!(saved[0].dynamic_fields[0].field_type, PropertyType::Url);
    }
}
