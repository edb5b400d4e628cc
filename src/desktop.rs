use crate::form::{translate_backend_error, FieldUpdate, FormSession, FormSnapshot};
use crate::models::{
    Configuration, FieldValidation, PropertyType, PropertyValue, SaveConfigPayload, SaveConfigResponse,
    SubmissionProgress, SubmissionResult, UpdateConfigPayload, ValidationSummary,
};
use crate::shell::{self, EmbeddedBackend, RuntimeConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tauri::{Emitter, Manager, RunEvent};

#[derive(Clone)]
struct AppState {
    session: Arc<FormSession>,
    data_dir: PathBuf,
    backend: Arc<Mutex<Option<EmbeddedBackend>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DynamicFieldPatch {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    field_type: Option<PropertyType>,
    #[serde(default)]
    value: Option<PropertyValue>,
}

impl DynamicFieldPatch {
    fn changes_shape(&self) -> bool {
        self.name.is_some() || self.field_type.is_some()
    }
}

impl From<DynamicFieldPatch> for FieldUpdate {
    fn from(patch: DynamicFieldPatch) -> Self {
        Self {
            name: patch.name,
            field_type: patch.field_type,
            value: patch.value,
        }
    }
}

#[tauri::command]
fn get_user_data_path(state: tauri::State<'_, AppState>) -> String {
    state.data_dir.display().to_string()
}

#[tauri::command]
fn get_form_state(state: tauri::State<'_, AppState>) -> FormSnapshot {
    state.session.snapshot()
}

#[tauri::command]
async fn activate_config(state: tauri::State<'_, AppState>, config_id: Option<i64>) -> Result<FormSnapshot, String> {
    state.session.activate(config_id).await.map_err(to_client_error)
}

#[tauri::command]
async fn refresh_properties(state: tauri::State<'_, AppState>) -> Result<FormSnapshot, String> {
    Ok(state.session.refresh_schema().await)
}

#[tauri::command]
fn set_property_selected(
    state: tauri::State<'_, AppState>,
    name: String,
    selected: bool,
) -> Result<FormSnapshot, String> {
    state
        .session
        .set_property_selected(&name, selected)
        .map_err(to_client_error)?;
    Ok(state.session.snapshot())
}

#[tauri::command]
async fn save_selected_properties(state: tauri::State<'_, AppState>) -> Result<String, String> {
    state.session.save_selected_properties().await.map_err(to_client_error)
}

#[tauri::command]
fn set_property_value(state: tauri::State<'_, AppState>, name: String, value: String) -> FieldValidation {
    state.session.set_value(&name, &value)
}

#[tauri::command]
async fn validate_property_values(state: tauri::State<'_, AppState>) -> Result<Option<ValidationSummary>, String> {
    Ok(state.session.validate_remote().await)
}

#[tauri::command]
fn get_validation_summary(state: tauri::State<'_, AppState>) -> ValidationSummary {
    state.session.summary()
}

#[tauri::command]
async fn add_dynamic_field(state: tauri::State<'_, AppState>) -> Result<Option<String>, String> {
    let Some(id) = state.session.add_dynamic_field() else {
        return Ok(None);
    };
    state.session.persist_dynamic_fields().await.map_err(to_client_error)?;
    Ok(Some(id))
}

#[tauri::command]
async fn remove_dynamic_field(state: tauri::State<'_, AppState>, id: String) -> Result<bool, String> {
    if !state.session.remove_dynamic_field(&id) {
        return Ok(false);
    }
    state.session.persist_dynamic_fields().await.map_err(to_client_error)?;
    Ok(true)
}

#[tauri::command]
async fn update_dynamic_field(
    state: tauri::State<'_, AppState>,
    id: String,
    patch: DynamicFieldPatch,
) -> Result<bool, String> {
    let persist = patch.changes_shape();
    if !state.session.update_dynamic_field(&id, patch.into()) {
        return Ok(false);
    }
    if persist {
        state.session.persist_dynamic_fields().await.map_err(to_client_error)?;
    }
    Ok(true)
}

#[tauri::command]
fn reset_dynamic_field_values(state: tauri::State<'_, AppState>) -> FormSnapshot {
    state.session.reset_dynamic_values();
    state.session.snapshot()
}

#[tauri::command]
fn set_chat_content(state: tauri::State<'_, AppState>, content: String) {
    state.session.set_content(content);
}

#[tauri::command]
fn set_chat_date(state: tauri::State<'_, AppState>, date: Option<String>) {
    state.session.set_date(date);
}

#[tauri::command]
async fn submit_chat(state: tauri::State<'_, AppState>) -> Result<SubmissionResult, String> {
    Ok(state.session.submit().await)
}

#[tauri::command]
fn get_submission_progress(state: tauri::State<'_, AppState>) -> SubmissionProgress {
    state.session.progress()
}

#[tauri::command]
async fn list_configs(state: tauri::State<'_, AppState>) -> Result<Vec<Configuration>, String> {
    state.session.list_configs().await.map_err(to_client_error)
}

#[tauri::command]
async fn save_config(
    state: tauri::State<'_, AppState>,
    payload: SaveConfigPayload,
) -> Result<SaveConfigResponse, String> {
    state.session.save_config(payload).await.map_err(to_client_error)
}

#[tauri::command]
async fn create_config(state: tauri::State<'_, AppState>, payload: SaveConfigPayload) -> Result<Configuration, String> {
    state.session.create_config(payload).await.map_err(to_client_error)
}

#[tauri::command]
async fn update_config(
    state: tauri::State<'_, AppState>,
    id: i64,
    payload: UpdateConfigPayload,
) -> Result<Configuration, String> {
    state.session.update_config(id, payload).await.map_err(to_client_error)
}

#[tauri::command]
async fn select_config(state: tauri::State<'_, AppState>, id: i64) -> Result<FormSnapshot, String> {
    state.session.select_config(id).await.map_err(to_client_error)
}

#[tauri::command]
async fn delete_config(state: tauri::State<'_, AppState>, id: i64) -> Result<String, String> {
    state.session.delete_config(id).await.map_err(to_client_error)
}

pub fn run() {
    let app = tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .setup(|app| {
            let runtime = RuntimeConfig::from_env().map_err(|error| error.to_string())?;
            let app_data_dir = match &runtime.data_dir {
                Some(dir) => dir.clone(),
                None => app.path().app_data_dir().map_err(|error| error.to_string())?,
            };
            std::fs::create_dir_all(&app_data_dir).map_err(|error| error.to_string())?;
            shell::init_tracing(&app_data_dir, "chat-to-notion.log").map_err(|error| error.to_string())?;

            let launched = tauri::async_runtime::block_on(shell::launch_backend(
                app_data_dir.clone(),
                runtime.socket_addr(),
            ))
            .map_err(|error| error.to_string())?;
            tracing::info!(address = %launched.server.address(), "embedded backend started");

            let session = Arc::new(FormSession::new(launched.client, &launched.settings));
            let handle = app.handle().clone();

            tauri::async_runtime::spawn({
                let session = session.clone();
                async move {
                    if let Err(error) = session.activate(None).await {
                        tracing::warn!(error = %error, "initial configuration load failed");
                    }
                }
            });

            tauri::async_runtime::spawn({
                let mut progress = session.subscribe_progress();
                async move {
                    while progress.changed().await.is_ok() {
                        let current = *progress.borrow_and_update();
                        let _ = handle.emit("submission_progress", current);
                    }
                }
            });

            app.manage(AppState {
                session,
                data_dir: app_data_dir,
                backend: Arc::new(Mutex::new(Some(launched.server))),
            });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            get_user_data_path,
            get_form_state,
            activate_config,
            refresh_properties,
            set_property_selected,
            save_selected_properties,
            set_property_value,
            validate_property_values,
            get_validation_summary,
            add_dynamic_field,
            remove_dynamic_field,
            update_dynamic_field,
            reset_dynamic_field_values,
            set_chat_content,
            set_chat_date,
            submit_chat,
            get_submission_progress,
            list_configs,
            save_config,
            create_config,
            update_config,
            select_config,
            delete_config
        ])
        .build(tauri::generate_context!())
        .expect("failed to build tauri app");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            let Some(state) = handle.try_state::<AppState>() else {
                return;
            };
            let server = state.backend.lock().ok().and_then(|mut slot| slot.take());
            if let Some(server) = server {
                if let Err(error) = tauri::async_runtime::block_on(server.stop()) {
                    tracing::warn!(error = %error, "embedded backend did not stop cleanly");
                }
            }
        }
    });
}

fn to_client_error(error: crate::errors::AppError) -> String {
    translate_backend_error(Some(error.message()))
}
