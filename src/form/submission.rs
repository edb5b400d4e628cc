use super::backend::BackendApi;
use super::translate::translate_backend_error;
use crate::errors::{AppError, AppResult};
use crate::models::{
    ChatPayload, DynamicField, PropertyDefinition, PropertyProbe, PropertyValue, PropertyValues, SubmissionPhase,
    SubmissionProgress, SubmissionResult, ValidatePropertiesPayload,
};
use crate::validation::validate_local;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;

pub const PROGRESS_STARTED: u8 = 10;
pub const PROGRESS_CHECKING_FIELDS: u8 = 30;
pub const PROGRESS_ASSEMBLING: u8 = 40;
pub const PROGRESS_ASSEMBLED: u8 = 60;
pub const PROGRESS_AWAITING_RESPONSE: u8 = 90;
pub const PROGRESS_DONE: u8 = 100;

/// Phase and progress of the form's single submission slot.
///
/// `try_begin` moves the slot out of `Idle` with a compare-and-swap, so a
/// second submit while one is in flight is rejected instead of queued.
#[derive(Debug)]
pub struct SubmissionTracker {
    phase: AtomicU8,
    progress: AtomicU8,
    sender: watch::Sender<SubmissionProgress>,
}

impl Default for SubmissionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SubmissionProgress {
            phase: SubmissionPhase::Idle,
            progress: 0,
        });
        Self {
            phase: AtomicU8::new(SubmissionPhase::Idle.as_u8()),
            progress: AtomicU8::new(0),
            sender,
        }
    }

    pub fn current(&self) -> SubmissionProgress {
        SubmissionProgress {
            phase: SubmissionPhase::from_u8(self.phase.load(Ordering::SeqCst)),
            progress: self.progress.load(Ordering::SeqCst),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmissionProgress> {
        self.sender.subscribe()
    }

    pub fn try_begin(&self) -> AppResult<SubmissionGuard<'_>> {
        self.phase
            .compare_exchange(
                SubmissionPhase::Idle.as_u8(),
                SubmissionPhase::Validating.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| AppError::Submission("A submission is already in progress".to_string()))?;
        let guard = SubmissionGuard { tracker: self };
        guard.advance(SubmissionPhase::Validating, PROGRESS_STARTED);
        Ok(guard)
    }

    fn publish(&self) {
        self.sender.send_replace(self.current());
    }

    fn reset(&self) {
        self.progress.store(0, Ordering::SeqCst);
        self.phase.store(SubmissionPhase::Idle.as_u8(), Ordering::SeqCst);
        self.publish();
    }
}

/// Holds the submission slot. Dropping it returns the tracker to `Idle`
/// with progress 0, whichever way the submission ended.
#[derive(Debug)]
pub struct SubmissionGuard<'a> {
    tracker: &'a SubmissionTracker,
}

impl SubmissionGuard<'_> {
    /// Progress never moves backwards within one submission.
    pub fn advance(&self, phase: SubmissionPhase, progress: u8) {
        self.tracker.progress.fetch_max(progress.min(PROGRESS_DONE), Ordering::SeqCst);
        self.tracker.phase.store(phase.as_u8(), Ordering::SeqCst);
        self.tracker.publish();
    }
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.tracker.reset();
    }
}

/// Everything a submission reads from the form, captured under the session
/// lock before the first await.
#[derive(Debug, Clone)]
pub struct SubmissionDraft {
    pub config_id: i64,
    pub content: String,
    pub date: Option<String>,
    pub values: PropertyValues,
    pub visible: Vec<PropertyDefinition>,
    pub dynamic_fields: Vec<DynamicField>,
}

/// How the session should update itself once the submission is over.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReport {
    pub result: SubmissionResult,
    /// Replacement for the session's missing-property diagnostics, when the
    /// submission learned something about them.
    pub missing_properties: Option<Vec<String>>,
    pub reset_form: bool,
}

impl SubmissionReport {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            result: SubmissionResult::failed(error),
            missing_properties: None,
            reset_form: false,
        }
    }

    fn missing(error: String, missing: Vec<String>) -> Self {
        Self {
            result: SubmissionResult::missing(error, missing.clone()),
            missing_properties: Some(missing),
            reset_form: false,
        }
    }
}

/// Runs validation, existence checks, payload assembly and the create call.
/// The caller applies the report and then drops `guard`.
pub async fn run_submission(
    backend: &dyn BackendApi,
    guard: &SubmissionGuard<'_>,
    draft: SubmissionDraft,
) -> SubmissionReport {
    if draft.content.trim().is_empty() {
        return SubmissionReport::failed(translate_backend_error(None));
    }

    if let Some(error) = local_errors(&draft) {
        tracing::info!(config_id = draft.config_id, "submission blocked by local validation");
        return SubmissionReport::failed(translate_backend_error(Some(&error)));
    }

    guard.advance(SubmissionPhase::Validating, PROGRESS_CHECKING_FIELDS);
    let probes: Vec<PropertyProbe> = draft
        .dynamic_fields
        .iter()
        .filter(|field| !field.name.trim().is_empty())
        .map(|field| PropertyProbe {
            name: field.name.trim().to_string(),
            property_type: field.field_type.clone(),
        })
        .collect();
    let mut checked_missing = None;
    if !probes.is_empty() {
        let payload = ValidatePropertiesPayload {
            properties: probes.clone(),
            config_id: Some(draft.config_id),
        };
        let existence = match backend.validate_properties(payload).await {
            Ok(response) => response.validation,
            Err(error) => {
                tracing::warn!(config_id = draft.config_id, error = %error, "dynamic field existence check failed");
                return SubmissionReport::failed(format!(
                    "Could not verify dynamic properties: {}",
                    translate_backend_error(Some(error.message()))
                ));
            }
        };
        let missing: Vec<String> = probes
            .iter()
            .filter(|probe| existence.get(&probe.name).map_or(true, |entry| !entry.exists))
            .map(|probe| probe.name.clone())
            .collect();
        if !missing.is_empty() {
            let error = format!("The following properties do not exist in Notion: {}", missing.join(", "));
            return SubmissionReport::missing(translate_backend_error(Some(&error)), missing);
        }
        checked_missing = Some(Vec::new());
    }

    guard.advance(SubmissionPhase::Submitting, PROGRESS_ASSEMBLING);
    let additional_properties = assemble_values(&draft.values, &draft.dynamic_fields);
    guard.advance(SubmissionPhase::Submitting, PROGRESS_ASSEMBLED);

    let payload = ChatPayload {
        content: draft.content,
        date: draft.date.filter(|date| !date.trim().is_empty()),
        additional_properties,
        config_id: Some(draft.config_id),
    };
    let response = match backend.submit_chat(payload).await {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(config_id = draft.config_id, error = %error, "chat submission failed");
            return SubmissionReport {
                missing_properties: checked_missing,
                ..SubmissionReport::failed(translate_backend_error(Some(error.message())))
            };
        }
    };
    guard.advance(SubmissionPhase::Finalizing, PROGRESS_AWAITING_RESPONSE);

    if !response.missing_properties.is_empty() {
        let error = format!(
            "The following properties do not exist in Notion: {}",
            response.missing_properties.join(", ")
        );
        return SubmissionReport::missing(error, response.missing_properties);
    }

    guard.advance(SubmissionPhase::Finalizing, PROGRESS_DONE);
    tracing::info!(
        config_id = draft.config_id,
        page_id = response.notion_page_id.as_deref().unwrap_or_default(),
        "chat submitted"
    );
    SubmissionReport {
        result: SubmissionResult::succeeded(
            response
                .message
                .unwrap_or_else(|| "Chat sent to Notion successfully".to_string()),
        ),
        missing_properties: Some(Vec::new()),
        reset_form: true,
    }
}

/// Non-empty property values, then non-empty named dynamic field values on
/// top. Dynamic fields win on a name collision.
pub fn assemble_values(values: &PropertyValues, dynamic_fields: &[DynamicField]) -> PropertyValues {
    let mut merged: PropertyValues = values
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    for field in dynamic_fields {
        let name = field.name.trim();
        if name.is_empty() || field.value.is_empty() {
            continue;
        }
        merged.insert(name.to_string(), field.value.clone());
    }
    merged
}

fn local_errors(draft: &SubmissionDraft) -> Option<String> {
    let mut missing = Vec::new();
    let mut invalid = Vec::new();
    for definition in &draft.visible {
        let empty = PropertyValue::empty_for(&definition.property_type);
        let value = draft.values.get(&definition.name).unwrap_or(&empty);
        let result = validate_local(definition, value);
        if result.valid {
            continue;
        }
        if definition.required && value.is_empty() {
            missing.push(definition.name.clone());
        } else {
            invalid.push(format!(
                "{} ({})",
                definition.name,
                result.error.unwrap_or_default()
            ));
        }
    }

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("Required properties are missing: {}", missing.join(", ")));
    }
    if !invalid.is_empty() {
        parts.push(format!("Invalid property values: {}", invalid.join("; ")));
    }
    (!parts.is_empty()).then(|| parts.join(". "))
}
