use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_DYNAMIC_FIELDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum PropertyType {
    Title,
    #[default]
    RichText,
    Number,
    Select,
    MultiSelect,
    Date,
    Checkbox,
    Url,
    Email,
    PhoneNumber,
    Relation,
    Rollup,
    People,
    Files,
    Other(String),
}

impl PropertyType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Title => "title",
            Self::RichText => "rich_text",
            Self::Number => "number",
            Self::Select => "select",
            Self::MultiSelect => "multi_select",
            Self::Date => "date",
            Self::Checkbox => "checkbox",
            Self::Url => "url",
            Self::Email => "email",
            Self::PhoneNumber => "phone_number",
            Self::Relation => "relation",
            Self::Rollup => "rollup",
            Self::People => "people",
            Self::Files => "files",
            Self::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "title" => Self::Title,
            "rich_text" => Self::RichText,
            "number" => Self::Number,
            "select" => Self::Select,
            "multi_select" => Self::MultiSelect,
            "date" => Self::Date,
            "checkbox" => Self::Checkbox,
            "url" => Self::Url,
            "email" => Self::Email,
            "phone_number" => Self::PhoneNumber,
            "relation" => Self::Relation,
            "rollup" => Self::Rollup,
            "people" => Self::People,
            "files" => Self::Files,
            other => Self::Other(other.to_string()),
        }
    }

    /// Title and date are filled from the transcript itself, never from the form.
    pub fn is_managed(&self) -> bool {
        matches!(self, Self::Title | Self::Date)
    }
}

impl From<String> for PropertyType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<PropertyType> for String {
    fn from(value: PropertyType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NumberFormat {
    Number,
    Percent,
    Other(String),
}

impl From<String> for NumberFormat {
    fn from(value: String) -> Self {
        match value.as_str() {
            "number" => Self::Number,
            "percent" => Self::Percent,
            _ => Self::Other(value),
        }
    }
}

impl From<NumberFormat> for String {
    fn from(value: NumberFormat) -> Self {
        match value {
            NumberFormat::Number => "number".to_string(),
            NumberFormat::Percent => "percent".to_string(),
            NumberFormat::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<NumberFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl PropertyDefinition {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            options: Vec::new(),
            required: false,
            format: None,
            id: None,
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_format(mut self, format: NumberFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A property value as it travels between the form, the backend and Notion.
///
/// The wire shape is untagged (`"text"`, `42`, `true`, `["a", "b"]`); the
/// declared property type decides which variant raw input is converted into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Checkbox(bool),
    Number(f64),
    Multi(Vec<String>),
    Text(String),
}

impl Default for PropertyValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl PropertyValue {
    pub fn from_input(property_type: &PropertyType, raw: &str) -> Self {
        match property_type {
            PropertyType::Checkbox => Self::Checkbox(is_truthy(raw)),
            PropertyType::MultiSelect => Self::Multi(split_list(raw)),
            _ => Self::Text(raw.to_string()),
        }
    }

    pub fn empty_for(property_type: &PropertyType) -> Self {
        match property_type {
            PropertyType::Checkbox => Self::Checkbox(false),
            PropertyType::MultiSelect => Self::Multi(Vec::new()),
            _ => Self::Text(String::new()),
        }
    }

    /// Unchecked checkboxes count as empty, matching how the form filters values.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Checkbox(checked) => !checked,
            Self::Number(_) => false,
            Self::Multi(items) => items.iter().all(|item| item.trim().is_empty()),
            Self::Text(text) => text.trim().is_empty(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Checkbox(checked) => checked.to_string(),
            Self::Number(number) => number.to_string(),
            Self::Multi(items) => items.join(", "),
            Self::Text(text) => text.clone(),
        }
    }

    /// Elements of a multi-value. Text is split on commas.
    pub fn items(&self) -> Vec<String> {
        match self {
            Self::Multi(items) => items.iter().map(|item| item.trim().to_string()).collect(),
            Self::Text(text) => text.split(',').map(|item| item.trim().to_string()).collect(),
            other => vec![other.as_text()],
        }
    }
}

pub fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub type PropertyValues = BTreeMap<String, PropertyValue>;
pub type SelectedProperties = BTreeMap<String, bool>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: PropertyType,
    #[serde(default)]
    pub value: PropertyValue,
}

impl DynamicField {
    pub fn shape(&self) -> DynamicFieldShape {
        DynamicFieldShape {
            id: self.id.clone(),
            name: self.name.clone(),
            field_type: self.field_type.clone(),
        }
    }
}

/// The persisted part of a dynamic field. Values are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicFieldShape {
    #[serde(deserialize_with = "deserialize_field_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: PropertyType,
}

fn deserialize_field_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    match raw {
        serde_json::Value::String(value) => Ok(value),
        serde_json::Value::Number(value) => Ok(value.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid dynamic field id: {}", other))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub id: i64,
    pub label: Option<String>,
    pub database_id: String,
    pub database_title: Option<String>,
    pub title_property: Option<String>,
    pub date_property: Option<String>,
    pub is_active: bool,
    pub has_api_key: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub missing_properties: Vec<String>,
}

impl SubmissionResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            missing_properties: Vec::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            missing_properties: Vec::new(),
        }
    }

    pub fn missing(error: impl Into<String>, missing_properties: Vec<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            missing_properties,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionPhase {
    Idle,
    Validating,
    Submitting,
    Finalizing,
}

impl SubmissionPhase {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Validating => 1,
            Self::Submitting => 2,
            Self::Finalizing => 3,
        }
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Validating,
            2 => Self::Submitting,
            3 => Self::Finalizing,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionProgress {
    pub phase: SubmissionPhase,
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FieldValidation {
    pub fn ok() -> Self {
        Self { valid: true, error: None }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub missing_required: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SaveConfigPayload {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub database_id: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigPayload {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub database_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveConfigResponse {
    pub message: String,
    pub config_id: i64,
    pub title_property: String,
    pub date_property: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub config: Configuration,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigsResponse {
    pub configs: Vec<Configuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStatusResponse {
    pub configured: bool,
    #[serde(default)]
    pub config_id: Option<i64>,
    #[serde(default)]
    pub database_id: String,
    #[serde(default)]
    pub title_property: Option<String>,
    #[serde(default)]
    pub date_property: Option<String>,
    #[serde(default)]
    pub additional_properties: SelectedProperties,
    #[serde(default)]
    pub dynamic_fields: Vec<DynamicFieldShape>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigQuery {
    #[serde(default)]
    pub config_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PropertiesResponse {
    pub properties: Vec<PropertyDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DatabaseInfo {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseStructure {
    pub database_info: DatabaseInfo,
    pub properties: Vec<PropertyDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SavePropertiesPayload {
    #[serde(default)]
    pub additional_properties: SelectedProperties,
    #[serde(default)]
    pub config_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SaveDynamicFieldsPayload {
    #[serde(default)]
    pub dynamic_fields: Vec<DynamicFieldShape>,
    #[serde(default)]
    pub config_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyProbe {
    pub name: String,
    #[serde(rename = "type", default)]
    pub property_type: PropertyType,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePropertiesPayload {
    #[serde(default)]
    pub properties: Vec<PropertyProbe>,
    #[serde(default)]
    pub config_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyExistence {
    pub exists: bool,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExistenceResponse {
    pub validation: BTreeMap<String, PropertyExistence>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidateValuesPayload {
    #[serde(default)]
    pub property_values: PropertyValues,
    #[serde(default)]
    pub config_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValueValidationResponse {
    pub validation: BTreeMap<String, FieldValidation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub additional_properties: PropertyValues,
    #[serde(default)]
    pub config_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub notion_page_id: Option<String>,
    #[serde(default)]
    pub date_sent: bool,
    #[serde(default)]
    pub missing_properties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub notion_api_base_url: String,
    pub notion_version: String,
    pub request_timeout_secs: u64,
    pub validation_debounce_ms: u64,
    pub max_dynamic_fields: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            notion_api_base_url: "https://api.notion.com/v1".to_string(),
            notion_version: "2022-06-28".to_string(),
            request_timeout_secs: 30,
            validation_debounce_ms: 500,
            max_dynamic_fields: DEFAULT_MAX_DYNAMIC_FIELDS,
        }
    }
}
