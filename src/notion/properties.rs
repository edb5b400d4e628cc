use super::schema::DatabaseSchema;
use crate::content::{parse_iso_date, ParsedChat};
use crate::models::{is_truthy, PropertyDefinition, PropertyType, PropertyValue, PropertyValues};
use serde_json::{json, Map, Value};

/// Page properties ready for `POST /pages`, plus what could not be mapped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageProperties {
    pub properties: Map<String, Value>,
    /// Date property used for this page, detected from the schema when the
    /// configuration did not know one yet.
    pub date_property: Option<String>,
    pub date_detected: bool,
    /// Non-empty values whose names are absent from the database schema.
    pub missing_properties: Vec<String>,
}

pub fn build_page_properties(
    schema: &DatabaseSchema,
    title_property: &str,
    date_property: Option<&str>,
    parsed: &ParsedChat,
    values: &PropertyValues,
) -> PageProperties {
    let mut properties = Map::new();
    properties.insert(
        title_property.to_string(),
        json!({ "title": [{ "text": { "content": parsed.title } }] }),
    );

    let (date_property, date_detected) = match date_property {
        Some(name) => (Some(name.to_string()), false),
        None => match schema.date_property() {
            Some(name) => (Some(name.to_string()), true),
            None => (None, false),
        },
    };
    if let Some(name) = &date_property {
        properties.insert(name.clone(), json!({ "date": { "start": parsed.date } }));
    }

    let mut missing_properties = Vec::new();
    for (name, value) in values {
        if value.is_empty() {
            continue;
        }
        match schema.find(name) {
            Some(definition) => {
                if let Some(formatted) = format_property(definition, value) {
                    properties.insert(name.clone(), formatted);
                }
            }
            None => missing_properties.push(name.clone()),
        }
    }

    PageProperties {
        properties,
        date_property,
        date_detected,
        missing_properties,
    }
}

/// Formats one value as a Notion property object. Returns `None` when the
/// value cannot be represented, e.g. a select value outside the option list.
pub fn format_property(definition: &PropertyDefinition, value: &PropertyValue) -> Option<Value> {
    if value.is_empty() {
        return None;
    }

    match &definition.property_type {
        PropertyType::Title => Some(json!({ "title": [text_object(&value.as_text())] })),
        PropertyType::Number => number_of(value).map(|number| json!({ "number": number })),
        PropertyType::Select => {
            let choice = value.as_text().trim().to_string();
            definition
                .options
                .contains(&choice)
                .then(|| json!({ "select": { "name": choice } }))
        }
        PropertyType::MultiSelect => {
            let chosen: Vec<Value> = value
                .items()
                .into_iter()
                .filter(|item| definition.options.contains(item))
                .map(|item| json!({ "name": item }))
                .collect();
            (!chosen.is_empty()).then(|| json!({ "multi_select": chosen }))
        }
        PropertyType::Checkbox => {
            let checked = match value {
                PropertyValue::Checkbox(checked) => *checked,
                PropertyValue::Number(number) => *number != 0.0,
                other => is_truthy(&other.as_text()),
            };
            Some(json!({ "checkbox": checked }))
        }
        PropertyType::Date => parse_iso_date(&value.as_text())
            .map(|date| json!({ "date": { "start": date.format("%Y-%m-%d").to_string() } })),
        PropertyType::Url => Some(json!({ "url": value.as_text() })),
        PropertyType::Email => Some(json!({ "email": value.as_text() })),
        PropertyType::PhoneNumber => Some(json!({ "phone_number": value.as_text() })),
        PropertyType::People => Some(json!({ "people": [{ "id": value.as_text() }] })),
        PropertyType::Relation => Some(json!({ "relation": [{ "id": value.as_text() }] })),
        PropertyType::Files | PropertyType::Rollup => None,
        PropertyType::RichText | PropertyType::Other(_) => {
            Some(json!({ "rich_text": [text_object(&value.as_text())] }))
        }
    }
}

fn number_of(value: &PropertyValue) -> Option<f64> {
    match value {
        PropertyValue::Number(number) => Some(*number),
        PropertyValue::Text(text) => text.trim().parse::<f64>().ok().filter(|number| number.is_finite()),
        _ => None,
    }
}

fn text_object(content: &str) -> Value {
    json!({ "type": "text", "text": { "content": content } })
}
