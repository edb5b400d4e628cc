use crate::models::{DatabaseInfo, DatabaseStructure, NumberFormat, PropertyDefinition, PropertyType};
use serde_json::Value;

/// The parts of a Notion database object the app works with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseSchema {
    pub id: String,
    pub title: String,
    pub description: String,
    pub properties: Vec<PropertyDefinition>,
}

impl DatabaseSchema {
    pub fn find(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|property| property.name == name)
    }

    pub fn title_property(&self) -> Option<&str> {
        self.first_of(&PropertyType::Title)
    }

    pub fn date_property(&self) -> Option<&str> {
        self.first_of(&PropertyType::Date)
    }

    /// Properties the user may fill in; title and date come from the transcript.
    pub fn form_properties(&self) -> Vec<PropertyDefinition> {
        self.properties
            .iter()
            .filter(|property| !property.property_type.is_managed())
            .cloned()
            .collect()
    }

    /// Every property with metadata. Only the title is required by Notion.
    pub fn structure(&self) -> DatabaseStructure {
        let properties = self
            .properties
            .iter()
            .cloned()
            .map(|mut property| {
                property.required = property.property_type == PropertyType::Title;
                property
            })
            .collect();
        DatabaseStructure {
            database_info: DatabaseInfo {
                title: self.title.clone(),
                description: self.description.clone(),
            },
            properties,
        }
    }

    fn first_of(&self, property_type: &PropertyType) -> Option<&str> {
        self.properties
            .iter()
            .find(|property| &property.property_type == property_type)
            .map(|property| property.name.as_str())
    }
}

/// Extracts a [`DatabaseSchema`] from a raw `GET /databases/{id}` response.
pub fn parse_database(raw: &Value) -> DatabaseSchema {
    let properties = raw
        .get("properties")
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .map(|(name, data)| parse_property(name, data))
                .collect()
        })
        .unwrap_or_default();

    DatabaseSchema {
        id: raw.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
        title: plain_text(raw.get("title")),
        description: plain_text(raw.get("description")),
        properties,
    }
}

fn parse_property(name: &str, data: &Value) -> PropertyDefinition {
    let type_name = data.get("type").and_then(Value::as_str).unwrap_or_default();
    let property_type = PropertyType::parse(type_name);
    let config = data.get(type_name);

    let options = match property_type {
        PropertyType::Select | PropertyType::MultiSelect => config
            .and_then(|config| config.get("options"))
            .and_then(Value::as_array)
            .map(|options| {
                options
                    .iter()
                    .filter_map(|option| option.get("name").and_then(Value::as_str))
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let format = match property_type {
        PropertyType::Number => config
            .and_then(|config| config.get("format"))
            .and_then(Value::as_str)
            .map(|format| NumberFormat::from(format.to_string())),
        _ => None,
    };

    PropertyDefinition {
        name: name.to_string(),
        property_type,
        options,
        required: false,
        format,
        id: data.get("id").and_then(Value::as_str).map(ToString::to_string),
    }
}

fn plain_text(rich_text: Option<&Value>) -> String {
    rich_text
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| {
                    part.get("plain_text")
                        .or_else(|| part.get("text").and_then(|text| text.get("content")))
                        .and_then(Value::as_str)
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::parse_database;
    use crate::models::{NumberFormat, PropertyType};
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "object": "database",
            "id": "db-1",
            "title": [{ "plain_text": "Chat " }, { "plain_text": "Log" }],
            "description": [{ "text": { "content": "Saved chats" } }],
            "properties": {
                "Name": { "id": "title", "type": "title", "title": {} },
                "Created": { "id": "a1", "type": "date", "date": {} },
                "Priority": {
                    "id": "b2",
                    "type": "select",
                    "select": { "options": [{ "name": "Low" }, { "name": "High" }] }
                },
                "Score": { "id": "c3", "type": "number", "number": { "format": "percent" } },
                "Owner": { "id": "d4", "type": "people", "people": {} }
            }
        })
    }

    #[test]
    fn parses_properties_with_metadata() {
        let schema = parse_database(&sample());
        assert_eq!(schema.id, "db-1");
        assert_eq!(schema.title, "Chat Log");
        assert_eq!(schema.description, "Saved chats");
        assert_eq!(schema.title_property(), Some("Name"));
        assert_eq!(schema.date_property(), Some("Created"));

        let priority = schema.find("Priority").expect("priority");
        assert_eq!(priority.property_type, PropertyType::Select);
        assert_eq!(priority.options, vec!["Low".to_string(), "High".to_string()]);
        assert_eq!(schema.find("Score").and_then(|p| p.format.clone()), Some(NumberFormat::Percent));
    }

    #[test]
    fn form_properties_skip_title_and_date() {
        let schema = parse_database(&sample());
        let names: Vec<_> = schema.form_properties().into_iter().map(|p| p.name).collect();
        assert!(!names.contains(&"Name".to_string()));
        assert!(!names.contains(&"Created".to_string()));
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn structure_marks_title_required() {
        let structure = parse_database(&sample()).structure();
        assert_eq!(structure.database_info.title, "Chat Log");
        let required: Vec<_> = structure
            .properties
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(required, vec!["Name"]);
    }

    #[test]
    fn missing_properties_object_yields_empty_schema() {
        let schema = parse_database(&json!({ "id": "x" }));
        assert!(schema.properties.is_empty());
        assert_eq!(schema.title_property(), None);
    }
}
