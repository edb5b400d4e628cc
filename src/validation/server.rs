use super::local::looks_like_url;
use crate::models::{FieldValidation, NumberFormat, PropertyDefinition, PropertyType, PropertyValue, PropertyValues};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

const CHECKBOX_WORDS: [&str; 8] = ["true", "1", "yes", "on", "false", "0", "no", "off"];

/// Backend-side value check against the live schema. Stricter than the local
/// validator about dates, checkboxes and phone numbers.
pub fn validate_value(property: &PropertyDefinition, value: &PropertyValue) -> FieldValidation {
    let name = &property.name;
    if is_absent(value) {
        return if property.required {
            FieldValidation::invalid(format!("Property '{}' is required", name))
        } else {
            FieldValidation::ok()
        };
    }

    match (&property.property_type, value) {
        (PropertyType::Select, PropertyValue::Text(choice)) => {
            if property.options.is_empty() || property.options.contains(choice) {
                FieldValidation::ok()
            } else {
                FieldValidation::invalid(format!(
                    "Value '{}' is not a valid option for '{}'. Valid options: {}",
                    choice,
                    name,
                    property.options.join(", ")
                ))
            }
        }
        (PropertyType::Select, _) => {
            FieldValidation::invalid(format!("Invalid value type for select property '{}'", name))
        }
        (PropertyType::MultiSelect, PropertyValue::Text(_) | PropertyValue::Multi(_)) => {
            if property.options.is_empty() {
                return FieldValidation::ok();
            }
            let invalid: Vec<String> = value
                .items()
                .into_iter()
                .filter(|item| !property.options.contains(item))
                .collect();
            if invalid.is_empty() {
                FieldValidation::ok()
            } else {
                FieldValidation::invalid(format!(
                    "Invalid options for '{}': {}. Valid options: {}",
                    name,
                    invalid.join(", "),
                    property.options.join(", ")
                ))
            }
        }
        (PropertyType::MultiSelect, _) => FieldValidation::invalid(format!(
            "Invalid value type for multi_select property '{}'. Expected list or comma-separated string",
            name
        )),
        (PropertyType::Number, _) => validate_number(property, value),
        (PropertyType::Date, PropertyValue::Text(raw)) => {
            if parses_as_date(raw) {
                FieldValidation::ok()
            } else {
                FieldValidation::invalid(format!("Invalid date format for '{}'. Expected YYYY-MM-DD", name))
            }
        }
        (PropertyType::Date, _) => FieldValidation::invalid(format!("Invalid value type for date property '{}'", name)),
        (PropertyType::Checkbox, PropertyValue::Checkbox(_)) => FieldValidation::ok(),
        (PropertyType::Checkbox, PropertyValue::Text(raw))
            if CHECKBOX_WORDS.contains(&raw.trim().to_ascii_lowercase().as_str()) =>
        {
            FieldValidation::ok()
        }
        (PropertyType::Checkbox, _) => FieldValidation::invalid(format!(
            "Invalid value for checkbox '{}'. Expected boolean or 'true'/'false'",
            name
        )),
        (PropertyType::Url, PropertyValue::Text(raw)) => {
            if looks_like_url(raw) {
                FieldValidation::ok()
            } else {
                FieldValidation::invalid(format!("Invalid URL format for '{}'", name))
            }
        }
        (PropertyType::Url, _) => FieldValidation::invalid(format!("Invalid value type for URL property '{}'", name)),
        (PropertyType::Email, PropertyValue::Text(raw)) => {
            let valid = raw
                .split_once('@')
                .is_some_and(|(_, domain)| domain.split('@').next().is_some_and(|host| host.contains('.')));
            if valid {
                FieldValidation::ok()
            } else {
                FieldValidation::invalid(format!("Invalid email format for '{}'", name))
            }
        }
        (PropertyType::Email, _) => {
            FieldValidation::invalid(format!("Invalid value type for email property '{}'", name))
        }
        (PropertyType::PhoneNumber, PropertyValue::Text(raw)) => {
            if raw.chars().filter(char::is_ascii_digit).count() >= 7 {
                FieldValidation::ok()
            } else {
                FieldValidation::invalid(format!("Invalid phone number format for '{}'", name))
            }
        }
        (PropertyType::PhoneNumber, _) => {
            FieldValidation::invalid(format!("Invalid value type for phone_number property '{}'", name))
        }
        (PropertyType::RichText | PropertyType::Title, PropertyValue::Text(_) | PropertyValue::Number(_)) => {
            FieldValidation::ok()
        }
        (PropertyType::RichText | PropertyType::Title, _) => {
            FieldValidation::invalid(format!("Invalid value type for text property '{}'", name))
        }
        _ => FieldValidation::ok(),
    }
}

/// Validates every submitted value. Names absent from the schema are invalid.
pub fn validate_batch(
    definitions: &[PropertyDefinition],
    values: &PropertyValues,
) -> BTreeMap<String, FieldValidation> {
    values
        .iter()
        .map(|(name, value)| {
            let result = match definitions.iter().find(|definition| &definition.name == name) {
                Some(definition) => validate_value(definition, value),
                None => FieldValidation::invalid(format!("Property '{}' not found in database", name)),
            };
            (name.clone(), result)
        })
        .collect()
}

/// Only a missing string or list counts as absent here; `false` is a value.
fn is_absent(value: &PropertyValue) -> bool {
    match value {
        PropertyValue::Text(text) => text.is_empty(),
        PropertyValue::Multi(items) => items.is_empty(),
        _ => false,
    }
}

fn validate_number(property: &PropertyDefinition, value: &PropertyValue) -> FieldValidation {
    let number = match value {
        PropertyValue::Number(number) => Some(*number),
        PropertyValue::Text(text) => text.trim().parse::<f64>().ok().filter(|number| number.is_finite()),
        _ => None,
    };
    let Some(number) = number else {
        return FieldValidation::invalid(format!("Value for '{}' must be a valid number", property.name));
    };
    if property.format == Some(NumberFormat::Percent) && !(0.0..=100.0).contains(&number) {
        return FieldValidation::invalid(format!(
            "Percentage value for '{}' must be between 0 and 100",
            property.name
        ));
    }
    FieldValidation::ok()
}

fn parses_as_date(raw: &str) -> bool {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
        || ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(raw, format).is_ok())
}

#[cfg(test)]
mod tests {
    use super::{validate_batch, validate_value};
    use crate::models::{NumberFormat, PropertyDefinition, PropertyType, PropertyValue, PropertyValues};

    fn text(value: &str) -> PropertyValue {
        PropertyValue::Text(value.to_string())
    }

    #[test]
    fn dates_must_match_supported_formats() {
        let date = PropertyDefinition::new("Due", PropertyType::Date);
        assert!(validate_value(&date, &text("2024-02-29")).valid);
        assert!(validate_value(&date, &text("2024-02-29T08:30:00")).valid);
        assert!(validate_value(&date, &text("2024-02-29 08:30:00")).valid);
        assert!(!validate_value(&date, &text("2024-02-30")).valid);
        assert!(!validate_value(&date, &text("2024-02-29T08:30")).valid);
        assert!(!validate_value(&date, &PropertyValue::Number(1.0)).valid);
    }

    #[test]
    fn checkbox_accepts_booleans_and_words() {
        let checkbox = PropertyDefinition::new("Done", PropertyType::Checkbox);
        assert!(validate_value(&checkbox, &PropertyValue::Checkbox(false)).valid);
        assert!(validate_value(&checkbox, &text("Off")).valid);
        assert!(!validate_value(&checkbox, &text("maybe")).valid);
        assert!(!validate_value(&checkbox, &PropertyValue::Number(1.0)).valid);
    }

    #[test]
    fn phone_numbers_need_seven_digits() {
        let phone = PropertyDefinition::new("Phone", PropertyType::PhoneNumber);
        assert!(validate_value(&phone, &text("+33 1 23 45 67 89")).valid);
        assert!(!validate_value(&phone, &text("12-34")).valid);
    }

    #[test]
    fn required_and_numeric_rules() {
        let score = PropertyDefinition::new("Score", PropertyType::Number)
            .with_format(NumberFormat::Percent)
            .required();
        assert_eq!(
            validate_value(&score, &text("")).error.as_deref(),
            Some("Property 'Score' is required")
        );
        assert!(validate_value(&score, &PropertyValue::Number(99.0)).valid);
        assert!(!validate_value(&score, &text("101")).valid);
        assert!(!validate_value(&score, &text("ten")).valid);
    }

    #[test]
    fn batch_flags_unknown_properties() {
        let definitions = vec![
            PropertyDefinition::new("Priority", PropertyType::Select).with_options(["Low", "High"]),
            PropertyDefinition::new("Email", PropertyType::Email),
        ];
        let mut values = PropertyValues::new();
        values.insert("Priority".to_string(), text("Mid"));
        values.insert("Email".to_string(), text("me@example.com"));
        values.insert("Ghost".to_string(), text("x"));

        let results = validate_batch(&definitions, &values);
        assert_eq!(results.len(), 3);
        assert!(results["Email"].valid);
        assert!(results["Priority"]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("Valid options: Low, High")));
        assert_eq!(
            results["Ghost"].error.as_deref(),
            Some("Property 'Ghost' not found in database")
        );
    }
}
