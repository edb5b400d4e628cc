use crate::models::{FieldValidation, NumberFormat, PropertyDefinition, PropertyType, PropertyValue};
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("valid date regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Synchronous per-field check used for inline feedback. Never touches the
/// network.
///
/// A required property with an empty value fails immediately; otherwise the
/// declared type decides which structural rule applies.
pub fn validate_local(property: &PropertyDefinition, value: &PropertyValue) -> FieldValidation {
    if value.is_empty() {
        return if property.required {
            FieldValidation::invalid("This field is required")
        } else {
            FieldValidation::ok()
        };
    }

    match property.property_type {
        PropertyType::Select => check_select(property, value),
        PropertyType::MultiSelect => check_multi_select(property, value),
        PropertyType::Number => check_number(property, value),
        PropertyType::Date => {
            if DATE_PREFIX.is_match(value.as_text().trim()) {
                FieldValidation::ok()
            } else {
                FieldValidation::invalid("Date must be in YYYY-MM-DD format")
            }
        }
        PropertyType::Email => {
            if EMAIL.is_match(value.as_text().trim()) {
                FieldValidation::ok()
            } else {
                FieldValidation::invalid("Must be a valid email address")
            }
        }
        PropertyType::Url => {
            if looks_like_url(value.as_text().trim()) {
                FieldValidation::ok()
            } else {
                FieldValidation::invalid("Must be a valid URL")
            }
        }
        _ => FieldValidation::ok(),
    }
}

pub(crate) fn looks_like_url(raw: &str) -> bool {
    ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| raw.starts_with(scheme))
        || (raw.contains('.') && raw.chars().count() >= 4)
}

fn check_select(property: &PropertyDefinition, value: &PropertyValue) -> FieldValidation {
    if property.options.is_empty() {
        return FieldValidation::ok();
    }
    let choice = value.as_text();
    if property.options.iter().any(|option| option == choice.trim()) {
        FieldValidation::ok()
    } else {
        FieldValidation::invalid(format!(
            "Invalid option. Valid options: {}",
            property.options.join(", ")
        ))
    }
}

fn check_multi_select(property: &PropertyDefinition, value: &PropertyValue) -> FieldValidation {
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
            "Invalid options: {}. Valid options: {}",
            invalid.join(", "),
            property.options.join(", ")
        ))
    }
}

fn check_number(property: &PropertyDefinition, value: &PropertyValue) -> FieldValidation {
    let number = match value {
        PropertyValue::Number(number) => Some(*number),
        PropertyValue::Text(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(number) = number.filter(|number| number.is_finite()) else {
        return FieldValidation::invalid("Must be a valid number");
    };

    if property.format == Some(NumberFormat::Percent) && !(0.0..=100.0).contains(&number) {
        return FieldValidation::invalid("Percentage must be between 0 and 100");
    }
    FieldValidation::ok()
}

#[cfg(test)]
mod tests {
    use super::validate_local;
    use crate::models::{NumberFormat, PropertyDefinition, PropertyType, PropertyValue};

    fn text(value: &str) -> PropertyValue {
        PropertyValue::Text(value.to_string())
    }

    #[test]
    fn required_empty_short_circuits() {
        let priority = PropertyDefinition::new("Priority", PropertyType::Select)
            .with_options(["Low", "Med", "High"])
            .required();
        let result = validate_local(&priority, &text(""));
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("This field is required"));

        let optional = PropertyDefinition::new("Note", PropertyType::Email);
        assert!(validate_local(&optional, &text("   ")).valid);
    }

    #[test]
    fn percent_numbers_are_bounded() {
        let percent = PropertyDefinition::new("Done", PropertyType::Number).with_format(NumberFormat::Percent);
        for accepted in ["0", "100", "55.5"] {
            assert!(validate_local(&percent, &text(accepted)).valid, "{accepted}");
        }
        assert!(validate_local(&percent, &PropertyValue::Number(42.0)).valid);
        for rejected in ["-1", "100.01", "abc", "inf", "NaN"] {
            assert!(!validate_local(&percent, &text(rejected)).valid, "{rejected}");
        }

        let plain = PropertyDefinition::new("Count", PropertyType::Number);
        assert!(validate_local(&plain, &text("250")).valid);
        assert_eq!(
            validate_local(&plain, &text("12a")).error.as_deref(),
            Some("Must be a valid number")
        );
    }

    #[test]
    fn option_errors_enumerate_valid_options() {
        let select = PropertyDefinition::new("Priority", PropertyType::Select).with_options(["Low", "Med", "High"]);
        assert!(validate_local(&select, &text("Med")).valid);
        let error = validate_local(&select, &text("Urgent")).error.expect("error");
        assert!(error.contains("Low, Med, High"), "{error}");

        let multi = PropertyDefinition::new("Tags", PropertyType::MultiSelect).with_options(["a", "b"]);
        assert!(validate_local(&multi, &text("a, b")).valid);
        assert!(validate_local(&multi, &PropertyValue::Multi(vec!["b".to_string()])).valid);
        let error = validate_local(&multi, &text("a, c")).error.expect("error");
        assert!(error.contains("Invalid options: c"), "{error}");
        assert!(error.contains("Valid options: a, b"), "{error}");
    }

    #[test]
    fn select_without_options_accepts_anything() {
        let select = PropertyDefinition::new("Free", PropertyType::Select);
        assert!(validate_local(&select, &text("whatever")).valid);
    }

    #[test]
    fn structural_checks_for_date_email_url() {
        let date = PropertyDefinition::new("D", PropertyType::Date);
        assert!(validate_local(&date, &text("2024-01-31T10:00")).valid);
        assert!(!validate_local(&date, &text("31/01/2024")).valid);

        let email = PropertyDefinition::new("E", PropertyType::Email);
        assert!(validate_local(&email, &text("a@b.co")).valid);
        assert!(!validate_local(&email, &text("a@b")).valid);
        assert!(!validate_local(&email, &text("a b@c.d")).valid);

        let url = PropertyDefinition::new("U", PropertyType::Url);
        assert!(validate_local(&url, &text("https://x")).valid);
        assert!(validate_local(&url, &text("a.io")).valid);
        assert!(!validate_local(&url, &text("a.b")).valid);
        assert!(!validate_local(&url, &text("localhost")).valid);
    }

    #[test]
    fn other_types_only_check_required() {
        let relation = PropertyDefinition::new("R", PropertyType::Relation);
        assert!(validate_local(&relation, &text("anything")).valid);
        let checkbox = PropertyDefinition::new("C", PropertyType::Checkbox).required();
        assert!(!validate_local(&checkbox, &PropertyValue::Checkbox(false)).valid);
        assert!(validate_local(&checkbox, &PropertyValue::Checkbox(true)).valid);
    }
}
