//! Property value validation: the fast local check the form runs on every
//! edit, the stricter server-side check, and the summary both feed.

pub mod local;
pub mod server;

pub use local::validate_local;
pub use server::{validate_batch, validate_value};

use crate::models::{FieldValidation, PropertyDefinition, PropertyValues, ValidationSummary};
use std::collections::BTreeMap;

/// Counts per-field outcomes and lists required properties left empty, in
/// schema order.
pub fn summarize(
    definitions: &[PropertyDefinition],
    values: &PropertyValues,
    results: &BTreeMap<String, FieldValidation>,
) -> ValidationSummary {
    let valid = results.values().filter(|result| result.valid).count();
    let missing_required = definitions
        .iter()
        .filter(|definition| definition.required)
        .filter(|definition| values.get(&definition.name).map_or(true, |value| value.is_empty()))
        .map(|definition| definition.name.clone())
        .collect();

    ValidationSummary {
        total: results.len(),
        valid,
        invalid: results.len() - valid,
        missing_required,
    }
}

#[cfg(test)]
mod tests {
    use super::summarize;
    use crate::models::{FieldValidation, PropertyDefinition, PropertyType, PropertyValue, PropertyValues};
    use std::collections::BTreeMap;

    #[test]
    fn summary_counts_and_lists_missing_required() {
        let definitions = vec![
            PropertyDefinition::new("Priority", PropertyType::Select).required(),
            PropertyDefinition::new("Notes", PropertyType::RichText),
            PropertyDefinition::new("Owner", PropertyType::RichText).required(),
        ];
        let mut values = PropertyValues::new();
        values.insert("Owner".to_string(), PropertyValue::Text("me".to_string()));
        values.insert("Notes".to_string(), PropertyValue::Text("x".to_string()));

        let mut results = BTreeMap::new();
        results.insert("Owner".to_string(), FieldValidation::ok());
        results.insert("Notes".to_string(), FieldValidation::invalid("bad"));

        let summary = summarize(&definitions, &values, &results);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.missing_required, vec!["Priority".to_string()]);
    }
}
