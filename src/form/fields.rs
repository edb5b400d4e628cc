use crate::models::{DynamicField, DynamicFieldShape, PropertyType, PropertyValue, DEFAULT_MAX_DYNAMIC_FIELDS};
use uuid::Uuid;

/// Edits a dynamic field may carry. `None` leaves the attribute unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdate {
    pub name: Option<String>,
    pub field_type: Option<PropertyType>,
    pub value: Option<PropertyValue>,
}

/// Ad hoc properties declared in the form, capped at a fixed count.
#[derive(Debug, Clone)]
pub struct DynamicFieldList {
    fields: Vec<DynamicField>,
    max_fields: usize,
}

impl Default for DynamicFieldList {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DYNAMIC_FIELDS)
    }
}

impl DynamicFieldList {
    pub fn new(max_fields: usize) -> Self {
        Self {
            fields: Vec::new(),
            max_fields,
        }
    }

    /// Rebuilds the list from persisted shapes with empty values.
    pub fn from_shapes(shapes: &[DynamicFieldShape], max_fields: usize) -> Self {
        let fields = shapes
            .iter()
            .take(max_fields)
            .map(|shape| DynamicField {
                id: if shape.id.is_empty() {
                    Uuid::new_v4().to_string()
                } else {
                    shape.id.clone()
                },
                name: shape.name.clone(),
                field_type: shape.field_type.clone(),
                value: PropertyValue::empty_for(&shape.field_type),
            })
            .collect();
        Self { fields, max_fields }
    }

    pub fn fields(&self) -> &[DynamicField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DynamicField> {
        self.fields.iter().find(|field| field.id == id)
    }

    /// Appends a blank rich-text field. Returns its id, or `None` when the
    /// list is full.
    pub fn add(&mut self) -> Option<String> {
        if self.fields.len() >= self.max_fields {
            return None;
        }
        let id = Uuid::new_v4().to_string();
        self.fields.push(DynamicField {
            id: id.clone(),
            name: String::new(),
            field_type: PropertyType::RichText,
            value: PropertyValue::empty_for(&PropertyType::RichText),
        });
        Some(id)
    }

    /// Removes the field with `id` and returns it. Unknown ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<DynamicField> {
        let position = self.fields.iter().position(|field| field.id == id)?;
        Some(self.fields.remove(position))
    }

    /// Applies `update` and returns the field's previous name. `None` for an
    /// unknown id, or when the new name is already taken by another field.
    pub fn update(&mut self, id: &str, update: FieldUpdate) -> Option<String> {
        if let Some(name) = update.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
            if self.fields.iter().any(|field| field.id != id && field.name.trim() == name) {
                return None;
            }
        }
        let field = self.fields.iter_mut().find(|field| field.id == id)?;
        let previous_name = field.name.clone();
        if let Some(name) = update.name {
            field.name = name;
        }
        if let Some(field_type) = update.field_type {
            if field_type != field.field_type {
                field.value = PropertyValue::empty_for(&field_type);
            }
            field.field_type = field_type;
        }
        if let Some(value) = update.value {
            field.value = value;
        }
        Some(previous_name)
    }

    /// Clears every value; ids, names and types are kept.
    pub fn reset_values(&mut self) {
        for field in &mut self.fields {
            field.value = PropertyValue::empty_for(&field.field_type);
        }
    }

    pub fn shapes(&self) -> Vec<DynamicFieldShape> {
        self.fields.iter().map(DynamicField::shape).collect()
    }

    /// Fields with a non-blank name, the only ones the schema can be asked about.
    pub fn named(&self) -> impl Iterator<Item = &DynamicField> {
        self.fields.iter().filter(|field| !field.name.trim().is_empty())
    }
}
