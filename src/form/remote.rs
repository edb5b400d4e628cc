use super::backend::BackendApi;
use crate::models::{FieldValidation, PropertyDefinition, PropertyValues, ValidateValuesPayload, ValidationSummary};
use crate::validation::summarize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Result of one remote validation round, tagged with the configuration it
/// was issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOutcome {
    pub config_id: i64,
    pub ticket: u64,
    pub results: BTreeMap<String, FieldValidation>,
    pub summary: ValidationSummary,
}

/// Debounced server-side value validation. Every request takes a ticket from
/// a monotonic counter; a response is only returned when no newer request
/// was issued while it was pending.
#[derive(Debug)]
pub struct RemoteValidator {
    generation: AtomicU64,
    debounce: Duration,
}

impl RemoteValidator {
    pub fn new(debounce: Duration) -> Self {
        Self {
            generation: AtomicU64::new(0),
            debounce,
        }
    }

    /// Supersedes every pending request.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn issue(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// True while no request or cancellation came after `ticket`.
    pub fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    /// Waits out the debounce window, then asks the backend. Returns `None`
    /// when superseded. Backend failures count as "no errors reported".
    pub async fn validate(
        &self,
        backend: &dyn BackendApi,
        config_id: i64,
        values: PropertyValues,
        definitions: Vec<PropertyDefinition>,
    ) -> Option<RemoteOutcome> {
        let ticket = self.issue();
        tokio::time::sleep(self.debounce).await;
        if !self.is_current(ticket) {
            return None;
        }

        let filled: PropertyValues = values
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let results = if filled.is_empty() {
            BTreeMap::new()
        } else {
            let payload = ValidateValuesPayload {
                property_values: filled,
                config_id: Some(config_id),
            };
            match backend.validate_property_values(payload).await {
                Ok(response) => response.validation,
                Err(error) => {
                    tracing::warn!(config_id, error = %error, "remote value validation failed, continuing");
                    BTreeMap::new()
                }
            }
        };

        if !self.is_current(ticket) {
            tracing::debug!(config_id, ticket, "discarding stale remote validation");
            return None;
        }

        let summary = summarize(&definitions, &values, &results);
        Some(RemoteOutcome {
            config_id,
            ticket,
            results,
            summary,
        })
    }
}
