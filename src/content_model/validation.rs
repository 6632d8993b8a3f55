//! Validation outcomes for a `ContentModel::validate` pass (spec §6.2).

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Success,
    Failure { message: String },
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ValidationResult::Success)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ValidationResult::Failure {
            message: message.into(),
        }
    }
}

/// One rule's outcome per named attribute, keyed the same way a content
/// model's `HeaderMap` keys its columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResults(BTreeMap<String, ValidationResult>);

impl ValidationResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attr: impl Into<String>, result: ValidationResult) {
        self.0.insert(attr.into(), result);
    }

    pub fn has(&self, attr: &str) -> bool {
        self.0.contains_key(attr)
    }

    pub fn ok(&self) -> bool {
        self.0.values().all(ValidationResult::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&String, &ValidationResult)> {
        self.0.iter().filter(|(_, r)| !r.is_ok())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
