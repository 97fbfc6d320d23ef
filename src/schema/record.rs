//! Validated records and their typed accessors.

use std::collections::BTreeMap;

use serde::Serialize;

/// A coerced field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Score(f64),
    Text(String),
    List(Vec<String>),
    Records(Vec<ValidatedRecord>),
}

/// A field that was replaced by its default during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Degradation {
    pub field: String,
    pub reason: String,
}

/// The output of validation: every schema field, coerced.
///
/// Accessors return the type's empty value for a name the schema did not
/// declare.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedRecord {
    #[serde(flatten)]
    fields: BTreeMap<String, FieldValue>,
    #[serde(skip)]
    degradations: Vec<Degradation>,
    #[serde(skip)]
    duplicates_dropped: usize,
}

impl ValidatedRecord {
    pub(crate) fn new(
        fields: BTreeMap<String, FieldValue>,
        degradations: Vec<Degradation>,
        duplicates_dropped: usize,
    ) -> Self {
        Self {
            fields,
            degradations,
            duplicates_dropped,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn score(&self, name: &str) -> f64 {
        match self.fields.get(name) {
            Some(FieldValue::Score(score)) => *score,
            _ => 0.0,
        }
    }

    pub fn text(&self, name: &str) -> &str {
        match self.fields.get(name) {
            Some(FieldValue::Text(text)) => text,
            _ => "",
        }
    }

    pub fn list(&self, name: &str) -> &[String] {
        match self.fields.get(name) {
            Some(FieldValue::List(items)) => items,
            _ => &[],
        }
    }

    pub fn records(&self, name: &str) -> &[ValidatedRecord] {
        match self.fields.get(name) {
            Some(FieldValue::Records(records)) => records,
            _ => &[],
        }
    }

    /// Substitutions made anywhere in the document, nested records included.
    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Records dropped because their identity repeated an earlier one.
    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }
}
