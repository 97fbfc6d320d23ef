//! Schema validation and coercion of recovered documents.
//!
//! Validation never fails. Every field the schema names is present in the
//! output; anything missing or malformed is replaced by a safe default and
//! the substitution is logged and recorded as a degradation.

mod record;
mod shapes;

pub use record::{Degradation, FieldValue, ValidatedRecord};
pub use shapes::{NO_FEEDBACK, NO_SUMMARY, UNTITLED, UNTITLED_SECTION};

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ValidatorConfig;
use crate::error::PipelineError;
use crate::recovery::ParsedDocument;

/// Trailing punctuation stripped from text and list entries.
const TRAILING_PUNCTUATION: &[char] = &[',', ';', ':'];

/// Coercion rule for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Number in [0, 1]; anything else becomes 0.0.
    Score,
    /// One of `allowed`, else `default`.
    Category {
        allowed: Vec<String>,
        default: String,
    },
    /// List of cleaned strings; a bare string is split on commas.
    List,
    /// Cleaned string; empty becomes `placeholder`.
    Text { placeholder: String },
    /// Nested objects validated against `fields`. With `identity`, later
    /// records whose normalized identity repeats an earlier one are dropped.
    Records {
        fields: Vec<FieldSpec>,
        identity: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn score(name: &str) -> Self {
        Self::new(name, FieldKind::Score)
    }

    pub fn category(name: &str, allowed: &[String], default: &str) -> Self {
        Self::new(
            name,
            FieldKind::Category {
                allowed: allowed.to_vec(),
                default: default.to_string(),
            },
        )
    }

    pub fn list(name: &str) -> Self {
        Self::new(name, FieldKind::List)
    }

    pub fn text(name: &str, placeholder: &str) -> Self {
        Self::new(
            name,
            FieldKind::Text {
                placeholder: placeholder.to_string(),
            },
        )
    }

    pub fn records(name: &str, fields: Vec<FieldSpec>) -> Self {
        Self::new(
            name,
            FieldKind::Records {
                fields,
                identity: None,
            },
        )
    }

    /// Deduplicate records on `key`. Only meaningful for `Records`.
    pub fn with_identity(mut self, key: &str) -> Self {
        if let FieldKind::Records { identity, .. } = &mut self.kind {
            *identity = Some(key.to_string());
        }
        self
    }

    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// An ordered set of field rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { name, fields }
    }
}

/// Applies schemas to recovered documents.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    config: ValidatorConfig,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl SchemaValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn categories(&self) -> &[String] {
        &self.config.categories
    }

    pub fn default_category(&self) -> &str {
        &self.config.default_category
    }

    /// Validate `document` against `schema`. Total: never fails.
    pub fn validate(&self, document: &ParsedDocument, schema: &Schema) -> ValidatedRecord {
        let mut ctx = Context::default();
        let fields = validate_fields(document, &schema.fields, "", &mut ctx);
        if !ctx.degradations.is_empty() || ctx.duplicates_dropped > 0 {
            debug!(
                schema = schema.name,
                degraded = ctx.degradations.len(),
                duplicates = ctx.duplicates_dropped,
                "Validated with substitutions"
            );
        }
        ValidatedRecord::new(fields, ctx.degradations, ctx.duplicates_dropped)
    }

    /// Validate a document that failed to recover: every field takes its default.
    pub fn defaults(&self, schema: &Schema) -> ValidatedRecord {
        self.validate(&ParsedDocument::new(), schema)
    }
}

#[derive(Default)]
struct Context {
    degradations: Vec<Degradation>,
    duplicates_dropped: usize,
    seen: HashMap<String, HashSet<String>>,
}

impl Context {
    fn degrade(&mut self, field: String, reason: impl Into<String>) {
        let reason = reason.into();
        let error = PipelineError::ValidationDegraded {
            field: field.clone(),
            reason: reason.clone(),
        };
        warn!(kind = error.label(), "{error}");
        self.degradations.push(Degradation { field, reason });
    }
}

fn validate_fields(
    object: &serde_json::Map<String, Value>,
    specs: &[FieldSpec],
    prefix: &str,
    ctx: &mut Context,
) -> std::collections::BTreeMap<String, FieldValue> {
    specs
        .iter()
        .map(|spec| {
            let path = if prefix.is_empty() {
                spec.name.clone()
            } else {
                format!("{prefix}.{}", spec.name)
            };
            let value = lookup(object, &spec.name);
            (spec.name.clone(), validate_field(value, &spec.kind, path, ctx))
        })
        .collect()
}

/// Exact key match first, then a trimmed case-insensitive match.
fn lookup<'a>(object: &'a serde_json::Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| {
        object
            .iter()
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

fn validate_field(
    value: Option<&Value>,
    kind: &FieldKind,
    path: String,
    ctx: &mut Context,
) -> FieldValue {
    match kind {
        FieldKind::Score => FieldValue::Score(coerce_score(value, path, ctx)),
        FieldKind::Category { allowed, default } => {
            FieldValue::Text(coerce_category(value, allowed, default, path, ctx))
        }
        FieldKind::List => FieldValue::List(coerce_list(value, path, ctx)),
        FieldKind::Text { placeholder } => {
            FieldValue::Text(coerce_text(value, placeholder, path, ctx))
        }
        FieldKind::Records { fields, identity } => {
            FieldValue::Records(coerce_records(value, fields, identity.as_deref(), path, ctx))
        }
    }
}

fn coerce_score(value: Option<&Value>, path: String, ctx: &mut Context) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(score) if score.is_finite() && (0.0..=1.0).contains(&score) => score,
        Some(score) => {
            ctx.degrade(path, format!("score {score} outside [0, 1]"));
            0.0
        }
        None => {
            ctx.degrade(path, describe_missing(value, "a number"));
            0.0
        }
    }
}

fn coerce_category(
    value: Option<&Value>,
    allowed: &[String],
    default: &str,
    path: String,
    ctx: &mut Context,
) -> String {
    match value {
        Some(Value::String(s)) if allowed.iter().any(|a| a == s) => s.clone(),
        Some(Value::String(s)) => {
            ctx.degrade(path, format!("category '{s}' not in allowlist"));
            default.to_string()
        }
        other => {
            ctx.degrade(path, describe_missing(other, "a category string"));
            default.to_string()
        }
    }
}

fn coerce_list(value: Option<&Value>, path: String, ctx: &mut Context) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(clean_text(s)),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(clean_text)
            .filter(|s| !s.is_empty())
            .collect(),
        other => {
            ctx.degrade(path, describe_missing(other, "a list"));
            Vec::new()
        }
    }
}

fn coerce_text(value: Option<&Value>, placeholder: &str, path: String, ctx: &mut Context) -> String {
    let raw = match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        other => {
            ctx.degrade(path, describe_missing(other, "text"));
            return placeholder.to_string();
        }
    };
    let cleaned = clean_text(&raw);
    if cleaned.is_empty() {
        ctx.degrade(path, "empty text");
        return placeholder.to_string();
    }
    cleaned
}

fn coerce_records(
    value: Option<&Value>,
    fields: &[FieldSpec],
    identity: Option<&str>,
    path: String,
    ctx: &mut Context,
) -> Vec<ValidatedRecord> {
    let items = match value {
        Some(Value::Array(items)) => items,
        other => {
            ctx.degrade(path, describe_missing(other, "a list of objects"));
            return Vec::new();
        }
    };

    let collection = path.rsplit('.').next().unwrap_or(&path).to_string();
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{path}[{index}]");
        let Value::Object(object) = item else {
            ctx.degrade(item_path, "non-object element dropped");
            continue;
        };

        if let Some(key) = identity
            && let Some(id) = lookup(object, key).and_then(Value::as_str)
        {
            let normalized = clean_text(id).to_lowercase();
            if !normalized.is_empty()
                && !ctx
                    .seen
                    .entry(collection.clone())
                    .or_default()
                    .insert(normalized.clone())
            {
                debug!(field = %item_path, identity = %normalized, "Dropping duplicate record");
                ctx.duplicates_dropped += 1;
                continue;
            }
        }

        let nested = validate_fields(object, fields, &item_path, ctx);
        records.push(ValidatedRecord::new(nested, Vec::new(), 0));
    }
    records
}

/// Trim, strip trailing separator punctuation and one pair of matching
/// surrounding quotes.
pub fn clean_text(raw: &str) -> String {
    let mut s = strip_trailing(raw);
    for quote in ['"', '\'', '`'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            s = strip_trailing(&s[1..s.len() - 1]);
            break;
        }
    }
    s.to_string()
}

fn strip_trailing(s: &str) -> &str {
    s.trim().trim_end_matches(TRAILING_PUNCTUATION).trim_end()
}

fn describe_missing(value: Option<&Value>, expected: &str) -> String {
    match value {
        None => format!("missing, expected {expected}"),
        Some(Value::Null) => format!("null, expected {expected}"),
        Some(Value::Bool(_)) => format!("boolean, expected {expected}"),
        Some(Value::Number(_)) => format!("number, expected {expected}"),
        Some(Value::String(_)) => format!("string, expected {expected}"),
        Some(Value::Array(_)) => format!("array, expected {expected}"),
        Some(Value::Object(_)) => format!("object, expected {expected}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ParsedDocument {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn validator() -> SchemaValidator {
        SchemaValidator::default()
    }

    #[test]
    fn score_in_range_kept() {
        let schema = Schema::new("t", vec![FieldSpec::score("s")]);
        let r = validator().validate(&doc(json!({"s": 0.85})), &schema);
        assert_eq!(r.score("s"), 0.85);
        assert!(r.degradations().is_empty());
    }

    #[test]
    fn score_coercions() {
        let schema = Schema::new("t", vec![FieldSpec::score("s")]);
        for (input, expected, degraded) in [
            (json!({"s": "0.4"}), 0.4, false),
            (json!({"s": 1}), 1.0, false),
            (json!({"s": 1.7}), 0.0, true),
            (json!({"s": -0.1}), 0.0, true),
            (json!({"s": "high"}), 0.0, true),
            (json!({"s": null}), 0.0, true),
            (json!({}), 0.0, true),
        ] {
            let r = validator().validate(&doc(input.clone()), &schema);
            assert_eq!(r.score("s"), expected, "input {input}");
            assert_eq!(!r.degradations().is_empty(), degraded, "input {input}");
        }
    }

    #[test]
    fn category_outside_allowlist_defaults() {
        let v = validator();
        let schema = Schema::new(
            "t",
            vec![FieldSpec::category("c", v.categories(), v.default_category())],
        );
        let r = v.validate(&doc(json!({"c": "New Frameworks & Tools"})), &schema);
        assert_eq!(r.text("c"), "New Frameworks & Tools");
        let r = v.validate(&doc(json!({"c": "Cooking"})), &schema);
        assert_eq!(r.text("c"), "Miscellaneous");
        assert_eq!(r.degradations()[0].field, "c");
    }

    #[test]
    fn list_cleanup() {
        let schema = Schema::new("t", vec![FieldSpec::list("l")]);
        let r = validator().validate(&doc(json!({"l": ["1,", " 2 ", "", "three;"]})), &schema);
        assert_eq!(r.list("l"), ["1", "2", "three"]);
        let r = validator().validate(&doc(json!({"l": "a, b,, c"})), &schema);
        assert_eq!(r.list("l"), ["a", "b", "c"]);
        let r = validator().validate(&doc(json!({})), &schema);
        assert!(r.list("l").is_empty());
        assert_eq!(r.degradations().len(), 1);
    }

    #[test]
    fn text_cleanup_and_placeholder() {
        let schema = Schema::new("t", vec![FieldSpec::text("x", "Untitled")]);
        let r = validator().validate(&doc(json!({"x": "  \"Agents ship\",  "})), &schema);
        assert_eq!(r.text("x"), "Agents ship");
        let r = validator().validate(&doc(json!({"x": "   "})), &schema);
        assert_eq!(r.text("x"), "Untitled");
        let r = validator().validate(&doc(json!({"x": ["nope"]})), &schema);
        assert_eq!(r.text("x"), "Untitled");
    }

    #[test]
    fn key_lookup_is_forgiving() {
        let schema = Schema::new("t", vec![FieldSpec::text("title", "Untitled")]);
        let r = validator().validate(&doc(json!({" Title ": "Hello"})), &schema);
        assert_eq!(r.text("title"), "Hello");
    }

    #[test]
    fn nested_records_dedupe_across_collection() {
        let schema = Schema::new(
            "outline",
            vec![FieldSpec::records(
                "sections",
                vec![
                    FieldSpec::text("name", "Untitled Section"),
                    FieldSpec::records(
                        "articles",
                        vec![FieldSpec::text("title", "Untitled")],
                    )
                    .with_identity("title"),
                ],
            )],
        );
        let input = json!({
            "sections": [
                {"name": "A", "articles": [{"title": "Foo"}, {"title": "Bar"}, "junk"]},
                {"name": "B", "articles": [{"title": " foo "}, {"title": "Baz"}]},
            ]
        });
        let r = validator().validate(&doc(input), &schema);
        let sections = r.records("sections");
        assert_eq!(sections.len(), 2);
        let titles = |i: usize| -> Vec<String> {
            sections[i]
                .records("articles")
                .iter()
                .map(|a| a.text("title").to_string())
                .collect()
        };
        assert_eq!(titles(0), ["Foo", "Bar"]);
        assert_eq!(titles(1), ["Baz"]);
        assert_eq!(r.duplicates_dropped(), 1);
        assert!(
            r.degradations()
                .iter()
                .any(|d| d.field == "sections[0].articles[2]")
        );
    }

    #[test]
    fn defaults_fill_every_field() {
        let v = validator();
        let r = v.defaults(&v.review_schema());
        assert_eq!(r.score("quality_score"), 0.0);
        assert!(!r.text("feedback").is_empty());
        assert!(r.records("issues_found").is_empty());
    }

    #[test]
    fn clean_text_rules() {
        assert_eq!(clean_text(" 'quoted' "), "quoted");
        assert_eq!(clean_text("ends with;"), "ends with");
        assert_eq!(clean_text("Keeps the period."), "Keeps the period.");
        assert_eq!(clean_text("\"unbalanced"), "\"unbalanced");
    }
}
