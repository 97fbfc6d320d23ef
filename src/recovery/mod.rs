//! Recovery of structured documents from model output.
//!
//! Model text is normalized, the payload is located, a fixed set of safe
//! repairs is applied, and the result is decoded. When decoding fails the
//! parser escapes interior quotes and tries again, up to a bounded number of
//! decode attempts. Recovery never panics and never returns a partial
//! document: the caller gets either a full object or an explicit failure.

mod passes;
mod scan;

pub use passes::{
    RETRY_PASS, RepairPass, SAFE_PASSES, drop_trailing_commas, escape_control_chars,
    escape_interior_quotes, locate_payload, normalize_text, replace_python_literals,
    single_to_double_quotes, strip_backticks,
};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PipelineError;

/// A decoded top-level object.
pub type ParsedDocument = serde_json::Map<String, Value>;

/// Default decode-attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How a recovery ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Decoded after `attempts` decode attempts.
    Recovered { attempts: u32 },
    /// No object-like payload in the text. No decode was attempted.
    NoStructureFound,
    /// Every decode attempt failed; `error` is the last decoder message.
    Unrecoverable { error: String, attempts: u32 },
}

/// Text kept for debugging a failed recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryDiagnostics {
    pub raw: String,
    pub cleaned: String,
}

/// Result of a recovery: the document (empty unless recovered) and outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    pub document: ParsedDocument,
    pub outcome: RecoveryOutcome,
    pub diagnostics: Option<RecoveryDiagnostics>,
}

impl Recovery {
    pub fn is_recovered(&self) -> bool {
        matches!(self.outcome, RecoveryOutcome::Recovered { .. })
    }

    /// Convert into the pipeline failure taxonomy.
    pub fn into_result(self) -> Result<ParsedDocument, PipelineError> {
        match self.outcome {
            RecoveryOutcome::Recovered { .. } => Ok(self.document),
            RecoveryOutcome::NoStructureFound => Err(PipelineError::NoStructureFound),
            RecoveryOutcome::Unrecoverable { error, attempts } => {
                Err(PipelineError::Unrecoverable {
                    attempts,
                    reason: error,
                })
            }
        }
    }

    fn failed(outcome: RecoveryOutcome, raw: &str, cleaned: String) -> Self {
        Self {
            document: ParsedDocument::new(),
            outcome,
            diagnostics: Some(RecoveryDiagnostics {
                raw: raw.to_string(),
                cleaned,
            }),
        }
    }
}

/// Parser with a fixed decode-attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryParser {
    max_attempts: u32,
}

impl Default for RecoveryParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RecoveryParser {
    /// `max_attempts` below one is treated as one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn recover(&self, text: &str) -> Recovery {
        recover(text, self.max_attempts)
    }
}

/// Recover a structured object from `text` within `max_attempts` decodes.
pub fn recover(text: &str, max_attempts: u32) -> Recovery {
    let max_attempts = max_attempts.max(1);
    let normalized = normalize_text(text);

    let Some(payload) = locate_payload(&normalized) else {
        debug!(chars = text.len(), "No structured payload in model output");
        return Recovery::failed(RecoveryOutcome::NoStructureFound, text, normalized.clone());
    };

    let mut cleaned = SAFE_PASSES
        .iter()
        .fold(payload.to_string(), |acc, pass| (pass.apply)(&acc));

    let mut attempts = 1;
    loop {
        match decode(&cleaned) {
            Ok(document) => {
                if attempts > 1 {
                    debug!(attempts, "Recovered model output after repair");
                }
                return Recovery {
                    document,
                    outcome: RecoveryOutcome::Recovered { attempts },
                    diagnostics: None,
                };
            }
            Err(error) if attempts >= max_attempts => {
                warn!(attempts, error = %error, "Model output unrecoverable");
                return Recovery::failed(
                    RecoveryOutcome::Unrecoverable { error, attempts },
                    text,
                    cleaned,
                );
            }
            Err(error) => {
                debug!(attempt = attempts, error = %error, pass = RETRY_PASS.name, "Decode failed, repairing");
                cleaned = (RETRY_PASS.apply)(&cleaned);
                attempts += 1;
            }
        }
    }
}

fn decode(text: &str) -> Result<ParsedDocument, String> {
    match serde_json::from_str::<Value>(text).map_err(|e| e.to_string())? {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err("top-level value is an array, expected an object".to_string()),
        other => Err(format!("top-level value is {other}, expected an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> ParsedDocument {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn well_formed_json_decodes_first_time() {
        let r = recover(r#"{"a": 1, "b": "two"}"#, 3);
        assert_eq!(r.outcome, RecoveryOutcome::Recovered { attempts: 1 });
        assert_eq!(r.document, object(json!({"a": 1, "b": "two"})));
        assert!(r.diagnostics.is_none());
    }

    #[test]
    fn python_style_dict_in_backticks() {
        let r = recover("`{'a': 'x','b': ['1,', '2']}`", 3);
        assert_eq!(r.outcome, RecoveryOutcome::Recovered { attempts: 1 });
        assert_eq!(r.document, object(json!({"a": "x", "b": ["1,", "2"]})));
    }

    #[test]
    fn prose_wrapped_fenced_block() {
        let text = "Here is the analysis:\n```json\n{\n  \"relevance_score\": 0.8,\n  \"category\": \"Miscellaneous\",\n}\n```\nLet me know!";
        let r = recover(text, 3);
        assert!(r.is_recovered());
        assert_eq!(r.document["relevance_score"], json!(0.8));
    }

    #[test]
    fn python_literals_and_trailing_commas() {
        let r = recover("{'ok': True, 'missing': None, 'list': [1, 2,],}", 3);
        assert_eq!(
            r.document,
            object(json!({"ok": true, "missing": null, "list": [1, 2]}))
        );
    }

    #[test]
    fn interior_quote_recovered_on_retry() {
        let r = recover(r#"{"summary": "They"re here", "n": 1}"#, 3);
        assert_eq!(r.outcome, RecoveryOutcome::Recovered { attempts: 2 });
        assert_eq!(r.document["summary"], json!("They\"re here"));
        assert_eq!(r.document["n"], json!(1));
    }

    #[test]
    fn raw_newlines_inside_strings() {
        let r = recover("{\"body\": \"line one\nline two\"}", 3);
        assert_eq!(r.outcome, RecoveryOutcome::Recovered { attempts: 1 });
        assert_eq!(r.document["body"], json!("line one\nline two"));
    }

    #[test]
    fn dangling_key_is_unrecoverable() {
        let r = recover(r#"{"a": {"b": , "c": 1}}"#, 3);
        match &r.outcome {
            RecoveryOutcome::Unrecoverable { attempts, error } => {
                assert_eq!(*attempts, 3);
                assert!(!error.is_empty());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(r.document.is_empty());
        let diagnostics = r.diagnostics.as_ref().unwrap();
        assert_eq!(diagnostics.raw, r#"{"a": {"b": , "c": 1}}"#);
    }

    #[test]
    fn attempts_respect_budget() {
        let r = recover(r#"{"a": {"b": , "c": 1}}"#, 1);
        assert!(matches!(
            r.outcome,
            RecoveryOutcome::Unrecoverable { attempts: 1, .. }
        ));
        let r = RecoveryParser::new(0).recover(r#"{"a": {"b": , "c": 1}}"#);
        assert!(matches!(
            r.outcome,
            RecoveryOutcome::Unrecoverable { attempts: 1, .. }
        ));
    }

    #[test]
    fn no_braces_is_no_structure() {
        for text in ["", "   ", "I am unable to produce JSON today.", "[1, 2]", "[]"] {
            let r = recover(text, 3);
            assert_eq!(r.outcome, RecoveryOutcome::NoStructureFound);
            assert!(r.document.is_empty());
        }
    }

    #[test]
    fn top_level_array_is_unrecoverable() {
        let r = recover(r#"[{"a": 1}]"#, 3);
        match r.outcome {
            RecoveryOutcome::Unrecoverable { error, .. } => assert!(error.contains("array")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn bracketed_markers_around_object_recover() {
        let r = recover("[JSON]\n{\"a\": 1}\n[/JSON]", 3);
        assert_eq!(r.outcome, RecoveryOutcome::Recovered { attempts: 1 });
        assert_eq!(r.document, object(json!({"a": 1})));
    }

    #[test]
    fn into_result_maps_taxonomy() {
        assert!(matches!(
            recover("nothing here", 3).into_result(),
            Err(PipelineError::NoStructureFound)
        ));
        assert!(matches!(
            recover(r#"{"a": }"#, 2).into_result(),
            Err(PipelineError::Unrecoverable { attempts: 2, .. })
        ));
        assert_eq!(recover(r#"{"a": 1}"#, 2).into_result().unwrap().len(), 1);
    }

    #[test]
    fn bom_and_zero_width_chars_ignored() {
        let r = recover("\u{FEFF}{\"a\u{200B}\": \"b\"}", 3);
        assert_eq!(r.document, object(json!({"a": "b"})));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn json_value() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(|n| json!(n)),
                "[ -~]{0,24}".prop_map(Value::String),
            ];
            leaf.prop_recursive(3, 24, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        fn json_object() -> impl Strategy<Value = ParsedDocument> {
            prop::collection::btree_map("[a-z_]{1,8}", json_value(), 0..5)
                .prop_map(|m| m.into_iter().collect())
        }

        proptest! {
            #[test]
            fn well_formed_objects_round_trip(doc in json_object(), pretty in any::<bool>()) {
                let text = if pretty {
                    serde_json::to_string_pretty(&doc).unwrap()
                } else {
                    serde_json::to_string(&doc).unwrap()
                };
                let r = recover(&text, 3);
                prop_assert_eq!(r.outcome, RecoveryOutcome::Recovered { attempts: 1 });
                prop_assert_eq!(r.document, doc);
            }

            #[test]
            fn interior_quote_repair_is_idempotent(text in "[ -~\n]{0,64}") {
                let once = escape_interior_quotes(&text);
                prop_assert_eq!(escape_interior_quotes(&once), once);
            }

            #[test]
            fn single_interior_quote_recovers(
                before in "[a-zA-Z ]{1,12}",
                after in "[a-zA-Z][a-zA-Z ]{0,11}",
            ) {
                let original = format!("{before}\"{after}");
                let text = format!("{{\"title\": \"ok\", \"summary\": \"{original}\", \"n\": 2}}");
                let r = recover(&text, 3);
                prop_assert!(r.is_recovered());
                prop_assert_eq!(r.document["summary"].as_str(), Some(original.as_str()));
            }

            #[test]
            fn each_pass_leaves_valid_json_alone(doc in json_object()) {
                let text = serde_json::to_string(&doc).unwrap();
                for pass in SAFE_PASSES.iter().chain(std::iter::once(&RETRY_PASS)) {
                    prop_assert_eq!((pass.apply)(&text), text.clone(), "pass {}", pass.name);
                }
            }

            #[test]
            fn text_without_braces_is_no_structure(text in "[^{]{0,64}") {
                let r = recover(&text, 3);
                prop_assert_eq!(r.outcome, RecoveryOutcome::NoStructureFound);
                prop_assert!(r.document.is_empty());
            }

            #[test]
            fn arbitrary_text_never_panics(text in ".{0,128}") {
                let r = recover(&text, 3);
                if !r.is_recovered() {
                    prop_assert!(r.document.is_empty());
                }
            }
        }
    }
}
