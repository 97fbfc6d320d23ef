//! Individual repair passes.
//!
//! Each pass maps text to text and is idempotent. Passes that touch
//! structure never rewrite the contents of a quoted span.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use super::scan::{rewrite, verbatim};

/// A named, ordered repair step.
#[derive(Debug, Clone, Copy)]
pub struct RepairPass {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

/// Passes applied once, in order, before the first decode.
pub const SAFE_PASSES: &[RepairPass] = &[
    RepairPass {
        name: "python_literals",
        apply: replace_python_literals,
    },
    RepairPass {
        name: "strip_backticks",
        apply: strip_backticks,
    },
    RepairPass {
        name: "single_quotes",
        apply: single_to_double_quotes,
    },
    RepairPass {
        name: "trailing_commas",
        apply: drop_trailing_commas,
    },
    RepairPass {
        name: "control_chars",
        apply: escape_control_chars,
    },
];

/// Applied between failed decode attempts.
pub const RETRY_PASS: RepairPass = RepairPass {
    name: "interior_quotes",
    apply: escape_interior_quotes,
};

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("fence regex")
});
static PYTHON_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(None|True|False)\b").expect("literal regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("trailing comma regex"));

/// Compose to NFC and drop invisible formatting characters. Non-breaking
/// spaces become ordinary spaces.
pub fn normalize_text(text: &str) -> String {
    text.nfc()
        .filter(|&c| !is_invisible(c))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect()
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{00AD}'
    )
}

/// Find the structured payload inside free-form model output.
///
/// Text without a `{` has no payload. Text that is already a bare object
/// wins, and so does text that decodes whole as a JSON array, so the
/// decoder can reject it. Otherwise the first fenced code block holding an
/// object is used, then the span from the first `{` to the last `}`.
pub fn locate_payload(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if !trimmed.contains('{') {
        return None;
    }
    if is_bracketed(trimmed, '{', '}') || is_json_array(trimmed) {
        return Some(trimmed);
    }
    for captures in FENCE.captures_iter(text) {
        if let Some(body) = captures.get(1)
            && let Some(payload) = brace_span(body.as_str())
        {
            return Some(payload);
        }
    }
    brace_span(trimmed)
}

fn is_json_array(text: &str) -> bool {
    is_bracketed(text, '[', ']')
        && serde_json::from_str::<serde_json::Value>(text).is_ok_and(|v| v.is_array())
}

fn is_bracketed(text: &str, open: char, close: char) -> bool {
    text.len() >= 2 && text.starts_with(open) && text.ends_with(close)
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// `None`/`True`/`False` outside strings become `null`/`true`/`false`.
pub fn replace_python_literals(text: &str) -> String {
    rewrite(
        text,
        |s| {
            PYTHON_LITERAL
                .replace_all(s, |caps: &regex::Captures<'_>| match &caps[1] {
                    "None" => "null",
                    "True" => "true",
                    _ => "false",
                })
                .into_owned()
        },
        verbatim,
    )
}

/// Remove stray backticks outside strings.
pub fn strip_backticks(text: &str) -> String {
    rewrite(text, |s| s.replace('`', ""), verbatim)
}

/// Rewrite single-quoted spans as double-quoted strings.
pub fn single_to_double_quotes(text: &str) -> String {
    rewrite(
        text,
        str::to_string,
        |quote, body, terminated| {
            if quote != '\'' {
                return verbatim(quote, body, terminated);
            }
            let mut out = String::with_capacity(body.len() + 2);
            out.push('"');
            let mut chars = body.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some('\'') => out.push('\''),
                        Some(next) => {
                            out.push('\\');
                            out.push(next);
                        }
                        None => out.push('\\'),
                    },
                    '"' => out.push_str("\\\""),
                    other => out.push(other),
                }
            }
            if terminated {
                out.push('"');
            }
            out
        },
    )
}

/// Drop commas directly before a closing brace or bracket.
pub fn drop_trailing_commas(text: &str) -> String {
    rewrite(
        text,
        |s| TRAILING_COMMA.replace_all(s, "$1").into_owned(),
        verbatim,
    )
}

/// Escape raw control characters inside strings.
pub fn escape_control_chars(text: &str) -> String {
    rewrite(text, str::to_string, |quote, body, terminated| {
        if !body.chars().any(char::is_control) {
            return verbatim(quote, body, terminated);
        }
        let mut escaped = String::with_capacity(body.len() + 8);
        for c in body.chars() {
            match c {
                '\n' => escaped.push_str("\\n"),
                '\r' => escaped.push_str("\\r"),
                '\t' => escaped.push_str("\\t"),
                c if (c as u32) < 0x20 => escaped.push_str(&format!("\\u{:04x}", c as u32)),
                c => escaped.push(c),
            }
        }
        verbatim(quote, &escaped, terminated)
    })
}

/// Escape unescaped double quotes inside double-quoted strings.
pub fn escape_interior_quotes(text: &str) -> String {
    rewrite(text, str::to_string, |quote, body, terminated| {
        if quote != '"' || !body.contains('"') {
            return verbatim(quote, body, terminated);
        }
        let mut escaped = String::with_capacity(body.len() + 4);
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    escaped.push('\\');
                    if let Some(next) = chars.next() {
                        escaped.push(next);
                    }
                }
                '"' => escaped.push_str("\\\""),
                other => escaped.push(other),
            }
        }
        verbatim(quote, &escaped, terminated)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_invisible_chars() {
        let text = "\u{FEFF}{\"a\":\u{00A0}\"x\u{200B}y\"}";
        assert_eq!(normalize_text(text), "{\"a\": \"xy\"}");
    }

    #[test]
    fn normalize_composes_nfc() {
        assert_eq!(normalize_text("cafe\u{301}"), "caf\u{e9}");
    }

    #[test]
    fn locate_prefers_bare_object() {
        let text = "  {\"code\": \"```rust\\nfn main(){}```\"}  ";
        assert_eq!(
            locate_payload(text),
            Some("{\"code\": \"```rust\\nfn main(){}```\"}")
        );
    }

    #[test]
    fn locate_uses_fenced_block() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nAnything else? {nope}";
        assert_eq!(locate_payload(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn locate_skips_fences_without_objects() {
        let text = "```\nplain\n```\nthen {\"a\": 1} trailing";
        assert_eq!(locate_payload(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn locate_falls_back_to_outer_braces() {
        let text = "Sure! {\"a\": {\"b\": 2}} Hope that helps.";
        assert_eq!(locate_payload(text), Some("{\"a\": {\"b\": 2}}"));
    }

    #[test]
    fn locate_returns_array_of_objects_whole() {
        assert_eq!(
            locate_payload(" [{\"a\": 1}] "),
            Some("[{\"a\": 1}]")
        );
    }

    #[test]
    fn locate_ignores_bracketed_markers() {
        let text = "[JSON]\n{\"a\": 1}\n[/JSON]";
        assert_eq!(locate_payload(text), Some("{\"a\": 1}"));
        let text = "[Response] {\"a\": [1, 2]} [end]";
        assert_eq!(locate_payload(text), Some("{\"a\": [1, 2]}"));
    }

    #[test]
    fn locate_none_without_braces() {
        assert_eq!(locate_payload(""), None);
        assert_eq!(locate_payload("I cannot help with that."), None);
        assert_eq!(locate_payload("} backwards {"), None);
        assert_eq!(locate_payload(" [1, 2] "), None);
        assert_eq!(locate_payload("```json\n[\"a\", \"b\"]\n```"), None);
    }

    #[test]
    fn python_literals_outside_strings_only() {
        let text = r#"{"a": None, "b": True, "c": "None of it is True"}"#;
        assert_eq!(
            replace_python_literals(text),
            r#"{"a": null, "b": true, "c": "None of it is True"}"#
        );
    }

    #[test]
    fn backticks_inside_strings_survive() {
        let text = "{`a`: \"use `cargo`\"}";
        assert_eq!(strip_backticks(text), "{a: \"use `cargo`\"}");
    }

    #[test]
    fn single_quotes_become_double() {
        let text = r#"{'a': 'it\'s "fine"', 'b': ['1,', '2']}"#;
        assert_eq!(
            single_to_double_quotes(text),
            r#"{"a": "it's \"fine\"", "b": ["1,", "2"]}"#
        );
    }

    #[test]
    fn trailing_commas_dropped() {
        let text = "{\"a\": [1, 2, ], \"b\": \"x, ]\",\n}";
        assert_eq!(
            drop_trailing_commas(text),
            "{\"a\": [1, 2 ], \"b\": \"x, ]\"\n}"
        );
    }

    #[test]
    fn control_chars_escaped_in_strings() {
        let text = "{\"a\": \"line1\nline2\tend\u{1}\"}";
        assert_eq!(
            escape_control_chars(text),
            "{\"a\": \"line1\\nline2\\tend\\u0001\"}"
        );
    }

    #[test]
    fn control_chars_outside_strings_untouched() {
        let text = "{\n\t\"a\": 1\n}";
        assert_eq!(escape_control_chars(text), text);
    }

    #[test]
    fn interior_quotes_escaped() {
        let text = r#"{"summary": "They"re "great"", "n": 1}"#;
        assert_eq!(
            escape_interior_quotes(text),
            r#"{"summary": "They\"re \"great\"", "n": 1}"#
        );
    }

    #[test]
    fn passes_are_idempotent_on_messy_input() {
        let text = "{`c`: [1,], 'a': None, \"b\": \"say \"hi\" now\n\", 'd': 'it\\'s'}";
        for pass in SAFE_PASSES.iter().chain(std::iter::once(&RETRY_PASS)) {
            let once = (pass.apply)(text);
            let twice = (pass.apply)(&once);
            assert_eq!(once, twice, "pass {} is not idempotent", pass.name);
        }
    }
}
