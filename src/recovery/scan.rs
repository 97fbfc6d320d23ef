//! Quote-aware segmentation of JSON-like text.
//!
//! Model output cannot be trusted to escape quotes, so a string does not end
//! at the first unescaped quote character. It ends at the first unescaped
//! quote whose following text looks like JSON structure (`:`, `}`, `]`, end
//! of input, or a comma followed by another value). Every repair pass sees
//! the same boundaries.

/// A run of structural text or a quoted span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Structure(&'a str),
    Quoted {
        quote: char,
        body: &'a str,
        terminated: bool,
    },
}

/// Split `text` into structural runs and quoted spans. Concatenating the
/// rendered segments reproduces `text` exactly.
pub(crate) fn segments(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut structure_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != b'"' && b != b'\'' {
            i += 1;
            continue;
        }
        if structure_start < i {
            out.push(Segment::Structure(&text[structure_start..i]));
        }
        let body_start = i + 1;
        match find_close(text, body_start, b) {
            Some(end) => {
                out.push(Segment::Quoted {
                    quote: b as char,
                    body: &text[body_start..end],
                    terminated: true,
                });
                i = end + 1;
            }
            None => {
                out.push(Segment::Quoted {
                    quote: b as char,
                    body: &text[body_start..],
                    terminated: false,
                });
                i = bytes.len();
            }
        }
        structure_start = i;
    }

    if structure_start < bytes.len() {
        out.push(Segment::Structure(&text[structure_start..]));
    }
    out
}

/// Rebuild text from segments.
pub(crate) fn render(segments: &[Segment<'_>]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Structure(s) => out.push_str(s),
            Segment::Quoted {
                quote,
                body,
                terminated,
            } => {
                out.push(*quote);
                out.push_str(body);
                if *terminated {
                    out.push(*quote);
                }
            }
        }
    }
    out
}

/// Rewrite structural runs and quoted spans independently.
pub(crate) fn rewrite(
    text: &str,
    mut structure: impl FnMut(&str) -> String,
    mut quoted: impl FnMut(char, &str, bool) -> String,
) -> String {
    let mut out = String::with_capacity(text.len());
    for segment in segments(text) {
        match segment {
            Segment::Structure(s) => out.push_str(&structure(s)),
            Segment::Quoted {
                quote,
                body,
                terminated,
            } => out.push_str(&quoted(quote, body, terminated)),
        }
    }
    out
}

/// Render a quoted span unchanged.
pub(crate) fn verbatim(quote: char, body: &str, terminated: bool) -> String {
    render(&[Segment::Quoted {
        quote,
        body,
        terminated,
    }])
}

fn find_close(text: &str, from: usize, quote: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote && closes_string(&text[i + 1..]) => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Does the text following a quote look like the rest of a JSON document?
pub(crate) fn closes_string(rest: &str) -> bool {
    let rest = rest.trim_start();
    match rest.chars().next() {
        None | Some(':' | '}' | ']') => true,
        Some(',') => {
            let after = rest[1..].trim_start();
            match after.chars().next() {
                None | Some('"' | '\'' | '{' | '[' | '}' | ']' | '-') => true,
                Some(c) if c.is_ascii_digit() => true,
                Some(_) => starts_with_literal(after),
            }
        }
        Some(_) => false,
    }
}

fn starts_with_literal(s: &str) -> bool {
    ["true", "false", "null", "True", "False", "None"]
        .iter()
        .any(|literal| {
            s.strip_prefix(literal)
                .is_some_and(|tail| !tail.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_valid_json() {
        let text = r#"{"a": "x", "b": [1, "y"]}"#;
        let segs = segments(text);
        assert_eq!(
            segs,
            vec![
                Segment::Structure("{"),
                Segment::Quoted {
                    quote: '"',
                    body: "a",
                    terminated: true
                },
                Segment::Structure(": "),
                Segment::Quoted {
                    quote: '"',
                    body: "x",
                    terminated: true
                },
                Segment::Structure(", "),
                Segment::Quoted {
                    quote: '"',
                    body: "b",
                    terminated: true
                },
                Segment::Structure(": [1, "),
                Segment::Quoted {
                    quote: '"',
                    body: "y",
                    terminated: true
                },
                Segment::Structure("]}"),
            ]
        );
        assert_eq!(render(&segs), text);
    }

    #[test]
    fn interior_quote_stays_in_body() {
        let text = r#"{"summary": "They"re here", "n": 1}"#;
        let segs = segments(text);
        assert!(segs.contains(&Segment::Quoted {
            quote: '"',
            body: r#"They"re here"#,
            terminated: true
        }));
        assert_eq!(render(&segs), text);
    }

    #[test]
    fn escaped_quotes_are_skipped() {
        let text = r#"{"a": "say \"hi\""}"#;
        let segs = segments(text);
        assert!(segs.contains(&Segment::Quoted {
            quote: '"',
            body: r#"say \"hi\""#,
            terminated: true
        }));
    }

    #[test]
    fn apostrophe_inside_double_quotes_is_not_a_span() {
        let text = r#"{"a": "it's fine"}"#;
        let segs = segments(text);
        assert!(segs.contains(&Segment::Quoted {
            quote: '"',
            body: "it's fine",
            terminated: true
        }));
    }

    #[test]
    fn unterminated_span_runs_to_end() {
        let text = r#"{"a": "open"#;
        let segs = segments(text);
        assert_eq!(
            segs.last(),
            Some(&Segment::Quoted {
                quote: '"',
                body: "open",
                terminated: false
            })
        );
        assert_eq!(render(&segs), text);
    }

    #[test]
    fn closes_string_heuristic() {
        assert!(closes_string(""));
        assert!(closes_string("  }"));
        assert!(closes_string(": 1"));
        assert!(closes_string(", \"next\""));
        assert!(closes_string(",\n  'next'"));
        assert!(closes_string(", 42]"));
        assert!(closes_string(", true}"));
        assert!(!closes_string("re great"));
        assert!(!closes_string(" module"));
        assert!(!closes_string(", then we left"));
        assert!(!closes_string(", trueish"));
    }

    #[test]
    fn multibyte_text_is_preserved() {
        let text = "{\"a\": \"caf\u{e9} \u{1f680}\", \"b\": \"\u{65e5}\u{672c}\"}";
        assert_eq!(render(&segments(text)), text);
    }
}
