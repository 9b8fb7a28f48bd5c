//! Template strings with embedded `{{ ... }}` code.

use std::sync::LazyLock;

use regex::Regex;

/// Matches quoted string literals so references inside them are ignored.
static STRING_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|`(?:[^`\\]|\\.)*`"#)
        .expect("literal pattern compiles")
});

/// Matches dotted identifier paths.
static IDENT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_$][\w$]*(?:\s*\.\s*[A-Za-z_$][\w$]*|\[\d+\])*")
        .expect("path pattern compiles")
});

/// One piece of a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text.
    Text(&'a str),
    /// Code between `{{` and `}}`, trimmed.
    Code(&'a str),
}

/// True if the string contains at least one complete binding.
pub fn is_dynamic(s: &str) -> bool {
    segments(s).iter().any(|s| matches!(s, Segment::Code(_)))
}

/// Split a template into literal and code segments. An unterminated `{{`
/// is literal text. Braces inside code are balanced, so object literals
/// survive.
pub fn segments(s: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(open) = rest.find("{{") {
        let Some(len) = code_len(&rest[open + 2..]) else {
            break;
        };
        if open > 0 {
            out.push(Segment::Text(&rest[..open]));
        }
        out.push(Segment::Code(rest[open + 2..open + 2 + len].trim()));
        rest = &rest[open + 2 + len + 2..];
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    out
}

/// Length of the code before its closing `}}`, tracking nested braces.
fn code_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' if depth == 0 => {
                return (bytes.get(i + 1) == Some(&b'}')).then_some(i);
            }
            b'}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

/// If the whole string is a single binding, its code.
pub fn sole_code(s: &str) -> Option<&str> {
    match segments(s.trim()).as_slice() {
        [Segment::Code(code)] => Some(code),
        _ => None,
    }
}

/// Identifier paths referenced by a piece of code, e.g. `Api1.data.name`.
/// Member accesses on other expressions and string contents are skipped.
pub fn references(code: &str) -> Vec<String> {
    let stripped = STRING_LITERAL.replace_all(code, "\"\"");
    let mut out = Vec::new();
    for m in IDENT_PATH.find_iter(&stripped) {
        let before = stripped[..m.start()].trim_end();
        if before.ends_with('.') {
            continue;
        }
        let raw = m.as_str();
        let raw = raw.split('[').next().unwrap_or(raw);
        let path = raw.split('.').map(str::trim).collect::<Vec<_>>().join(".");
        if !out.contains(&path) {
            out.push(path);
        }
    }
    out
}

/// References made by every binding in a template string.
pub fn template_references(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    for seg in segments(s) {
        if let Segment::Code(code) = seg {
            for r in references(code) {
                if !out.contains(&r) {
                    out.push(r);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_segments() {
        assert_eq!(
            segments("Hi {{ User.name }}!"),
            vec![
                Segment::Text("Hi "),
                Segment::Code("User.name"),
                Segment::Text("!")
            ]
        );
        assert_eq!(segments("{{ {a: 1} }}"), vec![Segment::Code("{a: 1}")]);
        assert_eq!(segments("open {{ never"), vec![Segment::Text("open {{ never")]);
        assert!(!is_dynamic("plain"));
        assert!(is_dynamic("x{{1}}"));
        assert_eq!(sole_code(" {{Api1.data}} "), Some("Api1.data"));
        assert_eq!(sole_code("a{{Api1.data}}"), None);
    }

    #[test]
    fn extract_references() {
        assert_eq!(
            references("Api1.data.name + Input1 . text + foo().bar"),
            vec!["Api1.data.name", "Input1.text", "foo"]
        );
        assert_eq!(references("Table1.rows[0].id"), vec!["Table1.rows"]);
        assert_eq!(references("'Api1.data' + x"), vec!["x"]);
        assert_eq!(
            template_references("{{A.b}} and {{A.b + C.d}}"),
            vec!["A.b", "C.d"]
        );
    }
}
