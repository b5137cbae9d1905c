//! SQL safety checks for the database-query adapter
//!
//! The read-only guard and the named-parameter rewriter both run on a
//! literal-stripped view of the query, so quoted strings and comments can
//! never smuggle a forbidden token past the check or corrupt a rewrite.

use crate::error::{SourceError, SourceResult};

/// Tokens rejected in read-only mode, anywhere outside string literals
const FORBIDDEN_TOKENS: &[&str] = &["DROP", "DELETE", "INSERT", "UPDATE", "TRUNCATE", "ALTER"];

/// Placeholder syntax of the target driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL `$1`, `$2`, ...
    Dollar,
    /// MySQL / SQLite `?`
    Question,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Plain,
    SingleQuote,
    DoubleQuote,
    LineComment,
    BlockComment,
}

/// Replace string literals and comments with spaces, preserving length
/// and token boundaries
pub fn strip_literals(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut state = ScanState::Plain;
    let mut chars = query.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            ScanState::Plain => match c {
                '\'' => {
                    state = ScanState::SingleQuote;
                    out.push(' ');
                }
                '"' => {
                    state = ScanState::DoubleQuote;
                    out.push(' ');
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = ScanState::LineComment;
                    out.push_str("  ");
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = ScanState::BlockComment;
                    out.push_str("  ");
                }
                _ => out.push(c),
            },
            ScanState::SingleQuote => {
                out.push(' ');
                if c == '\'' {
                    // '' is an escaped quote inside the literal
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        out.push(' ');
                    } else {
                        state = ScanState::Plain;
                    }
                }
            }
            ScanState::DoubleQuote => {
                out.push(' ');
                if c == '"' {
                    state = ScanState::Plain;
                }
            }
            ScanState::LineComment => {
                if c == '\n' {
                    state = ScanState::Plain;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            ScanState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = ScanState::Plain;
                    out.push_str("  ");
                } else {
                    out.push(' ');
                }
            }
        }
    }
    out
}

/// Enforce the read-only contract: the query must start with SELECT or
/// WITH and contain no forbidden token outside string literals
///
/// # Errors
///
/// Returns `Forbidden` on violation and `Validation` for an empty query.
pub fn validate_read_only(query: &str) -> SourceResult<()> {
    let stripped = strip_literals(query);
    let mut tokens = stripped
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|token| !token.is_empty());

    let first = tokens
        .next()
        .ok_or_else(|| SourceError::Validation("query is empty".to_string()))?;
    let first_upper = first.to_ascii_uppercase();
    if first_upper != "SELECT" && first_upper != "WITH" {
        return Err(SourceError::Forbidden(format!(
            "read-only mode permits only SELECT/WITH queries, found {first_upper}"
        )));
    }

    for token in tokens {
        let upper = token.to_ascii_uppercase();
        if FORBIDDEN_TOKENS.contains(&upper.as_str()) {
            return Err(SourceError::Forbidden(format!(
                "forbidden token {upper} in read-only mode"
            )));
        }
    }
    Ok(())
}

/// Rewrite `:name` parameters to driver-native positional placeholders
///
/// Returns the rewritten query and the parameter names in bind order.
/// `::type` casts and anything inside literals or comments are left
/// untouched. A name may appear more than once; each occurrence binds
/// its value again.
pub fn rewrite_named_params(query: &str, style: PlaceholderStyle) -> (String, Vec<String>) {
    let mask = strip_literals(query);
    let mask_bytes: Vec<char> = mask.chars().collect();
    let query_chars: Vec<char> = query.chars().collect();

    let mut out = String::with_capacity(query.len());
    let mut names: Vec<String> = Vec::new();
    let mut i = 0usize;

    while i < query_chars.len() {
        let c = query_chars[i];
        let in_plain = mask_bytes.get(i) == Some(&c);
        let is_param_start = in_plain
            && c == ':'
            && (i == 0 || query_chars.get(i - 1) != Some(&':'))
            && query_chars.get(i + 1) != Some(&':')
            && query_chars
                .get(i + 1)
                .is_some_and(|next| next.is_alphabetic() || *next == '_');

        if is_param_start {
            let mut end = i + 1;
            while query_chars
                .get(end)
                .is_some_and(|ch| ch.is_alphanumeric() || *ch == '_')
            {
                end += 1;
            }
            let name: String = query_chars[i + 1..end].iter().collect();
            names.push(name);
            match style {
                PlaceholderStyle::Dollar => out.push_str(&format!("${}", names.len())),
                PlaceholderStyle::Question => out.push('?'),
            }
            i = end;
        } else {
            out.push(c);
            i += 1;
        }
    }

    (out, names)
}
