//! Token rewriter: turns raw snippet text with embedded `$column$` and
//! `$$ROWNUMBER$$` / `$$ROWKEY$$` references into a plain snippet-language
//! body over generated field names, plus the field mapping the unit compiler
//! and row binder share.
//!
//! The scan is a single left-to-right pass. Ordinary characters (whitespace
//! and `/` included) copy through verbatim, so the rewritten body keeps the
//! original layout. Quoted literals are decoded and re-escaped so they stay
//! valid in the synthesized source; comments are elided entirely.

use crate::field::{col_field_name, FieldMap, ROW_INDEX, ROW_KEY};
use snippet_model::{TableSpec, ValueKind};
use thiserror::Error;

/// Failure of the rewrite pass; reported before any compilation is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("no such column: {name} (line {line})")]
    UnresolvedColumn { name: String, line: u32 },
    #[error("invalid special identifier: {token} (line {line})")]
    UnresolvedSpecial { token: String, line: u32 },
    #[error("{message} (line {line})")]
    Malformed { message: String, line: u32 },
}

fn malformed(message: impl Into<String>, line: u32) -> RewriteError {
    RewriteError::Malformed {
        message: message.into(),
        line,
    }
}

/// Result of a successful rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    pub body: String,
    pub fields: FieldMap,
}

/// Rewrites `expression` against the column layout in `spec`.
pub fn rewrite_expression(expression: &str, spec: &TableSpec) -> Result<Rewritten, RewriteError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut out = String::with_capacity(expression.len());
    let mut fields = FieldMap::new();
    let mut pos = 0;
    let mut line: u32 = 1;
    let mut special = false;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            '/' if chars.get(pos + 1) == Some(&'/') => {
                pos += 2;
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
                // The terminating newline itself passes through ordinarily.
            }
            '/' if chars.get(pos + 1) == Some(&'*') => {
                let start_line = line;
                pos += 2;
                loop {
                    match chars.get(pos) {
                        None => return Err(malformed("unterminated block comment", start_line)),
                        Some('*') if chars.get(pos + 1) == Some(&'/') => {
                            pos += 2;
                            break;
                        }
                        Some(&o) => {
                            if o == '\n' {
                                line += 1;
                            }
                            pos += 1;
                        }
                    }
                }
            }
            '\'' | '"' => {
                let start_line = line;
                let (decoded, next, next_line) = scan_quoted(&chars, pos, line)?;
                if special {
                    return Err(RewriteError::UnresolvedSpecial {
                        token: decoded,
                        line: start_line,
                    });
                }
                out.push(c);
                out.push_str(&re_escape(&decoded, c));
                out.push(c);
                pos = next;
                line = next_line;
            }
            '$' => {
                pos += 1;
                match chars.get(pos) {
                    None => {
                        return Err(malformed("unexpected end of expression after `$`", line));
                    }
                    Some('$') => {
                        pos += 1;
                        special = !special;
                    }
                    Some(_) if special => {
                        return Err(malformed("unexpected `$` in special identifier", line));
                    }
                    Some(_) => {
                        let start_line = line;
                        let mut name = String::new();
                        loop {
                            match chars.get(pos) {
                                None => {
                                    return Err(malformed(
                                        "unterminated column reference",
                                        start_line,
                                    ));
                                }
                                Some('\\') => match chars.get(pos + 1) {
                                    Some('$') => {
                                        name.push('$');
                                        pos += 2;
                                    }
                                    Some('\\') => {
                                        name.push('\\');
                                        pos += 2;
                                    }
                                    Some(&o) => {
                                        name.push('\\');
                                        name.push(o);
                                        if o == '\n' {
                                            line += 1;
                                        }
                                        pos += 2;
                                    }
                                    None => {
                                        return Err(malformed(
                                            "unterminated column reference",
                                            start_line,
                                        ));
                                    }
                                },
                                Some('$') => {
                                    pos += 1;
                                    break;
                                }
                                Some(&o) => {
                                    if o == '\n' {
                                        line += 1;
                                    }
                                    name.push(o);
                                    pos += 1;
                                }
                            }
                        }
                        let Some((index, col)) =
                            spec.iter().enumerate().find(|(_, c)| c.name() == name)
                        else {
                            return Err(RewriteError::UnresolvedColumn {
                                name,
                                line: start_line,
                            });
                        };
                        let kind = col.kind().resolved_value_kind();
                        let field = col_field_name(index);
                        out.push_str(&field);
                        match kind {
                            ValueKind::Int => out.push_str(".int()"),
                            ValueKind::Real => out.push_str(".real()"),
                            ValueKind::Text => {}
                        }
                        fields.insert(field, kind);
                    }
                }
            }
            _ if special => {
                let start_line = line;
                let mut word = String::new();
                loop {
                    match chars.get(pos) {
                        None => {
                            return Err(malformed("unterminated special identifier", start_line));
                        }
                        Some('$') => break,
                        // Let the quote arm report the literal.
                        Some('\'' | '"') => break,
                        Some(&o) => {
                            if o == '\n' {
                                line += 1;
                            }
                            word.push(o);
                            pos += 1;
                        }
                    }
                }
                if matches!(chars.get(pos), Some('\'' | '"')) {
                    continue;
                }
                match word.as_str() {
                    ROW_INDEX => {
                        out.push_str(ROW_INDEX);
                        fields.insert(ROW_INDEX, ValueKind::Int);
                    }
                    ROW_KEY => {
                        out.push_str(ROW_KEY);
                        fields.insert(ROW_KEY, ValueKind::Text);
                    }
                    _ => {
                        return Err(RewriteError::UnresolvedSpecial {
                            token: word,
                            line: start_line,
                        });
                    }
                }
            }
            _ => {
                if c == '\n' {
                    line += 1;
                }
                out.push(c);
                pos += 1;
            }
        }
    }

    if special {
        return Err(malformed("unterminated special identifier", line));
    }

    Ok(Rewritten { body: out, fields })
}

/// Scans a quoted literal starting at the opening quote. Returns the decoded
/// content, the position after the closing quote and the updated line count.
/// Unknown escape sequences decode to the escaped character itself.
fn scan_quoted(
    chars: &[char],
    start: usize,
    line: u32,
) -> Result<(String, usize, u32), RewriteError> {
    let quote = chars[start];
    let start_line = line;
    let mut value = String::new();
    let mut pos = start + 1;
    let mut line = line;
    loop {
        match chars.get(pos) {
            None => return Err(malformed("unterminated string literal", start_line)),
            Some('\\') => {
                let Some(&esc) = chars.get(pos + 1) else {
                    return Err(malformed("unterminated string literal", start_line));
                };
                match esc {
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    't' => value.push('\t'),
                    other => {
                        if other == '\n' {
                            line += 1;
                        }
                        value.push(other);
                    }
                }
                pos += 2;
            }
            Some(&q) if q == quote => return Ok((value, pos + 1, line)),
            Some(&o) => {
                if o == '\n' {
                    line += 1;
                }
                value.push(o);
                pos += 1;
            }
        }
    }
}

/// Re-escapes a decoded literal so the emitted snippet source stays valid:
/// backslash, newline, carriage return and the enclosing quote character.
fn re_escape(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}
