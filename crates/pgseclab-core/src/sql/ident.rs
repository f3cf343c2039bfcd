//! The only places where policy-supplied names and text become SQL.
//!
//! Every role, schema, table, column and type name goes through
//! [`quote_ident`]; every string literal goes through [`quote_literal`];
//! every dollar-quoted body goes through [`dollar_quote`].

/// Longest PostgreSQL identifier in bytes (NAMEDATALEN - 1). Longer names
/// are silently truncated by the server.
pub const MAX_IDENT_LEN: usize = 63;

/// Quote an identifier (always quoted, embedded `"` doubled).
pub fn quote_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push('"');
    for ch in ident.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Quote a string literal. Uses the `E''` form when backslashes are present
/// so the result does not depend on `standard_conforming_strings`.
pub fn quote_literal(value: &str) -> String {
    let escape = value.contains('\\');
    let mut out = String::with_capacity(value.len() + 3);
    if escape {
        out.push('E');
    }
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' if escape => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

const DOLLAR_TAG: &str = "pgseclab";

/// Wrap `body` in a dollar quote whose tag does not occur inside `body`.
pub fn dollar_quote(body: &str) -> String {
    let mut n = 0usize;
    loop {
        let tag = if n == 0 {
            format!("${DOLLAR_TAG}$")
        } else {
            format!("${DOLLAR_TAG}{n}$")
        };
        if !body.contains(&tag) {
            return format!("{tag}\n{body}\n{tag}");
        }
        n += 1;
    }
}
