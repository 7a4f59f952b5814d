//! Shared helper functions for dialect implementations.
//!
//! Every piece of escaping and quoting goes through this module so the two
//! dialects cannot drift apart.

use chrono::NaiveDateTime;

use crate::ast::expr::is_valid_identifier;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote with backticks, doubling any inner backtick.
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Plain identifiers print bare, anything else is backticked.
pub fn quote_alias(alias: &str) -> String {
    if is_valid_identifier(alias) {
        alias.to_string()
    } else {
        quote_backtick(alias)
    }
}

// =============================================================================
// String Quoting
// =============================================================================

/// Escape `\`, `'` and every control character. `\n`, `\r` and `\t` keep
/// their short forms; the rest become `\xNN`.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // Control characters are all below U+00A0, so two hex digits suffice.
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_string`]. Unknown escapes are kept as written.
pub fn unescape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('x') => {
                let hex: String = chars.clone().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) if hex.len() == 2 => {
                        out.push(char::from(byte));
                        chars.nth(1);
                    }
                    _ => out.push_str("\\x"),
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Single-quoted string literal for the event dialect.
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", escape_string(s))
}

/// Escape `\` and `"` for a double-quoted MQL string.
pub fn escape_mql(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Inverse of [`escape_mql`].
pub fn unescape_mql(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match (c, chars.clone().next()) {
            ('\\', Some(next @ ('\\' | '"'))) => {
                out.push(next);
                chars.next();
            }
            (c, _) => out.push(c),
        }
    }
    out
}

/// Double-quoted string literal for MQL.
pub fn quote_string_double(s: &str) -> String {
    format!("\"{}\"", escape_mql(s))
}

// =============================================================================
// Literal Formatting
// =============================================================================

pub fn format_bool_upper(b: bool) -> &'static str {
    if b {
        "TRUE"
    } else {
        "FALSE"
    }
}

pub fn format_bool_lower(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Shortest round-trip form; always carries a `.` or an exponent.
pub fn format_float(f: f64) -> String {
    let mut buffer = ryu::Buffer::new();
    buffer.format(f).to_string()
}

pub fn format_datetime_iso(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// `toDateTime('2021-01-01T00:00:00.000000')`.
pub fn format_datetime_call(dt: &NaiveDateTime) -> String {
    format!("toDateTime('{}')", format_datetime_iso(dt))
}

/// Entity sample rate: integral rates keep one decimal, fractions get six.
pub fn format_sample(sample: f64) -> String {
    if sample.fract() == 0.0 {
        format!("{sample:.1}")
    } else {
        format!("{sample:.6}")
    }
}
