//! SQL text building: escaping, literal serialization and `$(key)` templates.
//!
//! Everything here produces plain SQL text for COM_QUERY; there are no
//! server-side placeholders in the text protocol.

use std::fmt::Write as _;

use crate::error::{Error, Result};

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn escape_identifier(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len() + 2);
    write_identifier(&mut out, identifier);
    out
}

fn write_identifier(out: &mut String, identifier: &str) {
    out.push('`');
    for c in identifier.chars() {
        if c == '`' {
            out.push('`');
        }
        out.push(c);
    }
    out.push('`');
}

/// Quote a string literal with single quotes, backslash-escaping
/// `\0 ' " \b \n \r \t \x1a \\`.
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    write_string(&mut out, value);
    out
}

fn write_string(out: &mut String, value: &str) {
    out.push('\'');
    for c in value.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\u{8}' => out.push_str("\\b"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{1a}' => out.push_str("\\Z"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

/// A value that can be written into SQL text as a literal.
pub trait ToSql {
    /// Append the literal form of `self` to `out`.
    fn write_sql(&self, out: &mut String);

    /// The value as a bare identifier, for `$$(key)` template slots.
    fn as_identifier(&self) -> Option<&str> {
        None
    }
}

impl<T: ToSql + ?Sized> ToSql for &T {
    fn write_sql(&self, out: &mut String) {
        (**self).write_sql(out);
    }

    fn as_identifier(&self) -> Option<&str> {
        (**self).as_identifier()
    }
}

impl ToSql for bool {
    fn write_sql(&self, out: &mut String) {
        out.push_str(if *self { "true" } else { "false" });
    }
}

macro_rules! impl_to_sql_integer {
    ($($ty:ty),*) => {
        $(
            impl ToSql for $ty {
                fn write_sql(&self, out: &mut String) {
                    let _ = write!(out, "{}", self);
                }
            }
        )*
    };
}

impl_to_sql_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! impl_to_sql_float {
    ($($ty:ty),*) => {
        $(
            impl ToSql for $ty {
                /// NaN and infinities have no SQL literal and are written as `NULL`.
                fn write_sql(&self, out: &mut String) {
                    if self.is_finite() {
                        let _ = write!(out, "{}", self);
                    } else {
                        out.push_str("NULL");
                    }
                }
            }
        )*
    };
}

impl_to_sql_float!(f32, f64);

impl ToSql for str {
    fn write_sql(&self, out: &mut String) {
        write_string(out, self);
    }

    fn as_identifier(&self) -> Option<&str> {
        Some(self)
    }
}

impl ToSql for String {
    fn write_sql(&self, out: &mut String) {
        write_string(out, self);
    }

    fn as_identifier(&self) -> Option<&str> {
        Some(self)
    }
}

impl<T: ToSql> ToSql for Option<T> {
    fn write_sql(&self, out: &mut String) {
        match self {
            Some(value) => value.write_sql(out),
            None => out.push_str("NULL"),
        }
    }
}

/// Comma-joined, for `IN ($(ids))`.
impl<T: ToSql> ToSql for [T] {
    fn write_sql(&self, out: &mut String) {
        for (i, value) in self.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            value.write_sql(out);
        }
    }
}

impl<T: ToSql> ToSql for Vec<T> {
    fn write_sql(&self, out: &mut String) {
        self.as_slice().write_sql(out);
    }
}

impl ToSql for crate::value::Value {
    fn write_sql(&self, out: &mut String) {
        use crate::value::Value;
        match self {
            Value::Null => out.push_str("NULL"),
            Value::Bool(v) => v.write_sql(out),
            Value::Int(v) => v.write_sql(out),
            Value::UInt(v) => v.write_sql(out),
            Value::Double(v) => v.write_sql(out),
            Value::Decimal(v) if is_numeric_literal(v) => out.push_str(v),
            Value::Decimal(v) => write_string(out, v),
            Value::Text(v) => write_string(out, v),
            Value::Bytes(v) => {
                out.push_str("X'");
                for b in v {
                    let _ = write!(out, "{b:02X}");
                }
                out.push('\'');
            }
        }
    }
}

/// `[+-]digits[.digits][(e|E)[+-]digits]`, with digits on at least one
/// side of the point.
fn is_numeric_literal(text: &str) -> bool {
    fn digits(s: &[u8]) -> usize {
        s.iter().take_while(|b| b.is_ascii_digit()).count()
    }

    let bytes = text.as_bytes();
    let mut pos = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = digits(&bytes[pos..]);
    pos += int_digits;
    let mut frac_digits = 0;
    if bytes.get(pos) == Some(&b'.') {
        pos += 1;
        frac_digits = digits(&bytes[pos..]);
        pos += frac_digits;
    }
    if int_digits + frac_digits == 0 {
        return false;
    }
    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        pos += 1;
        if matches!(bytes.get(pos), Some(b'+' | b'-')) {
            pos += 1;
        }
        let exp_digits = digits(&bytes[pos..]);
        if exp_digits == 0 {
            return false;
        }
        pos += exp_digits;
    }
    pos == bytes.len()
}

/// Write a single value as a SQL literal.
pub fn to_sql(value: &dyn ToSql) -> String {
    let mut out = String::new();
    value.write_sql(&mut out);
    out
}

fn lookup<'p>(params: &[(&str, &'p dyn ToSql)], key: &str) -> Result<&'p dyn ToSql> {
    params
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, value)| *value)
        .ok_or_else(|| Error::InvalidUsage(format!("missing key: {key:?} in parameters")))
}

/// Interpolate a SQL template.
///
/// `$(key)` is replaced with the literal of the named parameter and
/// `$$(key)` with the parameter escaped as an identifier. A `$` not
/// followed by `(` or `$(`, or a slot without a closing `)`, is copied
/// through unchanged.
///
/// ```
/// use wisp_mysql::sql::{ToSql, build_sql};
///
/// let ids = vec![1, 2];
/// let params: [(&str, &dyn ToSql); 3] = [("table", &"users"), ("ids", &ids), ("name", &"o'hara")];
/// let sql = build_sql(
///     "SELECT * FROM $$(table) WHERE id IN ($(ids)) AND name = $(name)",
///     &params,
/// )
/// .unwrap();
/// assert_eq!(sql, "SELECT * FROM `users` WHERE id IN (1,2) AND name = 'o\\'hara'");
/// ```
pub fn build_sql(template: &str, params: &[(&str, &dyn ToSql)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let (identifier, open) = if tail.starts_with("$$(") {
            (true, 3)
        } else if tail.starts_with("$(") {
            (false, 2)
        } else {
            out.push('$');
            rest = &tail[1..];
            continue;
        };

        let Some(close) = tail[open..].find(')') else {
            out.push_str(tail);
            return Ok(out);
        };
        let key = &tail[open..open + close];
        let value = lookup(params, key)?;
        if identifier {
            let name = value.as_identifier().ok_or_else(|| {
                Error::InvalidUsage(format!("sql identifier must be a string: {key:?}"))
            })?;
            write_identifier(&mut out, name);
        } else {
            value.write_sql(&mut out);
        }
        rest = &tail[open + close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Build a multi-row `INSERT INTO` statement.
///
/// Returns `Ok(None)` when there are no rows. Every row must have one value
/// per column.
pub fn build_insert(
    table: &str,
    columns: &[&str],
    rows: &[&[&dyn ToSql]],
) -> Result<Option<String>> {
    if rows.is_empty() {
        return Ok(None);
    }
    if columns.is_empty() {
        return Err(Error::InvalidUsage("insert requires at least one column".into()));
    }

    let mut out = String::from("INSERT INTO ");
    write_identifier(&mut out, table);
    out.push_str(" (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_identifier(&mut out, column);
    }
    out.push_str(") VALUES ");

    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(Error::InvalidUsage(format!(
                "insert row {i} has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        if i > 0 {
            out.push(',');
        }
        out.push('(');
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            value.write_sql(&mut out);
        }
        out.push(')');
    }
    Ok(Some(out))
}
