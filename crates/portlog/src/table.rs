// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CSV encoding for rolling logs.
//!
//! Fields containing a comma, a double quote or a line break are quoted, with
//! embedded quotes doubled. Records end with `\n`; `\r\n` is accepted on read.

use std::borrow::Cow;

/// Records decoded from a table file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTable {
    /// Complete records, in file order. Blank lines are skipped.
    pub records: Vec<Vec<String>>,
    /// The text ended inside a record (no terminating newline).
    ///
    /// That record is not part of `records`.
    pub torn_tail: bool,
}

/// Quote a field if needed.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Encode one record, including the trailing newline.
pub fn encode_record<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_field(field.as_ref()));
    }
    line.push('\n');
    line
}

/// Decode a whole table.
///
/// Malformed quoting is read leniently: a quote in the middle of an unquoted
/// field is kept as a literal character.
pub fn parse(text: &str) -> ParsedTable {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut pending = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                pending = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                pending = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                let done = std::mem::take(&mut record);
                if !(done.len() == 1 && done[0].is_empty() && !pending) {
                    records.push(done);
                }
                pending = false;
            }
            _ => {
                field.push(c);
                pending = true;
            }
        }
    }

    ParsedTable {
        records,
        torn_tail: pending || in_quotes || !field.is_empty() || !record.is_empty(),
    }
}
