//! Credential Report CSV Decoding
//!
//! Maps the report's header names to column indices and decodes each record
//! into a `ReportRow`. Column order is whatever the service emits.

use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use tracing::debug;

use super::types::{AccessKey, ReportError, ReportRow};

/// Column indices for every field the report row needs
struct Columns {
    user: usize,
    password_enabled: usize,
    password_last_used: usize,
    password_last_changed: usize,
    mfa_active: usize,
    access_keys: [KeyColumns; 2],
}

struct KeyColumns {
    active: usize,
    last_used_date: usize,
    last_rotated: usize,
}

impl Columns {
    fn from_header(header: &StringRecord) -> Result<Self, ReportError> {
        // Later duplicates win, same as a plain name -> index map.
        let index: HashMap<&str, usize> = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();

        let column = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| ReportError::MissingColumn(name.to_string()))
        };
        let key_columns = |slot: u8| -> Result<KeyColumns, ReportError> {
            Ok(KeyColumns {
                active: column(format!("access_key_{}_active", slot).as_str())?,
                last_used_date: column(format!("access_key_{}_last_used_date", slot).as_str())?,
                last_rotated: column(format!("access_key_{}_last_rotated", slot).as_str())?,
            })
        };

        Ok(Self {
            user: column("user")?,
            password_enabled: column("password_enabled")?,
            password_last_used: column("password_last_used")?,
            password_last_changed: column("password_last_changed")?,
            mfa_active: column("mfa_active")?,
            access_keys: [key_columns(1)?, key_columns(2)?],
        })
    }

    fn decode(&self, record: &StringRecord) -> ReportRow {
        let field = |idx: usize| record.get(idx).unwrap_or_default().to_string();
        let flag = |idx: usize| parse_csv_bool(record.get(idx).unwrap_or_default());
        let key = |cols: &KeyColumns| AccessKey {
            active: flag(cols.active),
            last_used_date: field(cols.last_used_date),
            last_rotated: field(cols.last_rotated),
        };

        ReportRow {
            user: field(self.user),
            password_enabled: flag(self.password_enabled),
            password_last_used: field(self.password_last_used),
            password_last_changed: field(self.password_last_changed),
            mfa_active: flag(self.mfa_active),
            mfa_virtual: false,
            access_keys: [key(&self.access_keys[0]), key(&self.access_keys[1])],
        }
    }
}

/// Decode a credential report CSV payload into rows, preserving record order.
///
/// Fails on a missing required column or on malformed CSV (ragged records,
/// bad quoting); no partial result is returned.
pub fn parse_credential_report(content: &[u8]) -> Result<Vec<ReportRow>, ReportError> {
    check_quoting(content)?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(content);

    let columns = Columns::from_header(reader.headers()?)?;

    let rows = reader
        .records()
        .map(|record| record.map(|r| columns.decode(&r)).map_err(ReportError::from))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(rows = rows.len(), "Parsed credential report");
    Ok(rows)
}

/// Quote position within the current field
#[derive(Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    /// A `"` seen inside a quoted field: either an escape or the closing quote
    QuoteInQuoted,
}

/// Reject quoting the `csv` reader would otherwise accept silently: a `"`
/// inside an unquoted field, text after a closing quote, or a quoted field
/// left open at end of input.
fn check_quoting(content: &[u8]) -> Result<(), ReportError> {
    let mut state = QuoteState::FieldStart;
    let mut line = 1;

    for &byte in content {
        let separator = matches!(byte, b',' | b'\n' | b'\r');

        state = match (state, byte) {
            (QuoteState::Quoted, b'"') => QuoteState::QuoteInQuoted,
            (QuoteState::Quoted, _) => QuoteState::Quoted,
            (QuoteState::QuoteInQuoted, b'"') => QuoteState::Quoted,
            (QuoteState::QuoteInQuoted, _) if separator => QuoteState::FieldStart,
            (QuoteState::QuoteInQuoted, _) => {
                return Err(ReportError::MalformedCsv(format!(
                    "line {}: extraneous character after closing quote",
                    line
                )));
            }
            (QuoteState::FieldStart, b'"') => QuoteState::Quoted,
            (QuoteState::Unquoted, b'"') => {
                return Err(ReportError::MalformedCsv(format!(
                    "line {}: bare \" in non-quoted field",
                    line
                )));
            }
            (_, _) if separator => QuoteState::FieldStart,
            (_, _) => QuoteState::Unquoted,
        };

        if byte == b'\n' {
            line += 1;
        }
    }

    if state == QuoteState::Quoted {
        return Err(ReportError::MalformedCsv(format!(
            "line {}: unterminated quoted field",
            line
        )));
    }
    Ok(())
}

/// Only the exact token `true` is truthy
pub fn parse_csv_bool(value: &str) -> bool {
    value == "true"
}
