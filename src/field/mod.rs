//! Field definitions: what to read from a source and how to decode it.
//!
//! Fields are declared with a compact textual form,
//! `name:datatype@path+[param(;param)*]`, parsed by [`parse`]. See
//! [`parse::parse_field`] for the grammar.

pub mod parse;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::codec::{decode_binary, decode_text, BinaryType, Datatype, RawValue};
use crate::timeseries::TimeSeriesLog;
use crate::Result;

pub use parse::{parse, parse_field};

/// Registration id handed out to the host.
pub type FieldId = i32;

/// Where a field lives inside its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Token `column` of line `row` after splitting on `separator`. Both
    /// indices start at zero.
    Text {
        row: usize,
        column: usize,
        separator: u8,
    },
    /// `binary.width()` bytes starting at byte `offset`.
    Binary { offset: u64, binary: BinaryType },
}

/// How the host should render the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Isolated points.
    Point,
    /// A continuous line holding the last value.
    #[default]
    Last,
}

/// What `describe` reports back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMetadata {
    pub id: FieldId,
    pub name: String,
    pub unit: String,
    pub datatype: Datatype,
    pub mode: DisplayMode,
}

/// Outcome of feeding one extracted value into a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Stored,
    Repeated,
    Inactive,
}

#[derive(Debug)]
pub struct FieldSpec {
    pub id: FieldId,
    pub name: String,
    pub addressing: Addressing,
    pub datatype: Datatype,
    pub hex_input: bool,
    pub diff: bool,
    pub mode: DisplayMode,
    log: Option<TimeSeriesLog>,
}

impl FieldSpec {
    pub fn new(id: FieldId, name: impl Into<String>, addressing: Addressing, datatype: Datatype) -> Self {
        Self {
            id,
            name: name.into(),
            addressing,
            datatype,
            hex_input: false,
            diff: false,
            mode: DisplayMode::Last,
            log: None,
        }
    }

    /// Row for text fields, byte offset for binary fields.
    pub fn scan_key(&self) -> u64 {
        match self.addressing {
            Addressing::Text { row, .. } => row as u64,
            Addressing::Binary { offset, .. } => offset,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.addressing, Addressing::Binary { .. })
    }

    /// Decode a matched token (text) or byte window (binary).
    pub fn decode(&self, bytes: &[u8]) -> Result<RawValue> {
        match self.addressing {
            Addressing::Text { .. } => {
                let token: Cow<'_, str> = String::from_utf8_lossy(bytes);
                Ok(decode_text(&token, self.datatype, self.hex_input))
            }
            Addressing::Binary { binary, .. } => decode_binary(bytes, binary),
        }
    }

    pub fn metadata(&self) -> FieldMetadata {
        FieldMetadata {
            id: self.id,
            name: self.name.clone(),
            unit: String::new(),
            datatype: self.datatype,
            mode: self.mode,
        }
    }

    pub fn is_active(&self) -> bool {
        self.log.is_some()
    }

    /// Start logging with `baseline` as the first observed value.
    pub fn start_logging(&mut self, baseline: RawValue, capacity: usize) {
        self.log = Some(TimeSeriesLog::create(capacity, baseline));
    }

    pub fn log(&self) -> Option<&TimeSeriesLog> {
        self.log.as_ref()
    }

    pub fn log_mut(&mut self) -> Option<&mut TimeSeriesLog> {
        self.log.as_mut()
    }

    /// Append an extracted value observed at `timestamp` to the field's log.
    pub fn record(&mut self, value: RawValue, timestamp: u64) -> Result<Recorded> {
        let (diff, datatype) = (self.diff, self.datatype);
        let Some(log) = self.log.as_mut() else {
            return Ok(Recorded::Inactive);
        };
        let before = log.len();
        log.append(value, timestamp, diff, datatype)?;
        if log.len() > before {
            Ok(Recorded::Stored)
        } else {
            Ok(Recorded::Repeated)
        }
    }
}
