//! Parser for textual field definitions.
//!
//! ```text
//! name:datatype@path+[param(;param)*]
//! ```
//!
//! | datatype                          | decoding                       |
//! |-----------------------------------|--------------------------------|
//! | `int` (default), `int_hex`        | signed 64-bit text             |
//! | `uint`, `uint_hex`                | unsigned 64-bit text           |
//! | `float`, `double`                 | double text                    |
//! | `int8_bin` .. `int64_bin`         | signed binary, widened         |
//! | `uint8_bin` .. `uint64_bin`       | unsigned binary, widened       |
//! | `float_bin`, `double_bin`         | IEEE binary, widened to double |
//!
//! Parameters dispatch on their first letter, case-insensitively:
//! `c=<col>`, `r=<row>` (alias `l`), `s=<separator>`, `d` (diff from the first
//! value), `p` (point mode), `a` (line mode), `b=<offset>` (binary byte
//! offset, accepts `0x`/`0` prefixes). When both `p` and `a` appear the last
//! one wins.

use std::path::PathBuf;

use crate::codec::{parse_signed, parse_unsigned, BinaryType, Datatype};
use crate::field::{Addressing, DisplayMode, FieldId, FieldSpec};
use crate::source::Source;
use crate::{Error, Result};

const DEFAULT_SEPARATOR: u8 = b' ';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TypeName {
    datatype: Datatype,
    hex: bool,
    binary: Option<BinaryType>,
}

impl TypeName {
    const fn text(datatype: Datatype, hex: bool) -> Self {
        Self {
            datatype,
            hex,
            binary: None,
        }
    }

    const fn binary(binary: BinaryType, datatype: Datatype) -> Self {
        Self {
            datatype,
            hex: false,
            binary: Some(binary),
        }
    }
}

#[derive(Debug, Default)]
struct Params {
    row: usize,
    column: usize,
    separator: Option<u8>,
    diff: bool,
    point: bool,
    offset: Option<u64>,
}

/// Parse a definition into a fresh [`Source`] holding exactly that field.
///
/// The registry merges it into an existing source with the same path.
pub fn parse(spec: &str, id: FieldId) -> Result<Source> {
    let (path, field) = parse_field(spec, id)?;
    let mut source = Source::new(path);
    source.insert(field)?;
    Ok(source)
}

/// Parse a definition into the source path and the field it describes.
///
/// # Errors
///
/// - `Error::Config`: no `@`, no `+` after the path, empty name or path
pub fn parse_field(spec: &str, id: FieldId) -> Result<(PathBuf, FieldSpec)> {
    let Some((head, tail)) = spec.split_once('@') else {
        return Err(Error::Config(format!("missing '@' in {spec:?}")));
    };
    let (name, type_name) = head.split_once(':').unwrap_or((head, ""));
    if name.is_empty() {
        return Err(Error::Config(format!("missing field name in {spec:?}")));
    }
    let Some((path, params)) = tail.split_once('+') else {
        return Err(Error::Config(format!("missing '+' after the path in {spec:?}")));
    };
    if path.is_empty() {
        return Err(Error::Config(format!("missing path in {spec:?}")));
    }

    let kind = parse_type_name(type_name);
    let params = parse_params(params);

    let addressing = match (kind.binary, params.offset) {
        (Some(binary), offset) => Addressing::Binary {
            offset: offset.unwrap_or(0),
            binary,
        },
        (None, Some(offset)) => Addressing::Binary {
            offset,
            binary: BinaryType::full_width(kind.datatype),
        },
        (None, None) => Addressing::Text {
            row: params.row,
            column: params.column,
            separator: params.separator.unwrap_or(DEFAULT_SEPARATOR),
        },
    };

    let mut field = FieldSpec::new(id, name, addressing, kind.datatype);
    field.hex_input = kind.hex && kind.binary.is_none() && params.offset.is_none();
    field.diff = params.diff;
    field.mode = if params.point {
        DisplayMode::Point
    } else {
        DisplayMode::Last
    };
    Ok((PathBuf::from(path), field))
}

fn parse_type_name(name: &str) -> TypeName {
    const NAMES: &[(&str, TypeName)] = &[
        ("int", TypeName::text(Datatype::Int64, false)),
        ("int_hex", TypeName::text(Datatype::Int64, true)),
        ("uint", TypeName::text(Datatype::Uint64, false)),
        ("uint_hex", TypeName::text(Datatype::Uint64, true)),
        ("float", TypeName::text(Datatype::Double, false)),
        ("double", TypeName::text(Datatype::Double, false)),
        ("int8_bin", TypeName::binary(BinaryType::Int8, Datatype::Int64)),
        ("int16_bin", TypeName::binary(BinaryType::Int16, Datatype::Int64)),
        ("int32_bin", TypeName::binary(BinaryType::Int32, Datatype::Int64)),
        ("int64_bin", TypeName::binary(BinaryType::Int64, Datatype::Int64)),
        ("uint8_bin", TypeName::binary(BinaryType::Uint8, Datatype::Uint64)),
        ("uint16_bin", TypeName::binary(BinaryType::Uint16, Datatype::Uint64)),
        ("uint32_bin", TypeName::binary(BinaryType::Uint32, Datatype::Uint64)),
        ("uint64_bin", TypeName::binary(BinaryType::Uint64, Datatype::Uint64)),
        ("float_bin", TypeName::binary(BinaryType::Float32, Datatype::Double)),
        ("double_bin", TypeName::binary(BinaryType::Float64, Datatype::Double)),
    ];

    if name.is_empty() {
        return TypeName::text(Datatype::Int64, false);
    }
    match NAMES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
    {
        Some((_, kind)) => *kind,
        None => {
            log::warn!("unknown datatype {name:?}, decoding as signed integer text");
            TypeName::text(Datatype::Int64, false)
        }
    }
}

fn parse_params(params: &str) -> Params {
    let mut out = Params::default();
    for token in params.split(';').filter(|token| !token.is_empty()) {
        let value = token.split_once('=').map(|(_, value)| value);
        let Some(letter) = token.chars().next() else {
            continue;
        };
        match letter.to_ascii_lowercase() {
            'c' => match value {
                Some(value) => out.column = index(value, "column"),
                None => log::warn!("option c has no value, ignoring {token:?}"),
            },
            'r' | 'l' => match value {
                Some(value) => out.row = index(value, "row"),
                None => log::warn!("option r has no value, ignoring {token:?}"),
            },
            // `s=` alone selects NUL, which keeps the whole line as one token.
            's' => match value {
                Some(value) => out.separator = Some(value.bytes().next().unwrap_or(0)),
                None => log::warn!("option s has no value, ignoring {token:?}"),
            },
            'd' => out.diff = true,
            'p' => out.point = true,
            'a' => out.point = false,
            'b' => match value {
                Some(value) => out.offset = Some(offset(value)),
                None => log::warn!("option b has no value, ignoring {token:?}"),
            },
            _ => log::warn!("ignoring unknown option {token:?}"),
        }
    }
    out
}

/// Row or column index. Negative values are kept as an index no line ever
/// reaches, so the field registers but can not be activated.
fn index(value: &str, what: &str) -> usize {
    let parsed = parse_signed(value, 10);
    usize::try_from(parsed).unwrap_or_else(|_| {
        log::warn!("negative {what} {parsed} never matches");
        usize::MAX
    })
}

fn offset(value: &str) -> u64 {
    let value = value.trim_start();
    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        parse_unsigned(hex, 16)
    } else if value.len() > 1 && value.starts_with('0') {
        parse_unsigned(&value[1..], 8)
    } else {
        parse_unsigned(value, 10)
    }
}
