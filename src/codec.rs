//! Conversion of raw text tokens and fixed-width byte windows into values.
//!
//! Every extracted value travels as a [`RawValue`]: the 64-bit pattern of a
//! signed integer, an unsigned integer, or an IEEE double. The owning field's
//! [`Datatype`] says how to read the bits back ([`RawValue::typed`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Logical datatype of a field, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    Int64,
    Uint64,
    Double,
}

/// Concrete on-disk encoding of a binary field. Only used for byte decoding;
/// the decoded value is narrowed into a [`Datatype`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl BinaryType {
    /// Number of bytes occupied in the source.
    pub fn width(self) -> usize {
        match self {
            BinaryType::Int8 | BinaryType::Uint8 => 1,
            BinaryType::Int16 | BinaryType::Uint16 => 2,
            BinaryType::Int32 | BinaryType::Uint32 | BinaryType::Float32 => 4,
            BinaryType::Int64 | BinaryType::Uint64 | BinaryType::Float64 => 8,
        }
    }

    pub fn datatype(self) -> Datatype {
        match self {
            BinaryType::Int8 | BinaryType::Int16 | BinaryType::Int32 | BinaryType::Int64 => {
                Datatype::Int64
            }
            BinaryType::Uint8 | BinaryType::Uint16 | BinaryType::Uint32 | BinaryType::Uint64 => {
                Datatype::Uint64
            }
            BinaryType::Float32 | BinaryType::Float64 => Datatype::Double,
        }
    }

    /// The full-width binary encoding of a logical datatype.
    pub fn full_width(datatype: Datatype) -> Self {
        match datatype {
            Datatype::Int64 => BinaryType::Int64,
            Datatype::Uint64 => BinaryType::Uint64,
            Datatype::Double => BinaryType::Float64,
        }
    }
}

/// A 64-bit value container shared by all three datatypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawValue(pub u64);

impl RawValue {
    pub fn from_i64(value: i64) -> Self {
        RawValue(value as u64)
    }

    pub fn from_u64(value: u64) -> Self {
        RawValue(value)
    }

    pub fn from_f64(value: f64) -> Self {
        RawValue(value.to_bits())
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Reconstruct the logical value using the owning field's datatype.
    pub fn typed(self, datatype: Datatype) -> Value {
        match datatype {
            Datatype::Int64 => Value::Signed(self.as_i64()),
            Datatype::Uint64 => Value::Unsigned(self.0),
            Datatype::Double => Value::Double(self.as_f64()),
        }
    }
}

/// A decoded value with its logical type attached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Signed(i64),
    Unsigned(u64),
    Double(f64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Signed(v) => write!(f, "{v}"),
            Value::Unsigned(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
        }
    }
}

/// Decode a text token.
///
/// Integral datatypes are parsed in base 10, or base 16 when `hex` is set (an
/// optional `0x`/`0X` after the sign is stripped). Doubles are always decimal.
/// Parsing is permissive: leading whitespace is skipped, trailing garbage is
/// ignored, a token without digits yields zero and out-of-range integers
/// saturate.
pub fn decode_text(token: &str, datatype: Datatype, hex: bool) -> RawValue {
    let radix = if hex && datatype != Datatype::Double {
        16
    } else {
        10
    };
    match datatype {
        Datatype::Int64 => RawValue::from_i64(parse_signed(token, radix)),
        Datatype::Uint64 => RawValue::from_u64(parse_unsigned(token, radix)),
        Datatype::Double => RawValue::from_f64(parse_double(token)),
    }
}

/// Decode a fixed-width byte window in native byte order.
///
/// Narrow integers are sign- or zero-extended, `Float32` is widened to a
/// double. `bytes` must be exactly `binary.width()` long.
pub fn decode_binary(bytes: &[u8], binary: BinaryType) -> Result<RawValue> {
    if bytes.len() != binary.width() {
        return Err(Error::Config(format!(
            "{binary:?} needs {} bytes, got {}",
            binary.width(),
            bytes.len()
        )));
    }
    let value = match binary {
        BinaryType::Int8 => RawValue::from_i64(i8::from_ne_bytes(window(bytes)) as i64),
        BinaryType::Int16 => RawValue::from_i64(i16::from_ne_bytes(window(bytes)) as i64),
        BinaryType::Int32 => RawValue::from_i64(i32::from_ne_bytes(window(bytes)) as i64),
        BinaryType::Int64 => RawValue::from_i64(i64::from_ne_bytes(window(bytes))),
        BinaryType::Uint8 => RawValue::from_u64(bytes[0] as u64),
        BinaryType::Uint16 => RawValue::from_u64(u16::from_ne_bytes(window(bytes)) as u64),
        BinaryType::Uint32 => RawValue::from_u64(u32::from_ne_bytes(window(bytes)) as u64),
        BinaryType::Uint64 => RawValue::from_u64(u64::from_ne_bytes(window(bytes))),
        BinaryType::Float32 => RawValue::from_f64(f32::from_ne_bytes(window(bytes)) as f64),
        BinaryType::Float64 => RawValue::from_f64(f64::from_ne_bytes(window(bytes))),
    };
    Ok(value)
}

/// Subtract `baseline` from `current` in the arithmetic of `datatype` when
/// `diff` is set; otherwise return `current` untouched.
///
/// Integers wrap on overflow, doubles follow IEEE subtraction.
pub fn apply_diff(current: RawValue, baseline: RawValue, datatype: Datatype, diff: bool) -> RawValue {
    if !diff {
        return current;
    }
    match datatype {
        Datatype::Int64 => RawValue::from_i64(current.as_i64().wrapping_sub(baseline.as_i64())),
        Datatype::Uint64 => RawValue::from_u64(current.0.wrapping_sub(baseline.0)),
        Datatype::Double => RawValue::from_f64(current.as_f64() - baseline.as_f64()),
    }
}

fn window<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Skip leading whitespace and an optional sign, then the `0x`/`0X` prefix
/// when parsing base 16.
fn split_sign(token: &str, radix: u32) -> (bool, &str) {
    let token = token.trim_start();
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    (negative, digits)
}

pub(crate) fn parse_signed(token: &str, radix: u32) -> i64 {
    let (negative, digits) = split_sign(token, radix);
    let mut acc: i64 = 0;
    for digit in digits.chars().map_while(|c| c.to_digit(radix)) {
        let next = acc.checked_mul(radix as i64).and_then(|v| {
            if negative {
                v.checked_sub(digit as i64)
            } else {
                v.checked_add(digit as i64)
            }
        });
        match next {
            Some(v) => acc = v,
            None => return if negative { i64::MIN } else { i64::MAX },
        }
    }
    acc
}

pub(crate) fn parse_unsigned(token: &str, radix: u32) -> u64 {
    let (negative, digits) = split_sign(token, radix);
    let mut acc: u64 = 0;
    for digit in digits.chars().map_while(|c| c.to_digit(radix)) {
        match acc
            .checked_mul(radix as u64)
            .and_then(|v| v.checked_add(digit as u64))
        {
            Some(v) => acc = v,
            None => return u64::MAX,
        }
    }
    if negative {
        acc.wrapping_neg()
    } else {
        acc
    }
}

fn parse_double(token: &str) -> f64 {
    let text = token.trim_start();
    let bytes = text.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));

    for word in ["infinity", "inf", "nan"] {
        let matched = text
            .get(end..end + word.len())
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(word));
        if matched {
            return text[..end + word.len()].parse().unwrap_or(0.0);
        }
    }

    let mut digits = 0;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
        digits += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return 0.0;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    text[..end].parse().unwrap_or(0.0)
}
