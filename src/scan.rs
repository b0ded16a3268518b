//! Single-pass field extraction over a chunked read.
//!
//! A source is read from the start in fixed-size chunks. Text fields are
//! matched per logical line, reassembled across chunk boundaries with a carry
//! buffer; binary fields are matched once their byte window has fully arrived,
//! stitched from the last few bytes of earlier chunks when it straddles a
//! boundary. Both field lists are walked with forward-only cursors, so each
//! field matches at most once per scan.

use std::io::{ErrorKind, Read};
use std::mem;

use crate::codec::RawValue;
use crate::field::{Addressing, FieldId, FieldSpec};
use crate::source::Source;
use crate::{Error, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 4096;
/// Smallest chunk the scanner will read with.
pub const MIN_CHUNK_SIZE: usize = 7;
/// Widest binary field; also the number of trailing bytes kept from previous
/// chunks for stitching.
const MAX_BINARY_WIDTH: usize = 8;

/// A value found for `field_id` during one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedValue {
    pub field_id: FieldId,
    pub raw: RawValue,
}

/// Reusable scan engine. Owns the chunk buffer so repeated scans do not
/// reallocate it.
#[derive(Debug)]
pub struct Scanner {
    chunk: Vec<u8>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Scanner {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk: vec![0u8; chunk_size.max(MIN_CHUNK_SIZE)],
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk.len()
    }

    /// Scan `source` from its first byte.
    ///
    /// `verbose` enables per-field warnings (lines too short for a column).
    ///
    /// # Errors
    ///
    /// - `Error::SourceUnavailable`: the source failed its access check or
    ///   could not be opened
    pub fn scan(&mut self, source: &mut Source, verbose: bool) -> Result<Vec<ExtractedValue>> {
        let (file, text_fields, binary_fields) = source.open_for_scan()?;
        Ok(self.scan_reader(file, text_fields, binary_fields, verbose))
    }

    /// Scan any reader against already sorted field lists.
    ///
    /// Never fails: read errors and allocation failures end the pass early and
    /// whatever was matched until then is returned.
    pub fn scan_reader<R: Read>(
        &mut self,
        reader: &mut R,
        text_fields: &[FieldSpec],
        binary_fields: &[FieldSpec],
        verbose: bool,
    ) -> Vec<ExtractedValue> {
        let mut pass = Pass::new(text_fields, binary_fields, verbose);
        while !pass.is_done() {
            let read = match reader.read(&mut self.chunk) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::warn!("read failed mid-scan, keeping partial result: {err}");
                    break;
                }
            };
            if let Err(err) = pass.feed(&self.chunk[..read]) {
                log::error!("scan aborted, keeping partial result: {err}");
                return pass.found;
            }
        }
        pass.finish()
    }
}

/// State of one pass over a source.
struct Pass<'a> {
    text_fields: &'a [FieldSpec],
    binary_fields: &'a [FieldSpec],
    verbose: bool,
    text_cursor: usize,
    binary_cursor: usize,
    row: usize,
    carry: Vec<u8>,
    consumed: u64,
    tail: [u8; MAX_BINARY_WIDTH],
    tail_len: usize,
    found: Vec<ExtractedValue>,
}

impl<'a> Pass<'a> {
    fn new(text_fields: &'a [FieldSpec], binary_fields: &'a [FieldSpec], verbose: bool) -> Self {
        Self {
            text_fields,
            binary_fields,
            verbose,
            text_cursor: 0,
            binary_cursor: 0,
            row: 0,
            carry: Vec::new(),
            consumed: 0,
            tail: [0u8; MAX_BINARY_WIDTH],
            tail_len: 0,
            found: Vec::with_capacity(text_fields.len() + binary_fields.len()),
        }
    }

    fn text_done(&self) -> bool {
        self.text_cursor >= self.text_fields.len()
    }

    fn binary_done(&self) -> bool {
        self.binary_cursor >= self.binary_fields.len()
    }

    fn is_done(&self) -> bool {
        self.text_done() && self.binary_done()
    }

    fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        if !self.binary_done() {
            self.match_binary(chunk)?;
        }
        if !self.text_done() {
            self.consume_lines(chunk)?;
        }
        self.consumed += chunk.len() as u64;
        if !self.binary_done() {
            self.remember_tail(chunk);
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<ExtractedValue> {
        if !self.carry.is_empty() && !self.text_done() {
            let line = mem::take(&mut self.carry);
            if let Err(err) = self.process_line(&line) {
                log::error!("scan aborted on last line: {err}");
            }
        }
        self.found
    }

    fn match_binary(&mut self, chunk: &[u8]) -> Result<()> {
        let fields = self.binary_fields;
        let start = self.consumed;
        let end = start + chunk.len() as u64;

        while let Some(field) = fields.get(self.binary_cursor) {
            let Addressing::Binary { offset, binary } = field.addressing else {
                self.binary_cursor += 1;
                continue;
            };
            let width = binary.width();
            if offset.saturating_add(width as u64) > end {
                break;
            }

            let mut window = [0u8; MAX_BINARY_WIDTH];
            if offset >= start {
                let at = (offset - start) as usize;
                window[..width].copy_from_slice(&chunk[at..at + width]);
            } else {
                let held = (start - offset) as usize;
                if held > self.tail_len {
                    log::warn!(
                        "binary field {:?} at offset {offset} fell out of the stitch window",
                        field.name
                    );
                    self.binary_cursor += 1;
                    continue;
                }
                let from_tail = held.min(width);
                let tail_at = self.tail_len - held;
                window[..from_tail].copy_from_slice(&self.tail[tail_at..tail_at + from_tail]);
                window[from_tail..width].copy_from_slice(&chunk[..width - from_tail]);
            }

            self.emit(field, &window[..width])?;
            self.binary_cursor += 1;
        }
        Ok(())
    }

    fn remember_tail(&mut self, chunk: &[u8]) {
        let keep = chunk.len().min(MAX_BINARY_WIDTH);
        for &byte in &chunk[chunk.len() - keep..] {
            if self.tail_len == MAX_BINARY_WIDTH {
                self.tail.copy_within(1.., 0);
                self.tail_len -= 1;
            }
            self.tail[self.tail_len] = byte;
            self.tail_len += 1;
        }
    }

    fn consume_lines(&mut self, chunk: &[u8]) -> Result<()> {
        let mut rest = chunk;
        while let Some(newline) = rest.iter().position(|&byte| byte == b'\n') {
            let line = &rest[..newline];
            rest = &rest[newline + 1..];
            if self.carry.is_empty() {
                self.process_line(line)?;
            } else {
                self.carry
                    .try_reserve(line.len())
                    .map_err(|_| Error::Alloc("line carry buffer"))?;
                self.carry.extend_from_slice(line);
                let mut joined = mem::take(&mut self.carry);
                self.process_line(&joined)?;
                joined.clear();
                self.carry = joined;
            }
            if self.text_done() {
                return Ok(());
            }
        }
        if !rest.is_empty() {
            self.carry
                .try_reserve(rest.len())
                .map_err(|_| Error::Alloc("line carry buffer"))?;
            self.carry.extend_from_slice(rest);
        }
        Ok(())
    }

    fn process_line(&mut self, line: &[u8]) -> Result<()> {
        let fields = self.text_fields;
        let row = self.row;
        self.row += 1;

        while let Some(field) = fields.get(self.text_cursor) {
            let Addressing::Text {
                row: wanted,
                column,
                separator,
            } = field.addressing
            else {
                self.text_cursor += 1;
                continue;
            };
            if wanted != row {
                break;
            }
            let token = line
                .split(|&byte| byte == separator)
                .filter(|token| !token.is_empty())
                .nth(column);
            match token {
                Some(token) => self.emit(field, token)?,
                None if self.verbose => log::warn!(
                    "could not read field {:?}: line {row} has fewer than {} columns",
                    field.name,
                    column.saturating_add(1)
                ),
                None => {}
            }
            self.text_cursor += 1;
        }
        Ok(())
    }

    fn emit(&mut self, field: &FieldSpec, bytes: &[u8]) -> Result<()> {
        let raw = match field.decode(bytes) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("could not decode field {:?}: {err}", field.name);
                return Ok(());
            }
        };
        self.found
            .try_reserve(1)
            .map_err(|_| Error::Alloc("extracted values"))?;
        self.found.push(ExtractedValue {
            field_id: field.id,
            raw,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BinaryType, Datatype};
    use std::io::Cursor;

    fn text(id: FieldId, row: usize, column: usize, separator: u8) -> FieldSpec {
        FieldSpec::new(
            id,
            format!("t{id}"),
            Addressing::Text {
                row,
                column,
                separator,
            },
            Datatype::Int64,
        )
    }

    fn values(found: &[ExtractedValue]) -> Vec<(FieldId, i64)> {
        found.iter().map(|v| (v.field_id, v.raw.as_i64())).collect()
    }

    #[test]
    fn separators_collapse_like_proc_tables() {
        let data = b"  a   b   c\n  1   22  333\n";
        let fields = [text(0, 1, 2, b' '), text(1, 1, 0, b' ')];
        // sorted by row, ties in insertion order
        let found = Scanner::new(64).scan_reader(&mut Cursor::new(&data[..]), &fields, &[], false);
        assert_eq!(values(&found), vec![(0, 333), (1, 1)]);
    }

    #[test]
    fn last_line_without_newline_is_processed() {
        let data = b"1\n2\n3";
        let fields = [text(0, 2, 0, b' ')];
        let found = Scanner::new(7).scan_reader(&mut Cursor::new(&data[..]), &fields, &[], false);
        assert_eq!(values(&found), vec![(0, 3)]);
    }

    #[test]
    fn short_line_produces_nothing() {
        let data = b"only one\n";
        let fields = [text(0, 0, 5, b' ')];
        let found = Scanner::new(16).scan_reader(&mut Cursor::new(&data[..]), &fields, &[], true);
        assert!(found.is_empty());
    }

    #[test]
    fn unreachable_column_reports_nothing() {
        let data = b"a b c\n";
        let fields = [text(0, 0, usize::MAX, b' ')];
        let found = Scanner::new(16).scan_reader(&mut Cursor::new(&data[..]), &fields, &[], true);
        assert!(found.is_empty());
    }

    #[test]
    fn binary_at_offset_zero() {
        let mut data = 513u16.to_ne_bytes().to_vec();
        data.extend_from_slice(&[0u8; 10]);
        let field = FieldSpec::new(
            3,
            "b",
            Addressing::Binary {
                offset: 0,
                binary: BinaryType::Uint16,
            },
            Datatype::Uint64,
        );
        let found =
            Scanner::new(7).scan_reader(&mut Cursor::new(data), &[], std::slice::from_ref(&field), false);
        assert_eq!(found, vec![ExtractedValue { field_id: 3, raw: RawValue::from_u64(513) }]);
    }

    /// Hands out at most three bytes per read.
    struct ShortReads(Cursor<Vec<u8>>);

    impl Read for ShortReads {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let limit = buf.len().min(3);
            self.0.read(&mut buf[..limit])
        }
    }

    #[test]
    fn binary_window_across_short_reads() {
        let mut data = vec![0xAAu8; 5];
        data.extend_from_slice(&(-123_456_789_i64).to_ne_bytes());
        data.extend_from_slice(&[0xBB; 4]);
        let field = FieldSpec::new(
            0,
            "wide",
            Addressing::Binary {
                offset: 5,
                binary: BinaryType::Int64,
            },
            Datatype::Int64,
        );
        let mut reader = ShortReads(Cursor::new(data));
        let found = Scanner::new(7).scan_reader(&mut reader, &[], std::slice::from_ref(&field), false);
        assert_eq!(values(&found), vec![(0, -123_456_789)]);
    }

    #[test]
    fn text_lines_across_short_reads() {
        let data = b"alpha 1\nbeta 22\ngamma 333\n".to_vec();
        let fields = [text(0, 1, 1, b' '), text(1, 2, 1, b' ')];
        let mut reader = ShortReads(Cursor::new(data));
        let found = Scanner::new(7).scan_reader(&mut reader, &fields, &[], false);
        assert_eq!(values(&found), vec![(0, 22), (1, 333)]);
    }

    #[test]
    fn offset_beyond_eof_never_matches() {
        let field = FieldSpec::new(
            0,
            "far",
            Addressing::Binary {
                offset: 100,
                binary: BinaryType::Uint8,
            },
            Datatype::Uint64,
        );
        let found = Scanner::new(8).scan_reader(
            &mut Cursor::new(vec![1u8; 50]),
            &[],
            std::slice::from_ref(&field),
            false,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn chunk_size_has_a_floor() {
        assert_eq!(Scanner::new(1).chunk_size(), MIN_CHUNK_SIZE);
        assert_eq!(Scanner::default().chunk_size(), DEFAULT_CHUNK_SIZE);
    }
}
