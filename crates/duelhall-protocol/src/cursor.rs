//! Little-endian byte cursor used by every parser in this crate.
//!
//! Reads never panic: running past the end yields [`OutOfRange`], which
//! converts into both [`ProtocolError`](crate::ProtocolError) and
//! [`CoreMessageError`](crate::CoreMessageError) via `?`.

use crate::error::OutOfRange;

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], OutOfRange> {
        let out_of_range = OutOfRange {
            offset: self.pos,
            needed: n,
            len: self.buf.len(),
        };
        let end = self.pos.checked_add(n).ok_or(out_of_range)?;
        let bytes = self.buf.get(self.pos..end).ok_or(out_of_range)?;
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), OutOfRange> {
        self.take(n).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], OutOfRange> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, OutOfRange> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, OutOfRange> {
        self.array().map(u16::from_le_bytes)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, OutOfRange> {
        self.array().map(u32::from_le_bytes)
    }

    pub(crate) fn i32(&mut self) -> Result<i32, OutOfRange> {
        self.array().map(i32::from_le_bytes)
    }

    pub(crate) fn u64(&mut self) -> Result<u64, OutOfRange> {
        self.array().map(u64::from_le_bytes)
    }

    /// Reads a fixed array of `units` UTF-16LE code units and returns the
    /// text up to the first NUL.
    pub(crate) fn utf16_fixed(&mut self, units: usize) -> Result<String, OutOfRange> {
        let bytes = self.take(units * 2)?;
        Ok(utf16_until_nul(bytes))
    }
}

pub(crate) fn utf16_until_nul(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Writes `text` as UTF-16LE into exactly `units` code units, truncating
/// and always leaving room for a terminating NUL.
pub(crate) fn put_utf16_fixed(out: &mut Vec<u8>, text: &str, units: usize) {
    let mut written = 0;
    for unit in text.encode_utf16().take(units.saturating_sub(1)) {
        out.extend_from_slice(&unit.to_le_bytes());
        written += 1;
    }
    out.resize(out.len() + (units - written) * 2, 0);
}

/// Writes `text` as NUL-terminated UTF-16LE.
pub(crate) fn put_utf16(out: &mut Vec<u8>, text: &str) {
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
}

/// Overwrites four bytes at `offset` with zero. `offset` must come from a
/// [`Reader`] over a buffer of the same length, so it is always in range.
pub(crate) fn zero_u32(out: &mut [u8], offset: usize) {
    if let Some(slot) = out.get_mut(offset..offset + 4) {
        slot.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_past_end_reports_offset() {
        let mut reader = Reader::new(&[1, 2, 3]);
        assert_eq!(reader.u16().unwrap(), 0x0201);
        let err = reader.u32().unwrap_err();
        assert_eq!(
            err,
            OutOfRange {
                offset: 2,
                needed: 4,
                len: 3
            }
        );
        // A failed read doesn't advance.
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_utf16_fixed_stops_at_nul() {
        let mut buf = Vec::new();
        put_utf16_fixed(&mut buf, "Yugi", 20);
        assert_eq!(buf.len(), 40);
        let mut reader = Reader::new(&buf);
        assert_eq!(reader.utf16_fixed(20).unwrap(), "Yugi");
    }

    #[test]
    fn test_utf16_fixed_truncates_long_text() {
        let mut buf = Vec::new();
        put_utf16_fixed(&mut buf, &"x".repeat(50), 20);
        assert_eq!(buf.len(), 40);
        assert_eq!(utf16_until_nul(&buf).len(), 19);
    }
}
