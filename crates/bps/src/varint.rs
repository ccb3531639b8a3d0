//! The BPS variable-length integer: 7-bit groups, little-endian, with each
//! non-terminal group decremented by one before the next is read.
use crate::error::{Error, Reason};
use byteorder::WriteBytesExt;
use std::io;
use std::io::prelude::*;

/// Reads a BPS varint, matching the `ReadNumber::read_number` shape from the
/// multi-format patcher this crate grew out of, minus the `checked` crate:
/// `u64::checked_mul`/`checked_add` already give us the overflow detection we
/// need without a third-party `Checked<u64>` wrapper. A short read (the
/// stream ends before a terminator byte) is reclassified from a raw
/// `io::Error` into `CorruptFile(TruncatedVarint)` directly, distinct from the
/// reader's own `CorruptFile(EarlyEof)` (which covers a missing opcode or
/// trailer, not a mid-varint truncation); only a genuine I/O failure (not
/// just running out of bytes) propagates as `Error::Io`.
pub trait ReadVarInt: Read {
  fn read_varint(&mut self) -> Result<u64, Error> {
    let mut data: u64 = 0;
    let mut shift: u64 = 1;
    loop {
      let mut byte = [0u8; 1];
      match self.read_exact(&mut byte) {
        Ok(()) => {}
        Err(e)
          if matches!(
            e.kind(),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData
          ) =>
        {
          return Err(Error::CorruptFile(Reason::TruncatedVarint));
        }
        Err(e) => return Err(Error::Io(e)),
      }
      let byte = byte[0];
      let group = u64::from(byte & 0x7F);
      let Some(scaled) = group.checked_mul(shift) else {
        return Err(Error::CorruptFile(Reason::VarintOverflow));
      };
      let Some(new_value) = scaled.checked_add(data) else {
        return Err(Error::CorruptFile(Reason::VarintOverflow));
      };
      if byte & 0x80 == 0x80 {
        return Ok(new_value);
      }
      let Some(next_shift) = shift.checked_shl(7) else {
        return Err(Error::CorruptFile(Reason::VarintOverflow));
      };
      shift = next_shift;
      let Some(next_data) = new_value.checked_add(shift) else {
        return Err(Error::CorruptFile(Reason::VarintOverflow));
      };
      data = next_data;
    }
  }
}

impl<R: Read> ReadVarInt for R {}

pub trait WriteVarInt: Write {
  fn write_varint(&mut self, mut n: u64) -> io::Result<()> {
    loop {
      if n <= 0x7F {
        self.write_u8(n as u8 | 0x80)?;
        return Ok(());
      }
      self.write_u8((n & 0x7F) as u8)?;
      n >>= 7;
      n -= 1;
    }
  }
}

impl<W: Write> WriteVarInt for W {}

/// Encodes a signed offset as a varint whose low bit carries the sign.
pub fn encode_signed(offset: i64) -> u64 {
  let magnitude = offset.unsigned_abs();
  (magnitude << 1) | u64::from(offset < 0)
}

/// Inverse of [`encode_signed`]. `encoded >> 1` always fits in an i64 because
/// the largest legal varint payload is 63 bits.
pub fn decode_signed(encoded: u64) -> i64 {
  let magnitude = (encoded >> 1) as i64;
  if encoded & 1 == 1 {
    -magnitude
  } else {
    magnitude
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn read_varint_matches_reference_decoding() {
    let mut reader = Cursor::new(vec![0x0E, 0xB0, 0x80, 0x00u8]);
    let value = reader.read_varint().unwrap();
    assert_eq!(value, 6286);
  }

  #[test]
  fn round_trips_through_write_and_read() {
    for n in [0u64, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX >> 1] {
      let mut buf = Vec::new();
      buf.write_varint(n).unwrap();
      let mut cursor = Cursor::new(buf);
      assert_eq!(cursor.read_varint().unwrap(), n);
    }
  }

  #[test]
  fn signed_zero_is_legal_and_positive() {
    assert_eq!(encode_signed(0), 0);
    assert_eq!(decode_signed(0), 0);
  }

  #[test]
  fn signed_round_trips() {
    for offset in [-1i64, 1, -12345, 12345, 0, i64::MAX >> 1, -(i64::MAX >> 1)] {
      assert_eq!(decode_signed(encode_signed(offset)), offset);
    }
  }

  #[test]
  fn truncated_varint_reports_corrupt_file_truncated_varint() {
    let mut reader = Cursor::new(vec![0x01u8]); // no terminator byte
    assert!(matches!(
      reader.read_varint(),
      Err(Error::CorruptFile(Reason::TruncatedVarint))
    ));
  }
}
