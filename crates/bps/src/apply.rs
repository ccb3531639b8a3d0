//! Executes an opcode stream to reconstruct the target from the source.
//!
//! A simple interpreter, not where the engineering depth of this crate
//! lives: it just walks the operations, maintaining the three cursors the
//! format defines (`output_offset`, `source_cursor`, `target_cursor`).
use crate::error::{Error, Reason};
use crate::opcode::Opcode;
use read_write_utils::repeat::RepeatSlice;
use std::io;
use std::io::prelude::*;

/// Applies an opcode stream (as produced by [`crate::reader::read_patch`],
/// optionally passed through [`crate::validate::validate`] first) to
/// `source`, returning the reconstructed target bytes.
pub fn apply<I>(opcodes: I, source: &[u8]) -> Result<Vec<u8>, Error>
where
  I: Iterator<Item = Result<Opcode, Error>>,
{
  let mut opcodes = opcodes;

  let source_size = match next_op(&mut opcodes)? {
    Opcode::SourceHeader { size } => size,
    _ => return Err(Error::CorruptFile(Reason::BadMagic)),
  };
  let target_size = match next_op(&mut opcodes)? {
    Opcode::TargetHeader { size, .. } => size,
    _ => return Err(Error::CorruptFile(Reason::BadMagic)),
  };

  let mut output: Vec<u8> = Vec::with_capacity(usize::try_from(target_size).unwrap_or(0));
  let mut source_cursor: i64 = 0;
  let mut target_cursor: i64 = 0;

  loop {
    let opcode = match opcodes.next() {
      Some(opcode) => opcode?,
      None => break,
    };
    match opcode {
      Opcode::SourceRead { bytespan } => {
        let bytespan = bytespan.get();
        let output_offset = output.len() as u64;
        let end = output_offset.checked_add(bytespan).ok_or(Error::CorruptFile(Reason::OutputOverflow {
          offset: output_offset,
          target_size,
        }))?;
        if end > source_size || end > source.len() as u64 {
          return Err(Error::CorruptFile(Reason::SourceCursorOutOfRange {
            cursor: i128::from(output_offset),
            source_size,
          }));
        }
        output.extend_from_slice(&source[output_offset as usize..end as usize]);
      }
      Opcode::TargetRead { payload, .. } => {
        output.extend_from_slice(&payload);
      }
      Opcode::SourceCopy { bytespan, offset } => {
        let bytespan = bytespan.get();
        let cursor = source_cursor.checked_add(offset).ok_or(Error::CorruptFile(Reason::SourceCursorOutOfRange {
          cursor: i128::from(source_cursor) + i128::from(offset),
          source_size,
        }))?;
        let end = (cursor as i128) + i128::from(bytespan);
        if cursor < 0 || end > i128::from(source_size) || end > i128::from(source.len() as u64) {
          return Err(Error::CorruptFile(Reason::SourceCursorOutOfRange { cursor: i128::from(cursor), source_size }));
        }
        output.extend_from_slice(&source[cursor as usize..(cursor as u64 + bytespan) as usize]);
        source_cursor = cursor + bytespan as i64;
      }
      Opcode::TargetCopy { bytespan, offset } => {
        let bytespan = bytespan.get();
        let output_offset = output.len() as u64;
        let cursor = target_cursor.checked_add(offset).ok_or(Error::CorruptFile(Reason::TargetCursorOutOfRange {
          cursor: i128::from(target_cursor) + i128::from(offset),
          output_offset,
        }))?;
        if cursor < 0 || cursor as u64 >= output_offset {
          return Err(Error::CorruptFile(Reason::TargetCursorOutOfRange { cursor: i128::from(cursor), output_offset }));
        }
        // Self-overlapping copies must extend byte-by-byte (RLE semantics),
        // not via a bulk slice copy: the seed region can be shorter than
        // `bytespan`, in which case it must repeat.
        let seed: Vec<u8> = output[cursor as usize..].to_vec();
        io::copy(&mut RepeatSlice::new(&seed).take(bytespan), &mut output)
          .map_err(Error::Io)?;
        target_cursor = cursor + bytespan as i64;
      }
      Opcode::SourceCrc32 { .. } | Opcode::TargetCrc32 { .. } | Opcode::PatchCrc32 { .. } => break,
      Opcode::SourceHeader { .. } | Opcode::TargetHeader { .. } => {
        return Err(Error::CorruptFile(Reason::BadMagic));
      }
    }
  }

  if output.len() as u64 != target_size {
    return Err(Error::CorruptFile(Reason::StreamTooShort));
  }

  Ok(output)
}

fn next_op<I: Iterator<Item = Result<Opcode, Error>>>(opcodes: &mut I) -> Result<Opcode, Error> {
  opcodes.next().ok_or(Error::CorruptFile(Reason::EarlyEof))?
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::reader::Reader;
  use crate::writer::write_patch;
  use std::io::Cursor;
  use std::num::NonZeroU64;

  fn build_patch(opcodes: Vec<Opcode>) -> Vec<u8> {
    let mut buf = Vec::new();
    write_patch(opcodes.into_iter().map(Ok), &mut buf).unwrap();
    buf
  }

  #[test]
  fn identity_patch_reconstructs_source() {
    let patch = build_patch(vec![
      Opcode::SourceHeader { size: 4 },
      Opcode::TargetHeader { size: 4, metadata: vec![] },
      Opcode::SourceRead { bytespan: NonZeroU64::new(4).unwrap() },
      Opcode::SourceCrc32 { crc: 0 },
      Opcode::TargetCrc32 { crc: 0 },
      Opcode::PatchCrc32 { crc: 0 },
    ]);
    let opcodes = Reader::new(Cursor::new(patch)).unwrap();
    let target = apply(opcodes, b"abcd").unwrap();
    assert_eq!(target, b"abcd");
  }

  #[test]
  fn pure_literal_patch_ignores_empty_source() {
    let patch = build_patch(vec![
      Opcode::SourceHeader { size: 0 },
      Opcode::TargetHeader { size: 2, metadata: vec![] },
      Opcode::TargetRead { bytespan: NonZeroU64::new(2).unwrap(), payload: b"hi".to_vec() },
      Opcode::SourceCrc32 { crc: 0 },
      Opcode::TargetCrc32 { crc: 0 },
      Opcode::PatchCrc32 { crc: 0 },
    ]);
    let opcodes = Reader::new(Cursor::new(patch)).unwrap();
    let target = apply(opcodes, b"").unwrap();
    assert_eq!(target, b"hi");
  }

  #[test]
  fn self_overlapping_target_copy_performs_rle() {
    let patch = build_patch(vec![
      Opcode::SourceHeader { size: 0 },
      Opcode::TargetHeader { size: 100, metadata: vec![] },
      Opcode::TargetRead { bytespan: NonZeroU64::new(1).unwrap(), payload: b"A".to_vec() },
      Opcode::TargetCopy { bytespan: NonZeroU64::new(99).unwrap(), offset: 0 },
      Opcode::SourceCrc32 { crc: 0 },
      Opcode::TargetCrc32 { crc: 0 },
      Opcode::PatchCrc32 { crc: 0 },
    ]);
    let opcodes = Reader::new(Cursor::new(patch)).unwrap();
    let target = apply(opcodes, b"").unwrap();
    assert_eq!(target, vec![b'A'; 100]);
  }

  #[test]
  fn mirror_patch_uses_source_copy_with_negative_offset() {
    let patch = build_patch(vec![
      Opcode::SourceHeader { size: 6 },
      Opcode::TargetHeader { size: 6, metadata: vec![] },
      Opcode::SourceCopy { bytespan: NonZeroU64::new(3).unwrap(), offset: 3 },
      Opcode::SourceCopy { bytespan: NonZeroU64::new(3).unwrap(), offset: -6 },
      Opcode::SourceCrc32 { crc: 0 },
      Opcode::TargetCrc32 { crc: 0 },
      Opcode::PatchCrc32 { crc: 0 },
    ]);
    let opcodes = Reader::new(Cursor::new(patch)).unwrap();
    let target = apply(opcodes, b"abcdef").unwrap();
    assert_eq!(target, b"defabc");
  }
}
