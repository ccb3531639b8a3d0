//! Verifies the structural and semantic invariants of an opcode stream.
//!
//! A pass-through `Iterator` adapter, per the pull-driven pipeline design: it
//! re-yields every opcode it receives unchanged and only ever produces an
//! `Err` as a side effect of noticing a violated invariant, so it can be
//! spliced transparently between a reader and a writer or apply engine.
use crate::crc::Crc32Hasher;
use crate::error::{Error, Reason};
use crate::opcode::Opcode;
use crate::writer::write_op;
use std::hash::Hasher;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
  ExpectSourceHeader,
  ExpectTargetHeader,
  ExpectOpOrTrailer,
  ExpectTargetCrc32,
  ExpectPatchCrc32,
  Done,
}

pub struct Validate<I> {
  inner: I,
  phase: Phase,
  output_offset: u64,
  source_cursor: i128,
  target_cursor: i128,
  source_size: u64,
  target_size: u64,
  hasher: Crc32Hasher,
  actual_source_crc32: Option<u32>,
  actual_target_crc32: Option<u32>,
  failed: bool,
}

impl<I> Validate<I> {
  fn new(inner: I, actual_source_crc32: Option<u32>, actual_target_crc32: Option<u32>) -> Self {
    let mut hasher = Crc32Hasher::new();
    hasher.write(b"BPS1");
    Self {
      inner,
      phase: Phase::ExpectSourceHeader,
      output_offset: 0,
      source_cursor: 0,
      target_cursor: 0,
      source_size: 0,
      target_size: 0,
      hasher,
      actual_source_crc32,
      actual_target_crc32,
      failed: false,
    }
  }
}

impl<I: Iterator<Item = Result<Opcode, Error>>> Validate<I> {
  fn hash_op(&mut self, opcode: &Opcode) -> Result<(), Error> {
    let mut buf = Vec::new();
    write_op(&mut buf, opcode)?;
    self.hasher.write(&buf);
    Ok(())
  }

  fn check(&mut self, opcode: &Opcode) -> Result<(), Error> {
    use Reason::*;
    match (self.phase, opcode) {
      (Phase::ExpectSourceHeader, Opcode::SourceHeader { size }) => {
        self.source_size = *size;
        self.phase = Phase::ExpectTargetHeader;
      }
      (Phase::ExpectTargetHeader, Opcode::TargetHeader { size, .. }) => {
        self.target_size = *size;
        self.phase = Phase::ExpectOpOrTrailer;
      }
      (Phase::ExpectOpOrTrailer, Opcode::SourceRead { bytespan }) => {
        let bytespan = bytespan.get();
        if self.output_offset.checked_add(bytespan).is_none_or(|end| end > self.source_size) {
          return Err(Error::CorruptFile(SourceCursorOutOfRange {
            cursor: i128::from(self.output_offset),
            source_size: self.source_size,
          }));
        }
        self.output_offset += bytespan;
      }
      (Phase::ExpectOpOrTrailer, Opcode::TargetRead { bytespan, payload }) => {
        if payload.len() as u64 != bytespan.get() {
          return Err(Error::CorruptFile(ZeroBytespan));
        }
        self.output_offset += bytespan.get();
      }
      (Phase::ExpectOpOrTrailer, Opcode::SourceCopy { bytespan, offset }) => {
        let cursor = self.source_cursor + i128::from(*offset);
        let end = cursor + i128::from(bytespan.get());
        if cursor < 0 || end > i128::from(self.source_size) {
          return Err(Error::CorruptFile(SourceCursorOutOfRange {
            cursor,
            source_size: self.source_size,
          }));
        }
        self.source_cursor = end;
        self.output_offset += bytespan.get();
      }
      (Phase::ExpectOpOrTrailer, Opcode::TargetCopy { bytespan, offset }) => {
        let cursor = self.target_cursor + i128::from(*offset);
        if cursor < 0 || cursor >= i128::from(self.output_offset) {
          return Err(Error::CorruptFile(TargetCursorOutOfRange {
            cursor,
            output_offset: self.output_offset,
          }));
        }
        self.target_cursor = cursor + i128::from(bytespan.get());
        self.output_offset += bytespan.get();
      }
      (Phase::ExpectOpOrTrailer, Opcode::SourceCrc32 { crc }) => {
        if let Some(expected) = self.actual_source_crc32 {
          if expected != *crc {
            return Err(Error::CorruptFile(ChecksumMismatch {
              kind: crate::error::ChecksumKindDisplay(bps_err::ChecksumKind::Source),
              expected,
              actual: *crc,
            }));
          }
        }
        if self.output_offset != self.target_size {
          return Err(Error::CorruptFile(StreamTooShort));
        }
        self.phase = Phase::ExpectTargetCrc32;
      }
      (Phase::ExpectTargetCrc32, Opcode::TargetCrc32 { crc }) => {
        if let Some(expected) = self.actual_target_crc32 {
          if expected != *crc {
            return Err(Error::CorruptFile(ChecksumMismatch {
              kind: crate::error::ChecksumKindDisplay(bps_err::ChecksumKind::Target),
              expected,
              actual: *crc,
            }));
          }
        }
        self.phase = Phase::ExpectPatchCrc32;
      }
      (Phase::ExpectPatchCrc32, Opcode::PatchCrc32 { crc }) => {
        let computed = self.hasher.finish().value();
        if computed != *crc {
          return Err(Error::CorruptFile(ChecksumMismatch {
            kind: crate::error::ChecksumKindDisplay(bps_err::ChecksumKind::Patch),
            expected: computed,
            actual: *crc,
          }));
        }
        self.phase = Phase::Done;
      }
      _ => return Err(Error::CorruptFile(EarlyEof)),
    }
    Ok(())
  }
}

impl<I: Iterator<Item = Result<Opcode, Error>>> Iterator for Validate<I> {
  type Item = Result<Opcode, Error>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed {
      return None;
    }
    match self.inner.next() {
      None => {
        if self.phase != Phase::Done {
          self.failed = true;
          return Some(Err(Error::CorruptFile(Reason::EarlyEof)));
        }
        None
      }
      Some(Err(e)) => {
        self.failed = true;
        Some(Err(e))
      }
      Some(Ok(opcode)) => {
        let is_patch_crc = matches!(opcode, Opcode::PatchCrc32 { .. });
        if let Err(e) = self.check(&opcode) {
          self.failed = true;
          return Some(Err(e));
        }
        if !is_patch_crc {
          if let Err(e) = self.hash_op(&opcode) {
            self.failed = true;
            return Some(Err(e));
          }
        }
        Some(Ok(opcode))
      }
    }
  }
}

/// Validates an opcode stream without checking `SourceCrc32`/`TargetCrc32`
/// against real source/target bytes (the caller doesn't have them to hand).
pub fn validate<I: Iterator<Item = Result<Opcode, Error>>>(opcodes: I) -> Validate<I> {
  Validate::new(opcodes, None, None)
}

/// Validates an opcode stream, additionally checking the declared
/// `SourceCrc32`/`TargetCrc32` against the actual checksums of `source` and
/// `target`.
pub fn validate_against<I: Iterator<Item = Result<Opcode, Error>>>(
  opcodes: I,
  source: &[u8],
  target: &[u8],
) -> Validate<I> {
  Validate::new(opcodes, Some(crc32fast::hash(source)), Some(crc32fast::hash(target)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::writer::write_patch;
  use std::num::NonZeroU64;

  fn roundtrip_opcodes(opcodes: Vec<Opcode>) -> Vec<Opcode> {
    let mut buf = Vec::new();
    write_patch(opcodes.into_iter().map(Ok), &mut buf).unwrap();
    crate::reader::Reader::new(std::io::Cursor::new(buf)).unwrap().collect::<Result<_, _>>().unwrap()
  }

  #[test]
  fn accepts_a_well_formed_identity_patch() {
    let opcodes = roundtrip_opcodes(vec![
      Opcode::SourceHeader { size: 4 },
      Opcode::TargetHeader { size: 4, metadata: vec![] },
      Opcode::SourceRead { bytespan: NonZeroU64::new(4).unwrap() },
      Opcode::SourceCrc32 { crc: 0 },
      Opcode::TargetCrc32 { crc: 0 },
      Opcode::PatchCrc32 { crc: 0 },
    ]);
    let result: Result<Vec<_>, _> = validate(opcodes.into_iter().map(Ok)).collect();
    assert!(result.is_ok());
  }

  #[test]
  fn rejects_a_flipped_patch_crc32_bit() {
    let mut buf = Vec::new();
    write_patch(
      vec![
        Opcode::SourceHeader { size: 0 },
        Opcode::TargetHeader { size: 0, metadata: vec![] },
        Opcode::SourceCrc32 { crc: 0 },
        Opcode::TargetCrc32 { crc: 0 },
        Opcode::PatchCrc32 { crc: 0 },
      ]
      .into_iter()
      .map(Ok),
      &mut buf,
    )
    .unwrap();
    let last = buf.len() - 1;
    buf[last] ^= 0x01;

    let opcodes = crate::reader::Reader::new(std::io::Cursor::new(buf)).unwrap();
    let result: Result<Vec<_>, _> = validate(opcodes).collect();
    assert!(matches!(result, Err(Error::CorruptFile(Reason::ChecksumMismatch { .. }))));
  }

  #[test]
  fn rejects_source_copy_that_runs_past_source_end() {
    let opcodes = vec![
      Opcode::SourceHeader { size: 2 },
      Opcode::TargetHeader { size: 3, metadata: vec![] },
      Opcode::SourceCopy { bytespan: NonZeroU64::new(3).unwrap(), offset: 0 },
      Opcode::SourceCrc32 { crc: 0 },
      Opcode::TargetCrc32 { crc: 0 },
      Opcode::PatchCrc32 { crc: 0 },
    ];
    let result: Result<Vec<_>, _> = validate(opcodes.into_iter().map(Ok)).collect();
    assert!(matches!(result, Err(Error::CorruptFile(Reason::SourceCursorOutOfRange { .. }))));
  }
}
