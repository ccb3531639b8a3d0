use bps_err::{ChecksumKind, CorruptPatchError};
use std::io;
use thiserror::Error;

pub mod prelude {
  pub use super::{Error, Reason};
  pub use thiserror::Error;
}

/// The one error kind the core raises, per the reader/validator/apply engine.
#[derive(Debug, Error)]
pub enum Error {
  #[error("corrupt BPS patch: {0}")]
  CorruptFile(Reason),
  #[error(transparent)]
  Io(#[from] io::Error),
  #[error("blocksize must be at least 1")]
  InvalidBlocksize,
  #[error("copy offset {0} - {1} does not fit in an i64")]
  OffsetOverflow(u64, u64),
}

#[derive(Debug, Clone, Error)]
pub enum Reason {
  #[error("bad magic (expected \"BPS1\")")]
  BadMagic,
  #[error("truncated varint")]
  TruncatedVarint,
  #[error("varint overflowed u64")]
  VarintOverflow,
  #[error("unknown opcode {0}")]
  UnknownOpcode(u64),
  #[error("operation has a zero bytespan")]
  ZeroBytespan,
  #[error("output offset {offset} exceeds target size {target_size}")]
  OutputOverflow { offset: u64, target_size: u64 },
  #[error("source cursor {cursor} out of range for source of size {source_size}")]
  SourceCursorOutOfRange { cursor: i128, source_size: u64 },
  #[error("target cursor {cursor} out of range for output offset {output_offset}")]
  TargetCursorOutOfRange { cursor: i128, output_offset: u64 },
  #[error("{kind} CRC32 mismatch: expected {expected:#010x}, got {actual:#010x}")]
  ChecksumMismatch { kind: ChecksumKindDisplay, expected: u32, actual: u32 },
  #[error("operation stream overran the 12-byte trailer by {0} bytes")]
  TrailingGarbage(u64),
  #[error("unexpected end of file while reading the patch")]
  EarlyEof,
  #[error("opcode stream terminated before the declared target size was reached")]
  StreamTooShort,
}

/// A `Display`-friendly mirror of [`ChecksumKind`], kept separate so `bps-err`
/// doesn't need to depend on `thiserror` just to implement `Display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumKindDisplay(pub ChecksumKind);

impl std::fmt::Display for ChecksumKindDisplay {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self.0 {
      ChecksumKind::Source => write!(f, "source"),
      ChecksumKind::Target => write!(f, "target"),
      ChecksumKind::Patch => write!(f, "patch"),
    }
  }
}

impl CorruptPatchError for Error {
  fn bad_magic() -> Self {
    Error::CorruptFile(Reason::BadMagic)
  }

  fn truncated() -> Self {
    Error::CorruptFile(Reason::EarlyEof)
  }

  fn checksum_mismatch(which: ChecksumKind) -> Self {
    Error::CorruptFile(Reason::ChecksumMismatch {
      kind: ChecksumKindDisplay(which),
      expected: 0,
      actual: 0,
    })
  }
}
