//! CRC32 (IEEE 802.3, reflected, init/final XOR `0xFFFFFFFF`) as used by the
//! three trailing checksums in a BPS patch.
//!
//! The multi-format patcher this crate grew out of hashed large files on a
//! dedicated worker thread, handing buffers back and forth across a lock and
//! a barrier (`src/crc.rs` upstream). That concurrency has no place here:
//! the whole pipeline is single-threaded and pull-driven (see the
//! concurrency design notes), so this just drives `crc32fast::Hasher`
//! synchronously on the calling thread.
use std::hash::Hasher;

#[repr(transparent)]
#[derive(Clone, Copy, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Crc32(u32);

impl Crc32 {
  pub fn new(value: u32) -> Self {
    Self(value)
  }

  pub fn value(&self) -> u32 {
    self.0
  }
}

/// A [`Hasher`] implementation backed by [`crc32fast::Hasher`], so it can be
/// used directly with `read_write_utils::hash`'s `HashingReader`/`HashingWriter`.
#[derive(Clone, Default)]
pub struct Crc32Hasher(crc32fast::Hasher);

impl Crc32Hasher {
  pub fn new() -> Self {
    Self(crc32fast::Hasher::new())
  }

  pub fn finish(&self) -> Crc32 {
    Crc32::new(self.0.clone().finalize())
  }
}

impl Hasher for Crc32Hasher {
  fn finish(&self) -> u64 {
    u64::from(self.0.clone().finalize())
  }

  fn write(&mut self, bytes: &[u8]) {
    self.0.update(bytes);
  }
}
