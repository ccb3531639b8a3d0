use std::io;

pub mod prelude {
  pub use super::*;
}

/// Lets an error type describe itself as one of the handful of ways a BPS
/// patch can be malformed, without pinning down which I/O call noticed it.
pub trait CorruptPatchError {
  fn bad_magic() -> Self;
  fn truncated() -> Self;
  fn checksum_mismatch(which: ChecksumKind) -> Self;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
  Source,
  Target,
  Patch,
}

/// Reclassifies raw [`io::Error`]s surfaced while decoding a patch stream as
/// patch corruption, leaving genuine I/O failures (permissions, disk errors)
/// to propagate untouched.
pub trait IOResultExt<T> {
  fn map_corrupt_patch<E: CorruptPatchError>(self) -> io::Result<Result<T, E>>;
}

impl<T> IOResultExt<T> for io::Result<T> {
  fn map_corrupt_patch<E: CorruptPatchError>(self) -> io::Result<Result<T, E>> {
    match self {
      Ok(x) => Ok(Ok(x)),
      Err(e) => match e.kind() {
        io::ErrorKind::InvalidInput => Ok(Err(E::truncated())),
        io::ErrorKind::InvalidData => Ok(Err(E::truncated())),
        io::ErrorKind::UnexpectedEof => Ok(Err(E::truncated())),
        _ => Err(e),
      },
    }
  }
}
