//! Encode, decode, diff, apply, validate and optimize BPS binary patches.
//!
//! The wire format is a stream of opcodes bookended by a magic header and
//! three trailing CRC32 checksums; see [`reader`] and [`writer`] for the
//! codec, [`diff`] for patch generation, [`apply`] for patch application,
//! [`validate`] for structural/checksum verification and [`optimize`] for
//! shrinking an opcode stream that didn't come out of [`diff`].
pub mod apply;
pub mod crc;
pub mod diff;
pub mod error;
pub mod opcode;
pub mod optimize;
pub mod reader;
pub mod validate;
mod varint;
pub mod writer;

pub use apply::apply;
pub use diff::{default_blocksize, diff};
pub use error::{Error, Reason};
pub use opcode::Opcode;
pub use optimize::optimize;
pub use reader::{read_patch, Reader};
pub use validate::{validate, validate_against};
pub use writer::write_patch;
