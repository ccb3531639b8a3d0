//! Serializes an [`Opcode`] sequence into a BPS byte stream.
//!
//! Inverse of [`crate::reader::Reader`]. Maintains a running CRC32 over every
//! byte written so far; when it reaches the `PatchCrc32` pseudo-op it ignores
//! the caller-supplied value and writes the running hash instead, per the
//! writer's contract in the patch format's own design notes (a placeholder or
//! a correct value are both accepted).
use crate::crc::Crc32Hasher;
use crate::error::Error;
use crate::opcode::Opcode;
use crate::varint::{encode_signed, WriteVarInt};
use byteorder::{LittleEndian, WriteBytesExt};
use read_write_utils::hash::HashingWriter;
use std::io::Write;

pub fn write_patch<W: Write>(
  opcodes: impl Iterator<Item = Result<Opcode, Error>>,
  sink: W,
) -> Result<(), Error> {
  let mut out = HashingWriter::new(sink, Crc32Hasher::new());
  out.write_all(b"BPS1")?;

  for opcode in opcodes {
    let opcode = opcode?;
    if let Opcode::PatchCrc32 { .. } = opcode {
      let running = out.hasher().finish();
      out.inner_mut().write_u32::<LittleEndian>(running.value())?;
    } else {
      write_op(&mut out, &opcode)?;
    }
  }

  Ok(())
}

/// Writes the wire encoding of every opcode except `PatchCrc32`, whose value
/// is self-referential and handled by each caller (the real writer fills in
/// the running hash; the validator recomputes it separately to compare).
pub(crate) fn write_op<W: Write>(out: &mut W, opcode: &Opcode) -> std::io::Result<()> {
  match opcode {
    Opcode::SourceHeader { size } => out.write_varint(*size)?,
    Opcode::TargetHeader { size, metadata } => {
      out.write_varint(*size)?;
      out.write_varint(metadata.len() as u64)?;
      out.write_all(metadata)?;
    }
    Opcode::SourceRead { bytespan } => {
      out.write_varint((bytespan.get() - 1) << 2)?;
    }
    Opcode::TargetRead { bytespan, payload } => {
      out.write_varint(((bytespan.get() - 1) << 2) | 1)?;
      out.write_all(payload)?;
    }
    Opcode::SourceCopy { bytespan, offset } => {
      out.write_varint(((bytespan.get() - 1) << 2) | 2)?;
      out.write_varint(encode_signed(*offset))?;
    }
    Opcode::TargetCopy { bytespan, offset } => {
      out.write_varint(((bytespan.get() - 1) << 2) | 3)?;
      out.write_varint(encode_signed(*offset))?;
    }
    Opcode::SourceCrc32 { crc } | Opcode::TargetCrc32 { crc } => {
      out.write_u32::<LittleEndian>(*crc)?
    }
    Opcode::PatchCrc32 { .. } => {}
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::reader::Reader;
  use std::io::Cursor;
  use std::num::NonZeroU64;

  #[test]
  fn writes_and_reparses_identity_patch() {
    let opcodes = vec![
      Opcode::SourceHeader { size: 4 },
      Opcode::TargetHeader { size: 4, metadata: vec![] },
      Opcode::SourceRead { bytespan: NonZeroU64::new(4).unwrap() },
      Opcode::SourceCrc32 { crc: 0 },
      Opcode::TargetCrc32 { crc: 0 },
      Opcode::PatchCrc32 { crc: 0 },
    ];

    let mut buf = Vec::new();
    write_patch(opcodes.clone().into_iter().map(Ok), &mut buf).unwrap();
    assert_eq!(buf.len(), 20);

    let reparsed: Vec<Opcode> =
      Reader::new(Cursor::new(buf)).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(reparsed[..3], opcodes[..3]);
  }

  #[test]
  fn patch_crc32_reflects_running_hash_not_placeholder() {
    let opcodes = vec![
      Opcode::SourceHeader { size: 0 },
      Opcode::TargetHeader { size: 0, metadata: vec![] },
      Opcode::SourceCrc32 { crc: 0 },
      Opcode::TargetCrc32 { crc: 0 },
      Opcode::PatchCrc32 { crc: 0xDEAD_BEEF },
    ];
    let mut buf = Vec::new();
    write_patch(opcodes.into_iter().map(Ok), &mut buf).unwrap();
    let trailing = u32::from_le_bytes(buf[buf.len() - 4..].try_into().unwrap());
    assert_ne!(trailing, 0xDEAD_BEEF);
  }
}
