//! Parses a BPS byte stream into a lazily-produced [`Opcode`] sequence.
//!
//! Mirrors the reader half of the teacher's `bps::patch`: magic, then the two
//! headers, then operations until 12 bytes remain, then the three trailing
//! CRCs. Unlike the teacher's monolithic `patch()` function (which also
//! applies and validates in the same pass), this type only parses: it is an
//! `Iterator<Item = Result<Opcode, Error>>` so it can be composed with the
//! validator, optimizer, or apply engine independently, per the pull-driven
//! pipeline design.
use crate::error::{Error, Reason};
use crate::opcode::Opcode;
use crate::varint::{decode_signed, ReadVarInt};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::prelude::*;
use std::io::SeekFrom;
use std::num::NonZeroU64;

const MAGIC: &[u8; 4] = b"BPS1";
const TRAILER_LEN: u64 = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
  SourceHeader,
  TargetHeader,
  Operations,
  SourceCrc32,
  TargetCrc32,
  PatchCrc32,
  Done,
}

pub struct Reader<R> {
  inner: R,
  phase: Phase,
  trailer_start: u64,
  source_size: u64,
}

impl<R: Read + Seek> Reader<R> {
  pub fn new(mut inner: R) -> Result<Self, Error> {
    let len = inner.seek(SeekFrom::End(0))?;
    if len < TRAILER_LEN + MAGIC.len() as u64 {
      return Err(Error::CorruptFile(Reason::EarlyEof));
    }
    let trailer_start = len - TRAILER_LEN;
    inner.seek(SeekFrom::Start(0))?;

    let mut magic = [0u8; 4];
    inner.read_exact(&mut magic)?;
    if &magic != MAGIC {
      return Err(Error::CorruptFile(Reason::BadMagic));
    }

    Ok(Self { inner, phase: Phase::SourceHeader, trailer_start, source_size: 0 })
  }

  fn position(&mut self) -> Result<u64, Error> {
    Ok(self.inner.stream_position()?)
  }

  fn read_varint(&mut self) -> Result<u64, Error> {
    self.inner.read_varint()?
  }

  fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>, Error> {
    let len = usize::try_from(len).map_err(|_| Error::CorruptFile(Reason::TruncatedVarint))?;
    let mut buf = vec![0u8; len];
    self.inner.read_exact(&mut buf)?;
    Ok(buf)
  }

  fn next_opcode(&mut self) -> Result<Option<Opcode>, Error> {
    match self.phase {
      Phase::SourceHeader => {
        self.source_size = self.read_varint()?;
        self.phase = Phase::TargetHeader;
        Ok(Some(Opcode::SourceHeader { size: self.source_size }))
      }
      Phase::TargetHeader => {
        let size = self.read_varint()?;
        let metadata_size = self.read_varint()?;
        let metadata = self.read_bytes(metadata_size)?;
        self.phase = Phase::Operations;
        Ok(Some(Opcode::TargetHeader { size, metadata }))
      }
      Phase::Operations => {
        let position = self.position()?;
        if position > self.trailer_start {
          // A previous operation's declared length (a bytespan or the
          // target metadata) read past where the trailer was supposed to
          // start, eating into the three trailing CRCs.
          return Err(Error::CorruptFile(Reason::TrailingGarbage(position - self.trailer_start)));
        }
        if position == self.trailer_start {
          self.phase = Phase::SourceCrc32;
          return self.next_opcode();
        }
        let encoded = self.read_varint()?;
        let bytespan = NonZeroU64::new((encoded >> 2) + 1)
          .ok_or(Error::CorruptFile(Reason::ZeroBytespan))?;
        let op_code = encoded & 0b11;
        let opcode = match op_code {
          0 => Opcode::SourceRead { bytespan },
          1 => {
            let payload = self.read_bytes(bytespan.get())?;
            Opcode::TargetRead { bytespan, payload }
          }
          2 => Opcode::SourceCopy { bytespan, offset: decode_signed(self.read_varint()?) },
          3 => Opcode::TargetCopy { bytespan, offset: decode_signed(self.read_varint()?) },
          other => return Err(Error::CorruptFile(Reason::UnknownOpcode(other))),
        };
        Ok(Some(opcode))
      }
      Phase::SourceCrc32 => {
        let crc = self.inner.read_u32::<LittleEndian>()?;
        self.phase = Phase::TargetCrc32;
        Ok(Some(Opcode::SourceCrc32 { crc }))
      }
      Phase::TargetCrc32 => {
        let crc = self.inner.read_u32::<LittleEndian>()?;
        self.phase = Phase::PatchCrc32;
        Ok(Some(Opcode::TargetCrc32 { crc }))
      }
      Phase::PatchCrc32 => {
        let crc = self.inner.read_u32::<LittleEndian>()?;
        self.phase = Phase::Done;
        Ok(Some(Opcode::PatchCrc32 { crc }))
      }
      Phase::Done => Ok(None),
    }
  }
}

impl<R: Read + Seek> Iterator for Reader<R> {
  type Item = Result<Opcode, Error>;

  fn next(&mut self) -> Option<Self::Item> {
    self.next_opcode().transpose()
  }
}

/// Parses `source` into a lazy opcode iterator. Convenience wrapper over
/// [`Reader::new`] matching the core API surface's `read_patch`.
pub fn read_patch<R: Read + Seek>(source: R) -> Result<impl Iterator<Item = Result<Opcode, Error>>, Error> {
  Reader::new(source)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::writer::write_patch;

  #[test]
  fn reads_identity_patch() {
    let mut buf = Vec::new();
    write_patch(
      vec![
        Opcode::SourceHeader { size: 4 },
        Opcode::TargetHeader { size: 4, metadata: vec![] },
        Opcode::SourceRead { bytespan: NonZeroU64::new(4).unwrap() },
        Opcode::SourceCrc32 { crc: 0 },
        Opcode::TargetCrc32 { crc: 0 },
        Opcode::PatchCrc32 { crc: 0 },
      ]
      .into_iter()
      .map(Ok),
      &mut buf,
    )
    .unwrap();

    let opcodes: Vec<Opcode> = Reader::new(std::io::Cursor::new(buf))
      .unwrap()
      .collect::<Result<_, _>>()
      .unwrap();
    assert_eq!(
      opcodes[..3],
      [
        Opcode::SourceHeader { size: 4 },
        Opcode::TargetHeader { size: 4, metadata: vec![] },
        Opcode::SourceRead { bytespan: NonZeroU64::new(4).unwrap() },
      ]
    );
  }

  #[test]
  fn rejects_bad_magic() {
    let bytes = vec![0u8; 20];
    assert!(matches!(
      Reader::new(std::io::Cursor::new(bytes)),
      Err(Error::CorruptFile(Reason::BadMagic))
    ));
  }

  #[test]
  fn rejects_too_short_file() {
    let bytes = vec![b'B', b'P', b'S', b'1'];
    assert!(matches!(
      Reader::new(std::io::Cursor::new(bytes)),
      Err(Error::CorruptFile(Reason::EarlyEof))
    ));
  }

  #[test]
  fn rejects_an_operation_whose_payload_overruns_into_the_trailer() {
    // magic, SourceHeader(0), TargetHeader(3, b""), then a TargetRead whose
    // leading varint claims a 3-byte payload but only one real payload byte
    // exists before the 12-byte trailer: reading it consumes 2 bytes that
    // are actually part of the trailer.
    let bytes = vec![
      b'B', b'P', b'S', b'1',
      0x80, // source_size = 0
      0x83, // target_size = 3
      0x80, // metadata_size = 0
      0x89, // TargetRead, bytespan - 1 = 2 (claims bytespan 3)
      b'X', // one real payload byte
      0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 12-byte trailer
    ];
    let reader = Reader::new(std::io::Cursor::new(bytes)).unwrap();
    let result: Result<Vec<Opcode>, Error> = reader.collect();
    assert!(matches!(result, Err(Error::CorruptFile(Reason::TrailingGarbage(2)))));
  }
}
