//! Shrinks an opcode stream without changing what it reconstructs.
//!
//! Unlike the reader/writer/validator/apply engine, which all process one
//! opcode at a time, this stage needs the whole stream buffered: a merge
//! decision for opcode `i` depends on opcode `i+1`, and merging can cascade
//! (three same-kind copies in a row collapse to one only after the first
//! merge exposes the second). `NonZeroU64` bytespans mean the "drop
//! zero-length spans" cleanup the format doc calls for is enforced by the
//! type system rather than this pass.
//!
//! Every `SourceCopy`/`TargetCopy` offset in the input is relative to
//! whatever its predecessor of the same kind happened to be; merging changes
//! which op that predecessor is, so offsets can't just be copied through.
//! This pass first resolves every copy to an absolute source/target
//! position (ground truth, independent of merging), merges on absolute
//! positions, then re-derives every offset from the merged sequence in a
//! final pass. That's rule 3 in the component design ("re-emit relative
//! offsets").
use crate::error::Error;
use crate::opcode::Opcode;
use checked_signed_diff::prelude::*;
use std::num::NonZeroU64;

/// Buffers the full stream, merges what it can, and returns the result.
///
/// Idempotent: a merge is only ever performed against the single most
/// recently emitted entry, and once something else is emitted on top of it
/// that entry is never revisited, so running this again over its own output
/// finds nothing left to merge.
pub fn optimize<I>(opcodes: I) -> Result<Vec<Opcode>, Error>
where
  I: Iterator<Item = Result<Opcode, Error>>,
{
  let mut out: Vec<Opcode> = Vec::new();
  // Parallel to `out`: the absolute source/target position a `SourceRead`,
  // `SourceCopy` or `TargetCopy` entry starts at. Meaningless (left at 0)
  // for `TargetRead` and the header/CRC pseudo-ops.
  let mut out_abs: Vec<u64> = Vec::new();

  let mut out_offset: u64 = 0;
  let mut orig_src_end: u64 = 0;
  let mut orig_tgt_end: u64 = 0;
  let mut src_chain_end: u64 = 0;
  let mut tgt_chain_end: u64 = 0;

  for op in opcodes {
    let op = op?;
    match op {
      Opcode::SourceRead { bytespan } => {
        let abs = out_offset;
        out_offset += bytespan.get();

        if let Some(Opcode::SourceRead { bytespan: prev }) = out.last() {
          let merged = add(*prev, bytespan);
          *out.last_mut().unwrap() = Opcode::SourceRead { bytespan: merged };
          continue;
        }
        if bytespan.get() == 1 {
          if let Some((merged, merged_abs)) =
            try_absorb_trailing_read(out.last(), out_abs.last().copied(), abs, src_chain_end)
          {
            *out.last_mut().unwrap() = merged;
            *out_abs.last_mut().unwrap() = merged_abs;
            src_chain_end = merged_abs + out.last().unwrap().bytespan().unwrap().get();
            continue;
          }
        }
        out.push(Opcode::SourceRead { bytespan });
        out_abs.push(abs);
      }
      Opcode::TargetRead { bytespan, payload } => {
        out_offset += bytespan.get();
        if let Some(Opcode::TargetRead { bytespan: prev, payload: prev_payload }) = out.last() {
          let mut merged_payload = prev_payload.clone();
          merged_payload.extend_from_slice(&payload);
          let merged = add(*prev, bytespan);
          *out.last_mut().unwrap() = Opcode::TargetRead { bytespan: merged, payload: merged_payload };
          continue;
        }
        out.push(Opcode::TargetRead { bytespan, payload });
        out_abs.push(0);
      }
      Opcode::SourceCopy { bytespan, offset } => {
        let abs = orig_src_end
          .checked_add_signed(offset)
          .ok_or(Error::OffsetOverflow(orig_src_end, offset as u64))?;
        orig_src_end = abs + bytespan.get();
        out_offset += bytespan.get();

        if let Some(Opcode::SourceCopy { bytespan: prev, .. }) = out.last() {
          let prev_abs = *out_abs.last().unwrap();
          if prev_abs + prev.get() == abs {
            let merged = add(*prev, bytespan);
            *out.last_mut().unwrap() = Opcode::SourceCopy { bytespan: merged, offset: 0 };
            src_chain_end = prev_abs + merged.get();
            continue;
          }
        }
        if let Some((merged, merged_abs)) =
          try_absorb_leading_read(out.last(), out_abs.last().copied(), bytespan, abs, src_chain_end)
        {
          *out.last_mut().unwrap() = merged;
          *out_abs.last_mut().unwrap() = merged_abs;
          src_chain_end = merged_abs + merged.bytespan().unwrap().get();
          continue;
        }
        out.push(Opcode::SourceCopy { bytespan, offset: 0 });
        out_abs.push(abs);
        src_chain_end = abs + bytespan.get();
      }
      Opcode::TargetCopy { bytespan, offset } => {
        let abs = orig_tgt_end
          .checked_add_signed(offset)
          .ok_or(Error::OffsetOverflow(orig_tgt_end, offset as u64))?;
        orig_tgt_end = abs + bytespan.get();
        out_offset += bytespan.get();

        if let Some(Opcode::TargetCopy { bytespan: prev, .. }) = out.last() {
          let prev_abs = *out_abs.last().unwrap();
          if prev_abs + prev.get() == abs {
            let merged = add(*prev, bytespan);
            *out.last_mut().unwrap() = Opcode::TargetCopy { bytespan: merged, offset: 0 };
            tgt_chain_end = prev_abs + merged.get();
            continue;
          }
        }
        out.push(Opcode::TargetCopy { bytespan, offset: 0 });
        out_abs.push(abs);
        tgt_chain_end = abs + bytespan.get();
      }
      // Headers and CRCs pass through unchanged (rule 5).
      other => {
        out.push(other);
        out_abs.push(0);
      }
    }
  }

  reemit_offsets(&mut out, &out_abs)?;
  Ok(out)
}

fn add(a: NonZeroU64, b: NonZeroU64) -> NonZeroU64 {
  NonZeroU64::new(a.get() + b.get()).expect("sum of two positive spans is positive")
}

/// Rule 4, leading case: `prev` is a single-byte `SourceRead` and `op` is the
/// `SourceCopy` about to be pushed. Absorbable iff the read's source byte
/// sits exactly one before where the copy starts reading. Only applied when
/// doing so doesn't grow the serialized patch.
fn try_absorb_leading_read(
  prev: Option<&Opcode>,
  prev_abs: Option<u64>,
  bytespan: NonZeroU64,
  abs: u64,
  src_chain_end: u64,
) -> Option<(Opcode, u64)> {
  let Some(Opcode::SourceRead { bytespan: read_span }) = prev else { return None };
  if read_span.get() != 1 {
    return None;
  }
  let read_abs = prev_abs?;
  if read_abs + 1 != abs {
    return None;
  }
  let merged_bytespan = NonZeroU64::new(bytespan.get() + 1)?;
  let before = encoded_len(&Opcode::SourceRead { bytespan: *read_span })
    + encoded_len(&offset_op(bytespan, abs, src_chain_end)?);
  let merged = offset_op(merged_bytespan, read_abs, src_chain_end)?;
  (encoded_len(&merged) <= before).then_some((merged, read_abs))
}

/// Rule 4, trailing case: `prev` is a `SourceCopy` and `op` is a trailing
/// single-byte `SourceRead`. Absorbable iff the read's source byte is
/// exactly the one the copy's source cursor would touch next.
fn try_absorb_trailing_read(
  prev: Option<&Opcode>,
  prev_abs: Option<u64>,
  abs: u64,
  src_chain_end: u64,
) -> Option<(Opcode, u64)> {
  let Some(Opcode::SourceCopy { bytespan, .. }) = prev else { return None };
  let copy_abs = prev_abs?;
  if copy_abs + bytespan.get() != abs {
    return None;
  }
  let merged_bytespan = NonZeroU64::new(bytespan.get() + 1)?;
  let before =
    encoded_len(&offset_op(*bytespan, copy_abs, src_chain_end)?) + encoded_len(&Opcode::SourceRead {
      bytespan: NonZeroU64::new(1).unwrap(),
    });
  let merged = offset_op(merged_bytespan, copy_abs, src_chain_end)?;
  (encoded_len(&merged) <= before).then_some((merged, copy_abs))
}

fn offset_op(bytespan: NonZeroU64, abs: u64, chain_end: u64) -> Option<Opcode> {
  let offset = abs.checked_signed_difference(chain_end)?;
  Some(Opcode::SourceCopy { bytespan, offset })
}

/// Recomputes every `SourceCopy`/`TargetCopy` offset from its absolute
/// position against the *final* merged sequence, independent of whatever
/// placeholder offset it carried during merging.
fn reemit_offsets(out: &mut [Opcode], out_abs: &[u64]) -> Result<(), Error> {
  let mut src_end: u64 = 0;
  let mut tgt_end: u64 = 0;
  for (op, &abs) in out.iter_mut().zip(out_abs) {
    match op {
      Opcode::SourceCopy { bytespan, offset } => {
        *offset = abs.checked_signed_difference(src_end).ok_or(Error::OffsetOverflow(abs, src_end))?;
        src_end = abs + bytespan.get();
      }
      Opcode::TargetCopy { bytespan, offset } => {
        *offset = abs.checked_signed_difference(tgt_end).ok_or(Error::OffsetOverflow(abs, tgt_end))?;
        tgt_end = abs + bytespan.get();
      }
      _ => {}
    }
  }
  Ok(())
}

fn encoded_len(op: &Opcode) -> usize {
  let mut buf = Vec::new();
  crate::writer::write_op(&mut buf, op).expect("writing to a Vec<u8> never fails");
  buf.len()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn read(n: u64) -> Opcode {
    Opcode::SourceRead { bytespan: NonZeroU64::new(n).unwrap() }
  }

  fn source_copy(n: u64, offset: i64) -> Opcode {
    Opcode::SourceCopy { bytespan: NonZeroU64::new(n).unwrap(), offset }
  }

  fn target_copy(n: u64, offset: i64) -> Opcode {
    Opcode::TargetCopy { bytespan: NonZeroU64::new(n).unwrap(), offset }
  }

  #[test]
  fn merges_adjacent_source_reads() {
    let ops = vec![read(3), read(4)];
    let optimized = optimize(ops.into_iter().map(Ok)).unwrap();
    assert_eq!(optimized, vec![read(7)]);
  }

  #[test]
  fn merges_adjacent_target_reads_and_concatenates_payload() {
    let a = Opcode::TargetRead { bytespan: NonZeroU64::new(2).unwrap(), payload: b"ab".to_vec() };
    let b = Opcode::TargetRead { bytespan: NonZeroU64::new(3).unwrap(), payload: b"cde".to_vec() };
    let optimized = optimize(vec![a, b].into_iter().map(Ok)).unwrap();
    assert_eq!(
      optimized,
      vec![Opcode::TargetRead { bytespan: NonZeroU64::new(5).unwrap(), payload: b"abcde".to_vec() }]
    );
  }

  #[test]
  fn merges_contiguous_source_copies_but_not_ones_with_a_gap() {
    let contiguous = vec![source_copy(3, 10), source_copy(2, 0)];
    assert_eq!(optimize(contiguous.into_iter().map(Ok)).unwrap(), vec![source_copy(5, 10)]);

    let gapped = vec![source_copy(3, 10), source_copy(2, 1)];
    assert_eq!(optimize(gapped.clone().into_iter().map(Ok)).unwrap(), gapped);
  }

  #[test]
  fn merges_contiguous_target_copies() {
    let contiguous = vec![target_copy(3, 10), target_copy(2, 0)];
    assert_eq!(optimize(contiguous.into_iter().map(Ok)).unwrap(), vec![target_copy(5, 10)]);
  }

  #[test]
  fn does_not_merge_different_opcode_kinds() {
    let ops = vec![read(3), source_copy(2, 0)];
    assert_eq!(optimize(ops.clone().into_iter().map(Ok)).unwrap(), ops);
  }

  #[test]
  fn is_idempotent() {
    let ops = vec![read(3), read(4), source_copy(1, 5), source_copy(2, 0), source_copy(1, 8)];
    let once = optimize(ops.into_iter().map(Ok)).unwrap();
    let twice = optimize(once.clone().into_iter().map(Ok)).unwrap();
    assert_eq!(once, twice);
  }

  #[test]
  fn cascades_three_way_merges() {
    let ops = vec![source_copy(1, 10), source_copy(1, 0), source_copy(1, 0)];
    let optimized = optimize(ops.into_iter().map(Ok)).unwrap();
    assert_eq!(optimized, vec![source_copy(3, 10)]);
  }

  #[test]
  fn propagates_reader_errors() {
    let ops: Vec<Result<Opcode, Error>> = vec![Err(Error::InvalidBlocksize)];
    assert!(optimize(ops.into_iter()).is_err());
  }

  #[test]
  fn absorbs_a_leading_single_byte_source_read_into_the_following_copy() {
    let ops = vec![read(1), source_copy(5, 1)];
    let optimized = optimize(ops.into_iter().map(Ok)).unwrap();
    assert_eq!(optimized, vec![source_copy(6, 0)]);
  }

  #[test]
  fn absorbs_a_trailing_single_byte_source_read_into_the_preceding_copy() {
    let ops = vec![source_copy(5, 0), read(1)];
    let optimized = optimize(ops.into_iter().map(Ok)).unwrap();
    assert_eq!(optimized, vec![source_copy(6, 0)]);
  }

  #[test]
  fn does_not_absorb_a_source_read_that_does_not_line_up_with_the_copy() {
    let ops = vec![read(1), source_copy(5, 9)];
    let optimized = optimize(ops.clone().into_iter().map(Ok)).unwrap();
    assert_eq!(optimized, ops);
  }

  #[test]
  fn does_not_absorb_a_multi_byte_source_read() {
    let ops = vec![read(2), source_copy(5, 1)];
    let optimized = optimize(ops.clone().into_iter().map(Ok)).unwrap();
    assert_eq!(optimized, ops);
  }

  /// A copy whose offset was correct relative to its original predecessor
  /// must be re-derived, not copied through, once an intervening single-byte
  /// `SourceRead` gets absorbed into that predecessor and shifts where its
  /// chain actually ends.
  #[test]
  fn reemits_a_later_copys_offset_after_a_preceding_absorb_shifts_the_chain() {
    // op1 covers source[0..5], the lone read covers source[5], and op3
    // (offset 2 relative to op1's *original* end of 5) covers source[7..10].
    // Once the read is absorbed into op1, op1's end becomes 6, so op3's
    // offset must be re-derived as 1, not copied through as 2.
    let ops = vec![source_copy(5, 0), read(1), source_copy(3, 2)];
    let optimized = optimize(ops.into_iter().map(Ok)).unwrap();
    assert_eq!(optimized, vec![source_copy(6, 0), source_copy(3, 1)]);
  }

  #[test]
  fn preserves_headers_and_crcs_unchanged() {
    let ops = vec![
      Opcode::SourceHeader { size: 4 },
      Opcode::TargetHeader { size: 4, metadata: vec![1, 2] },
      read(4),
      Opcode::SourceCrc32 { crc: 1 },
      Opcode::TargetCrc32 { crc: 2 },
      Opcode::PatchCrc32 { crc: 3 },
    ];
    let optimized = optimize(ops.clone().into_iter().map(Ok)).unwrap();
    assert_eq!(optimized, ops);
  }
}
