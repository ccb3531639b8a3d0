//! End-to-end pipeline tests: diff -> optimize -> serialize -> parse ->
//! validate -> apply, over the boundary scenarios the component design
//! calls out explicitly.
use bps::{apply, diff, optimize, read_patch, validate, validate_against, write_patch, Opcode};
use std::io::Cursor;
use std::num::NonZeroU64;

fn full_pipeline(source: &[u8], target: &[u8], blocksize: u64) -> Vec<u8> {
  let opcodes = diff(blocksize, source, target).unwrap();
  let opcodes = optimize(opcodes.into_iter().map(Ok)).unwrap();

  let mut buf = Vec::new();
  write_patch(opcodes.into_iter().map(Ok), &mut buf).unwrap();

  let parsed = read_patch(Cursor::new(buf)).unwrap();
  let validated = validate_against(parsed, source, target);
  apply(validated, source).unwrap()
}

#[test]
fn identity_round_trips_and_serializes_to_twenty_bytes() {
  let opcodes = diff(1, b"abcd", b"abcd").unwrap();
  assert_eq!(
    opcodes[..3],
    [
      Opcode::SourceHeader { size: 4 },
      Opcode::TargetHeader { size: 4, metadata: vec![] },
      Opcode::SourceRead { bytespan: NonZeroU64::new(4).unwrap() },
    ]
  );

  let mut buf = Vec::new();
  write_patch(opcodes.into_iter().map(Ok), &mut buf).unwrap();
  assert_eq!(buf.len(), 20);

  assert_eq!(full_pipeline(b"abcd", b"abcd", 1), b"abcd");
}

#[test]
fn pure_literal_round_trips() {
  let opcodes = diff(1, b"", b"hi").unwrap();
  assert_eq!(
    opcodes[..3],
    [
      Opcode::SourceHeader { size: 0 },
      Opcode::TargetHeader { size: 2, metadata: vec![] },
      Opcode::TargetRead { bytespan: NonZeroU64::new(2).unwrap(), payload: b"hi".to_vec() },
    ]
  );
  assert_eq!(full_pipeline(b"", b"hi", 1), b"hi");
}

#[test]
fn rle_round_trips_through_a_single_literal_and_a_target_copy() {
  let target = vec![b'A'; 100];
  let opcodes = diff(1, b"", &target).unwrap();
  assert!(matches!(opcodes[2], Opcode::TargetRead { .. }));
  assert!(matches!(opcodes[3], Opcode::TargetCopy { bytespan, offset: 0 } if bytespan.get() == 99));
  assert_eq!(full_pipeline(b"", &target, 1), target);
}

#[test]
fn mirror_emits_two_source_copies_with_opposite_offsets() {
  let opcodes = diff(1, b"abcdef", b"defabc").unwrap();
  assert_eq!(
    opcodes[2..4],
    [
      Opcode::SourceCopy { bytespan: NonZeroU64::new(3).unwrap(), offset: 3 },
      Opcode::SourceCopy { bytespan: NonZeroU64::new(3).unwrap(), offset: -6 },
    ]
  );
  assert_eq!(full_pipeline(b"abcdef", b"defabc", 1), b"defabc");
}

#[test]
fn corrupted_patch_crc_fails_validation() {
  let opcodes = diff(1, b"abcd", b"abcd").unwrap();
  let mut buf = Vec::new();
  write_patch(opcodes.into_iter().map(Ok), &mut buf).unwrap();
  let last = buf.len() - 1;
  buf[last] ^= 0x01;

  let opcodes = read_patch(Cursor::new(buf)).unwrap();
  let result: Result<Vec<_>, _> = validate(opcodes).collect();
  assert!(result.is_err());
}

#[test]
fn optimizer_merges_adjacent_literals_and_writer_recomputes_the_patch_crc() {
  let opcodes = vec![
    Opcode::SourceHeader { size: 0 },
    Opcode::TargetHeader { size: 2, metadata: vec![] },
    Opcode::TargetRead { bytespan: NonZeroU64::new(1).unwrap(), payload: b"a".to_vec() },
    Opcode::TargetRead { bytespan: NonZeroU64::new(1).unwrap(), payload: b"b".to_vec() },
    Opcode::SourceCrc32 { crc: 0 },
    Opcode::TargetCrc32 { crc: 0 },
    Opcode::PatchCrc32 { crc: 0 },
  ];
  let optimized = optimize(opcodes.into_iter().map(Ok)).unwrap();
  assert_eq!(
    optimized[2],
    Opcode::TargetRead { bytespan: NonZeroU64::new(2).unwrap(), payload: b"ab".to_vec() }
  );

  let mut buf = Vec::new();
  write_patch(optimized.into_iter().map(Ok), &mut buf).unwrap();
  let opcodes = read_patch(Cursor::new(buf)).unwrap();
  let result: Result<Vec<_>, _> = validate(opcodes).collect();
  assert!(result.is_ok());
}

#[test]
fn diff_output_always_validates_for_arbitrary_bytes_at_several_blocksizes() {
  let source: Vec<u8> = (0u8..=255).collect();
  let mut target = source.clone();
  target.reverse();
  target.extend_from_slice(b"tail bytes absent from source");

  for blocksize in [1, 4, 16, 64] {
    let opcodes = diff(blocksize, &source, &target).unwrap();
    let mut buf = Vec::new();
    write_patch(opcodes.into_iter().map(Ok), &mut buf).unwrap();
    let parsed = read_patch(Cursor::new(buf)).unwrap();
    let result: Result<Vec<_>, _> = validate_against(parsed, &source, &target).collect();
    assert!(result.is_ok(), "blocksize {blocksize} produced an invalid patch");
    assert_eq!(full_pipeline(&source, &target, blocksize), target);
  }
}

#[test]
fn optimized_patch_is_never_larger_than_the_unoptimized_one() {
  let source: Vec<u8> = (0u8..=255).collect();
  let mut target = source.clone();
  target.reverse();

  let opcodes = diff(4, &source, &target).unwrap();
  let mut unoptimized = Vec::new();
  write_patch(opcodes.clone().into_iter().map(Ok), &mut unoptimized).unwrap();

  let optimized_opcodes = optimize(opcodes.into_iter().map(Ok)).unwrap();
  let mut optimized = Vec::new();
  write_patch(optimized_opcodes.into_iter().map(Ok), &mut optimized).unwrap();

  assert!(optimized.len() <= unoptimized.len());
}
