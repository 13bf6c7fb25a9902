/// Integration tests: blocks written with the bundled encodings and codecs,
/// read back through handles and ranges.
///
/// Covers the range contract (counts, skip equivalence, release), snapshot
/// isolation between a handle and the ranges it issued, concurrent readers,
/// and how corrupt blocks fault a range.
use std::sync::Arc;

use colblock_codecs::default_registry;
use colblock_core::format::{
    ChunkHeaders, CHUNK_HEADER_SIZE, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZSTD,
    ENCODING_FIXED_INT, ENCODING_FLOAT64, ENCODING_PLAIN, ENCODING_RLE,
};
use colblock_core::{
    BlockInfo, BlockWriter, EncodedBlock, ErrorKind, FlexValue, RangeStatus, WriterConfig,
};

// ── helpers ───────────────────────────────────────────────────────────────

/// Deterministic LCG, same constants as the data generators elsewhere.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// A column suited to `encoding`.
fn column(encoding: u16, len: usize, seed: u64) -> Vec<FlexValue> {
    let mut rng = Lcg(seed);
    (0..len)
        .map(|i| match encoding {
            ENCODING_FIXED_INT => FlexValue::Integer(rng.below(60_000) as i64 - 30_000),
            ENCODING_FLOAT64 => FlexValue::Float(rng.below(1 << 20) as f64 / 64.0),
            // long runs
            ENCODING_RLE => FlexValue::Integer((i / 7) as i64 % 3),
            _ => match rng.below(5) {
                0 => FlexValue::Null,
                1 => FlexValue::Integer(rng.next() as i64),
                2 => FlexValue::Float(rng.below(1000) as f64 * 0.25),
                3 => FlexValue::String(format!("value-{}", rng.below(100))),
                _ => FlexValue::Vector(vec![i as f64, rng.below(10) as f64]),
            },
        })
        .collect()
}

fn write_block(values: &[FlexValue], config: WriterConfig) -> EncodedBlock {
    let mut writer = BlockWriter::new(default_registry(), config).unwrap();
    writer.write(values).unwrap();
    writer.finish_block().unwrap()
}

fn raw_block(values: &[FlexValue], config: WriterConfig) -> (BlockInfo, Vec<u8>) {
    let mut writer = BlockWriter::new(default_registry(), config).unwrap();
    writer.write(values).unwrap();
    writer.finish().unwrap()
}

fn int_values(values: &[i64]) -> Vec<FlexValue> {
    values.iter().map(|&v| FlexValue::Integer(v)).collect()
}

fn decode_all(block: &EncodedBlock, batch: usize) -> Vec<FlexValue> {
    block
        .get_range()
        .into_values(batch)
        .map(|v| v.unwrap())
        .collect()
}

fn all_configs() -> Vec<WriterConfig> {
    let mut configs = Vec::new();
    for encoding in [ENCODING_PLAIN, ENCODING_FIXED_INT, ENCODING_RLE, ENCODING_FLOAT64] {
        for (codec, chunk_len) in [(CODEC_PASSTHROUGH, 1), (CODEC_ZSTD, 16), (CODEC_LZ4, 100)] {
            configs.push(
                WriterConfig::default()
                    .with_encoding(encoding)
                    .with_codec(codec)
                    .with_chunk_len(chunk_len),
            );
        }
    }
    configs
}

// ── range contract ────────────────────────────────────────────────────────

#[test]
fn test_five_integers_decode_in_steps() {
    for chunk_len in [1, 2, 5, 64] {
        let config = WriterConfig::default()
            .with_encoding(ENCODING_FIXED_INT)
            .with_element_width(Some(2))
            .with_chunk_len(chunk_len);
        let block = write_block(&int_values(&[10, 20, 30, 40, 50]), config);
        assert_eq!(block.size(), 5);

        let mut range = block.get_range();
        let mut buf3 = vec![FlexValue::Null; 3];
        assert_eq!(range.decode_to(&mut buf3).unwrap(), 3);
        assert_eq!(buf3, int_values(&[10, 20, 30]));

        let mut buf10 = vec![FlexValue::Null; 10];
        assert_eq!(range.decode_to(&mut buf10).unwrap(), 2);
        assert_eq!(&buf10[..2], &int_values(&[40, 50])[..]);

        let mut buf1 = vec![FlexValue::Null; 1];
        assert_eq!(range.decode_to(&mut buf1).unwrap(), 0);
        assert_eq!(range.status(), RangeStatus::Exhausted);
    }
}

#[test]
fn test_skip_two_then_decode_three() {
    for chunk_len in [1, 2, 3, 64] {
        let config = WriterConfig::default()
            .with_encoding(ENCODING_PLAIN)
            .with_chunk_len(chunk_len);
        let block = write_block(&int_values(&[10, 20, 30, 40, 50]), config);

        let mut range = block.get_range();
        assert_eq!(range.skip(2).unwrap(), 2);
        let mut buf3 = vec![FlexValue::Null; 3];
        assert_eq!(range.decode_to(&mut buf3).unwrap(), 3);
        assert_eq!(buf3, int_values(&[30, 40, 50]));
        assert_eq!(range.position(), 5);
    }
}

/// Requested counts summing past the declared count return exactly that
/// count, and the call that reaches it is the first short one.
#[test]
fn test_decode_totals_match_declared_count() {
    let mut rng = Lcg(0xC0FFEE);
    for config in all_configs() {
        let len = 1 + rng.below(300) as usize;
        let values = column(config.encoding, len, rng.next());
        let block = write_block(&values, config);

        let mut range = block.get_range();
        let mut decoded = Vec::new();
        loop {
            let want = 1 + rng.below(40) as usize;
            let mut buf = vec![FlexValue::Null; want];
            let got = range.decode_to(&mut buf).unwrap();
            decoded.extend_from_slice(&buf[..got]);
            if got < want {
                assert_eq!(decoded.len(), len);
                break;
            }
            assert!(decoded.len() <= len);
        }
        assert_eq!(decoded, values);
        assert_eq!(range.decode_to(&mut [FlexValue::Null]).unwrap(), 0);
    }
}

#[test]
fn test_skip_equivalent_to_discarding_decode() {
    let mut rng = Lcg(0x5EED);
    for config in all_configs() {
        let len = 150;
        let values = column(config.encoding, len, rng.next());
        let block = write_block(&values, config.clone());

        for _ in 0..12 {
            let k = rng.below(len as u64 + 10) as usize;
            let m = 1 + rng.below(60) as usize;

            let mut skipping = block.get_range();
            let skipped = skipping.skip(k as u64).unwrap() as usize;
            assert_eq!(skipped, k.min(len));
            let mut a = vec![FlexValue::Null; m];
            let got_a = skipping.decode_to(&mut a).unwrap();

            let mut decoding = block.get_range();
            let mut discard = vec![FlexValue::Null; k];
            decoding.decode_to(&mut discard).unwrap();
            let mut b = vec![FlexValue::Null; m];
            let got_b = decoding.decode_to(&mut b).unwrap();

            assert_eq!(got_a, got_b, "k={k} m={m} config={config:?}");
            assert_eq!(a, b, "k={k} m={m} config={config:?}");
            let start = k.min(len);
            assert_eq!(&a[..got_a], &values[start..(start + m).min(len)]);
        }
    }
}

#[test]
fn test_interleaved_skips_and_decodes() {
    let values = column(ENCODING_RLE, 500, 1);
    let block = write_block(
        &values,
        WriterConfig::default()
            .with_encoding(ENCODING_RLE)
            .with_chunk_len(33),
    );
    let mut range = block.get_range();
    let mut expected_pos = 0usize;
    let mut rng = Lcg(99);
    while expected_pos < values.len() {
        if rng.below(2) == 0 {
            let n = rng.below(80);
            let skipped = range.skip(n).unwrap() as usize;
            assert_eq!(skipped, (n as usize).min(values.len() - expected_pos));
            expected_pos += skipped;
        } else {
            let mut buf = vec![FlexValue::Null; 1 + rng.below(50) as usize];
            let got = range.decode_to(&mut buf).unwrap();
            assert_eq!(&buf[..got], &values[expected_pos..expected_pos + got]);
            expected_pos += got;
        }
        assert_eq!(range.position() as usize, expected_pos);
    }
    assert_eq!(range.skip(1).unwrap(), 0);
}

#[test]
fn test_empty_block() {
    let block = write_block(&[], WriterConfig::default());
    assert_eq!(block.size(), 0);
    assert_eq!(block.block_data().unwrap().len(), 0);
    let mut range = block.get_range();
    assert_eq!(range.decode_to(&mut [FlexValue::Null, FlexValue::Null]).unwrap(), 0);
    assert_eq!(range.status(), RangeStatus::Exhausted);
}

// ── lifecycle ─────────────────────────────────────────────────────────────

#[test]
fn test_release_at_any_point() {
    let values = column(ENCODING_PLAIN, 40, 3);
    let block = write_block(&values, WriterConfig::default().with_chunk_len(8));

    // before any decode
    let mut range = block.get_range();
    range.release();
    range.release();
    assert!(range.skip(1).unwrap_err().is_misuse());

    // mid-chunk
    let mut range = block.get_range();
    let mut buf = vec![FlexValue::Null; 3];
    range.decode_to(&mut buf).unwrap();
    range.release();
    assert!(range.decode_to(&mut buf).unwrap_err().is_misuse());
    assert_eq!(range.status(), RangeStatus::Released);

    // after exhaustion
    let mut range = block.get_range();
    assert_eq!(range.skip(1000).unwrap(), 40);
    range.release();
    assert!(range.decode_to(&mut buf).unwrap_err().is_misuse());
}

#[test]
fn test_two_ranges_are_independent() {
    let values = column(ENCODING_PLAIN, 200, 11);
    let block = write_block(&values, WriterConfig::default().with_chunk_len(17));

    let mut first = block.get_range();
    let mut second = block.get_range();
    let mut a = Vec::new();
    let mut b = Vec::new();
    let mut buf = vec![FlexValue::Null; 13];
    loop {
        let n = first.decode_to(&mut buf).unwrap();
        a.extend_from_slice(&buf[..n]);
        let n2 = second.decode_to(&mut buf[..7]).unwrap();
        b.extend_from_slice(&buf[..n2]);
        if n == 0 && n2 == 0 {
            break;
        }
    }
    assert_eq!(a, values);
    assert_eq!(b, values);

    // a later range over the same handle sees the same sequence
    assert_eq!(decode_all(&block, 64), values);
}

#[test]
fn test_init_does_not_affect_issued_ranges() {
    let old_values = int_values(&[1, 2, 3, 4, 5, 6]);
    let new_values = int_values(&[100, 200]);
    let mut block = write_block(&old_values, WriterConfig::default().with_chunk_len(2));

    let mut range = block.get_range();
    let mut buf = vec![FlexValue::Null; 2];
    range.decode_to(&mut buf).unwrap();

    let (info, data) = raw_block(&new_values, WriterConfig::default());
    block.init(info, data);
    assert_eq!(block.size(), 2);

    let mut rest = vec![FlexValue::Null; 10];
    assert_eq!(range.decode_to(&mut rest).unwrap(), 4);
    assert_eq!(&rest[..4], &old_values[2..]);
    assert_eq!(decode_all(&block, 8), new_values);

    // an unstarted range is just as isolated
    let pending = block.get_range();
    block.release();
    assert_eq!(block.size(), 0);
    assert!(block.is_empty());
    let decoded: Vec<_> = pending.into_iter().map(|v| v.unwrap()).collect();
    assert_eq!(decoded, new_values);
}

#[test]
fn test_handles_share_bytes() {
    let (info, data) = raw_block(&column(ENCODING_PLAIN, 50, 5), WriterConfig::default());
    let shared = Arc::new(data);
    let block = EncodedBlock::from_shared(default_registry(), info, shared.clone());
    let copy = block.clone();
    assert!(Arc::ptr_eq(&block.block_data().unwrap(), &shared));
    assert!(Arc::ptr_eq(&copy.block_data().unwrap(), &shared));

    let snapshot = block.snapshot().unwrap();
    let range = copy.get_range();
    assert!(Arc::strong_count(&snapshot) >= 3);
    drop(range);
    assert_eq!(copy.block_info(), Some(info));
}

#[test]
fn test_ranges_decode_concurrently() {
    let values = column(ENCODING_PLAIN, 5_000, 21);
    let block = write_block(
        &values,
        WriterConfig::default()
            .with_codec(CODEC_LZ4)
            .with_chunk_len(128),
    );

    std::thread::scope(|scope| {
        for t in 0..4 {
            let block = &block;
            let values = &values;
            scope.spawn(move || {
                let mut range = block.get_range();
                range.skip(t * 100).unwrap();
                let mut buf = vec![FlexValue::Null; 97];
                let mut pos = (t * 100) as usize;
                loop {
                    let n = range.decode_to(&mut buf).unwrap();
                    assert_eq!(&buf[..n], &values[pos..pos + n]);
                    pos += n;
                    if n < buf.len() {
                        break;
                    }
                }
                assert_eq!(pos, values.len());
            });
        }
    });

    // a range can also be handed to another thread after creation
    let range = block.get_range();
    let decoded = std::thread::spawn(move || {
        range.into_values(500).map(|v| v.unwrap()).count()
    })
    .join()
    .unwrap();
    assert_eq!(decoded, values.len());
}

// ── corrupt blocks ────────────────────────────────────────────────────────

/// Byte offset of the payload of chunk `index`.
fn payload_offset(data: &[u8], index: usize) -> usize {
    let (at, _) = ChunkHeaders::new(data).nth(index).unwrap().unwrap();
    at + CHUNK_HEADER_SIZE
}

fn corrupt_second_chunk() -> (Vec<FlexValue>, EncodedBlock) {
    let values = int_values(&(0..12).collect::<Vec<i64>>());
    let config = WriterConfig::default()
        .with_encoding(ENCODING_FIXED_INT)
        .with_codec(CODEC_PASSTHROUGH)
        .with_chunk_len(4);
    let (info, mut data) = raw_block(&values, config);
    let at = payload_offset(&data, 1);
    data[at] ^= 0xff;
    (values, EncodedBlock::from_vec(default_registry(), info, data))
}

#[test]
fn test_checksum_failure_faults_range() {
    let (values, block) = corrupt_second_chunk();
    let mut range = block.get_range();
    let mut buf = vec![FlexValue::Null; 3];
    assert_eq!(range.decode_to(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..], &values[..3]);

    // the rest of chunk 0 is still handed out before the fault surfaces
    assert_eq!(range.decode_to(&mut buf).unwrap(), 1);
    assert_eq!(buf[0], values[3]);
    assert_eq!(range.position(), 4);

    let err = range.decode_to(&mut buf).unwrap_err();
    assert!(err.is_decode());
    assert!(matches!(err.kind(), ErrorKind::ChecksumMismatch { chunk: 1, .. }));
    assert_eq!(range.status(), RangeStatus::Faulted);

    for _ in 0..3 {
        assert!(range.decode_to(&mut buf).unwrap_err().same_as(&err));
        assert!(range.skip(1).unwrap_err().same_as(&err));
    }
    range.release();
    assert!(range.decode_to(&mut buf).unwrap_err().is_misuse());
}

/// A chunk stepped over whole by `skip` is never decompressed, so its
/// corruption goes unnoticed; a skip that ends inside it does not.
#[test]
fn test_skip_over_corrupt_chunk() {
    let (values, block) = corrupt_second_chunk();

    let mut range = block.get_range();
    assert_eq!(range.skip(8).unwrap(), 8);
    let mut buf = vec![FlexValue::Null; 8];
    assert_eq!(range.decode_to(&mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], &values[8..]);

    let mut range = block.get_range();
    assert_eq!(range.skip(5).unwrap(), 4);
    assert_eq!(range.status(), RangeStatus::Faulted);
    let err = range.decode_to(&mut buf).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::ChecksumMismatch { chunk: 1, .. }));
    assert!(range.skip(1).unwrap_err().same_as(&err));

    let mut range = block.get_range();
    let mut discard = vec![FlexValue::Null; 8];
    assert_eq!(range.decode_to(&mut discard).unwrap(), 4);
    assert!(range.decode_to(&mut discard).unwrap_err().is_decode());
}

#[test]
fn test_corrupt_payload_without_checksum() {
    let values = column(ENCODING_PLAIN, 30, 8);
    let config = WriterConfig::default()
        .with_codec(CODEC_ZSTD)
        .with_checksum(false)
        .with_chunk_len(10);
    let (info, mut data) = raw_block(&values, config);
    let at = payload_offset(&data, 2);
    for b in &mut data[at..at + 8] {
        *b = 0;
    }
    let block = EncodedBlock::from_vec(default_registry(), info, data);

    let mut range = block.get_range();
    assert_eq!(range.skip(20).unwrap(), 20);
    let err = range.decode_to(&mut [FlexValue::Null]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Corrupt { chunk: 2, .. }));
}

#[test]
fn test_unknown_encoding_surfaces_on_first_read() {
    let (mut info, data) = raw_block(&int_values(&[1, 2]), WriterConfig::default());
    info.encoding = 4242;
    let block = EncodedBlock::from_vec(default_registry(), info, data);

    let mut range = block.get_range();
    assert_eq!(range.status(), RangeStatus::Unstarted);
    let err = range.skip(1).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnknownEncoding(4242)));
    assert!(range.decode_to(&mut [FlexValue::Null]).unwrap_err().same_as(&err));
}

#[test]
fn test_declared_count_mismatch() {
    let values = int_values(&[1, 2, 3, 4, 5]);
    let config = WriterConfig::default().with_chunk_len(2);

    let (mut info, data) = raw_block(&values, config.clone());
    info.num_elem = 7;
    let block = EncodedBlock::from_vec(default_registry(), info, data);
    let mut range = block.get_range();
    let mut buf = vec![FlexValue::Null; 5];
    assert_eq!(range.decode_to(&mut buf).unwrap(), 5);
    let err = range.decode_to(&mut buf).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::CountMismatch {
            declared: 7,
            actual: 5
        }
    ));

    let (mut info, data) = raw_block(&values, config);
    info.num_elem = 3;
    let block = EncodedBlock::from_vec(default_registry(), info, data);
    let mut range = block.get_range();
    let mut buf = vec![FlexValue::Null; 10];
    assert_eq!(range.decode_to(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], &values[..2]);
    let err = range.decode_to(&mut buf).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::CountMismatch {
            declared: 3,
            actual: 4
        }
    ));
    // never more than the declared count, even through skip
    let mut range = block.get_range();
    assert_eq!(range.skip(10).unwrap(), 2);
    let err = range.skip(10).unwrap_err();
    assert!(range.decode_to(&mut buf).unwrap_err().same_as(&err));
    assert_eq!(range.position(), 2);
}

#[test]
fn test_truncated_block() {
    let values = column(ENCODING_PLAIN, 20, 2);
    let (mut info, mut data) = raw_block(&values, WriterConfig::default().with_chunk_len(5));
    data.truncate(data.len() - 3);

    // metadata still claims the full length
    let block = EncodedBlock::from_vec(default_registry(), info, data.clone());
    assert!(block.get_range().skip(1).unwrap_err().is_decode());

    info.block_size = data.len() as u64;
    let block = EncodedBlock::from_vec(default_registry(), info, data);
    let mut range = block.get_range();
    assert_eq!(range.skip(15).unwrap(), 15);
    let err = range.skip(1).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Corrupt { chunk: 3, .. }));
}
