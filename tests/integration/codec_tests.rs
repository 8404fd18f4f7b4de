//! Sample decoders exercised through real format layouts.

use sciplane::{
    ByteOrder, Engine, EngineOptions, ErrorKind, FormatError, FormatKind, MemoryReader, Packing,
    PlaneCodec, Region,
};

use super::test_utils::*;

fn open_with(data: Vec<u8>, name: &str, options: EngineOptions) -> Engine<MemoryReader> {
    Engine::open(MemoryReader::new(data, name), options).unwrap()
}

fn open(data: Vec<u8>, name: &str) -> Engine<MemoryReader> {
    open_with(data, name, EngineOptions::default())
}

// =============================================================================
// Bit unpacking
// =============================================================================

#[test]
fn test_packed_12_bit_raw_frame() {
    let samples: Vec<u16> = (0..640 * 480).map(|i| ((i * 37) % 4096) as u16).collect();
    let engine = open(pack_msb12(&samples), "frame.raw");
    assert_eq!(engine.format(), FormatKind::RawLength);
    assert_eq!(
        engine.codec(),
        PlaneCodec::Unpack {
            packing: Packing::Msb12
        }
    );

    let buf = engine
        .decode_plane_as(0, 0, None, ByteOrder::LittleEndian)
        .unwrap();
    assert_eq!(buf.to_u16().unwrap(), samples);

    let corner = engine
        .decode_plane_as(0, 0, Some(Region::new(638, 479, 2, 1)), ByteOrder::LittleEndian)
        .unwrap();
    let last = samples.len();
    assert_eq!(corner.to_u16().unwrap(), samples[last - 2..].to_vec());
}

// =============================================================================
// Bayer demosaicing
// =============================================================================

fn cfa_tiff(pixels: Vec<u8>) -> Vec<u8> {
    let mut tags = tiff_image_tags(4, 4, 8, 1);
    tags.push((33422, TiffValue::Bytes(vec![0, 1, 1, 2])));
    create_tiff(vec![(tags, pixels)])
}

#[test]
fn test_demosaic_is_deterministic() {
    let options = EngineOptions {
        cache_planes: 0,
        ..EngineOptions::default()
    };
    let engine = open_with(cfa_tiff(pattern(16)), "bayer.tif", options);
    assert_eq!(engine.format(), FormatKind::TiffCfa);

    let first = engine.decode_plane(0, 0, None).unwrap();
    let second = engine.decode_plane(0, 0, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.channels, 3);
    assert_eq!(first.len(), 4 * 4 * 3 * 2);
}

#[test]
fn test_demosaic_keeps_measured_sites() {
    let cfa = pattern(16);
    let engine = open(cfa_tiff(cfa.clone()), "bayer.tif");
    let rgb = engine.decode_plane(0, 0, None).unwrap().to_u16().unwrap();

    // RGGB: (0,0) measures red, (1,0) green, (1,1) blue
    assert_eq!(rgb[0], cfa[0] as u16);
    assert_eq!(rgb[3 + 1], cfa[1] as u16);
    assert_eq!(rgb[(4 + 1) * 3 + 2], cfa[5] as u16);
}

// =============================================================================
// Delta run-length
// =============================================================================

#[test]
fn test_literal_only_rle_plane() {
    let values = vec![10u16, 500, 999, 0, 7, 42];
    let engine = open(
        create_rle_stack(3, 2, 1000, std::slice::from_ref(&values)),
        "lit.rlds",
    );
    let buf = engine
        .decode_plane_as(0, 0, None, ByteOrder::LittleEndian)
        .unwrap();
    assert_eq!(buf.to_u16().unwrap(), values);
}

#[test]
fn test_rle_run_of_five() {
    let words = vec![1005u16, 100, pack_deltas([1, 1, 1]), pack_deltas([1, 1, 0])];
    let engine = open(create_rle_stack(5, 1, 1000, &[words]), "run.rlds");
    let buf = engine
        .decode_plane_as(0, 0, None, ByteOrder::LittleEndian)
        .unwrap();
    assert_eq!(buf.to_u16().unwrap(), vec![101, 102, 103, 104, 105]);
}

#[test]
fn test_truncated_rle_plane() {
    let engine = open(create_rle_stack(4, 4, 1000, &[vec![1, 2, 3]]), "short.rlds");
    let err = engine.decode_plane(0, 0, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TruncatedData);
}

// =============================================================================
// LZO blocks
// =============================================================================

fn lzo_liff(stream: &[u8]) -> Vec<u8> {
    create_liff(5, &[liff_v5_image(1, 4, 2, stream)])
}

#[test]
fn test_lzo_plane_resyncs_after_corrupt_block() {
    let payload = [10u8, 20, 30, 40, 50, 60, 70, 80];
    let mut stream = vec![0xFF; 37];
    stream.extend_from_slice(b"IV");
    stream.extend_from_slice(&lzo_literal_block(&payload));

    let engine = open(lzo_liff(&stream), "resync.liff");
    assert_eq!(engine.format(), FormatKind::Liff);
    let buf = engine.decode_plane(0, 0, None).unwrap();
    assert_eq!(buf.data, payload.to_vec());
}

#[test]
fn test_lzo_without_marker_fails() {
    let engine = open(lzo_liff(&[0xFF; 37]), "broken.liff");
    let err = engine.decode_plane(0, 0, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecompressionFailure);
    assert!(matches!(
        err,
        FormatError::DecompressionFailure { format: "Openlab LIFF", .. }
    ));
}

#[test]
fn test_lzo_resync_respects_scan_limit() {
    let payload = [1u8; 8];
    let mut stream = vec![0xFF; 37];
    stream.extend_from_slice(b"IV");
    stream.extend_from_slice(&lzo_literal_block(&payload));

    let options = EngineOptions {
        resync_limit: 8,
        ..EngineOptions::default()
    };
    let engine = open_with(lzo_liff(&stream), "far.liff", options);
    let err = engine.decode_plane(0, 0, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecompressionFailure);
}

#[test]
fn test_lzo_argb_plane_loses_alpha() {
    let argb = [
        0xFF, 0x10, 0x20, 0x30, 0xFF, 0x11, 0x21, 0x31, //
        0xFF, 0x12, 0x22, 0x32, 0xFF, 0x13, 0x23, 0x33,
    ];
    let data = create_liff(5, &[liff_v5_image(8, 2, 2, &lzo_literal_block(&argb))]);
    let engine = open(data, "argb.liff");
    let desc = engine.descriptor(0).unwrap();
    assert!(desc.rgb && desc.interleaved);

    let buf = engine.decode_plane(0, 0, None).unwrap();
    assert_eq!(buf.channels, 3);
    assert_eq!(
        buf.data,
        vec![0x10, 0x20, 0x30, 0x11, 0x21, 0x31, 0x12, 0x22, 0x32, 0x13, 0x23, 0x33]
    );

    let corner = engine
        .decode_plane(0, 0, Some(Region::new(1, 1, 1, 1)))
        .unwrap();
    assert_eq!(corner.data, vec![0x13, 0x23, 0x33]);
}
