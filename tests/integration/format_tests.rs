//! Detection and header parsing across format families.

use sciplane::{
    detect, Engine, EngineOptions, ErrorKind, FormatKind, MemoryReader, PixelType, DETECTION_ORDER,
};

use super::test_utils::*;

fn detect_bytes(data: Vec<u8>, name: &str) -> Result<FormatKind, sciplane::FormatError> {
    detect(&MemoryReader::new(data, name))
}

fn open(data: Vec<u8>, name: &str) -> Engine<MemoryReader> {
    Engine::open(MemoryReader::new(data, name), EngineOptions::default()).unwrap()
}

// =============================================================================
// Detection
// =============================================================================

#[test]
fn test_every_family_is_detected() {
    let cases: Vec<(Vec<u8>, FormatKind)> = vec![
        (
            create_liff(2, &[liff_v2_image(1, "z0", 2, 2, &[0; 4])]),
            FormatKind::Liff,
        ),
        (
            create_deltavision(true, 2, 2, 1, 0, 1, 1, &[0; 4]),
            FormatKind::Deltavision,
        ),
        (create_biorad(2, 2, 1, 1, &[0; 4], &[]), FormatKind::BioRad),
        (create_spe(2, 2, 3, 1, &[0; 8]), FormatKind::Spe),
        (
            create_ics(
                &["layout\torder\tbits\tx\ty", "layout\tsizes\t8\t2\t2"],
                &[0; 4],
            ),
            FormatKind::Ics,
        ),
        (create_netcdf(1, 2, 2, &[0; 8]), FormatKind::NetCdf),
        (
            create_tiff(vec![(
                {
                    let mut tags = tiff_image_tags(2, 2, 8, 1);
                    tags.push((33422, TiffValue::Bytes(vec![0, 1, 1, 2])));
                    tags
                },
                vec![0; 4],
            )]),
            FormatKind::TiffCfa,
        ),
        (
            create_tiff(vec![(
                {
                    let mut tags = tiff_image_tags(2, 2, 8, 1);
                    tags.push((270, TiffValue::Ascii("ImageJ=1.54f\nimages=1\n".into())));
                    tags
                },
                vec![0; 4],
            )]),
            FormatKind::ImageJTiff,
        ),
        (
            create_tiff(vec![(tiff_image_tags(2, 2, 8, 1), vec![0; 4])]),
            FormatKind::Tiff,
        ),
        (
            create_rle_stack(2, 2, 1000, &[vec![1, 2, 3, 4]]),
            FormatKind::RleStack,
        ),
        (create_arf(true, 2, 2, 8, 1, &[0; 4]), FormatKind::Arf),
        (vec![0u8; 512 * 512 * 2], FormatKind::RawLength),
    ];

    for (data, expected) in cases {
        let kind = detect_bytes(data, "source").unwrap();
        assert_eq!(kind, expected, "detected {} instead of {}", kind, expected);
    }
}

#[test]
fn test_detection_order_constant() {
    assert_eq!(DETECTION_ORDER.len(), 12);
    assert_eq!(DETECTION_ORDER[0], FormatKind::Liff);
    assert_eq!(DETECTION_ORDER[10], FormatKind::Arf);
    assert_eq!(DETECTION_ORDER[11], FormatKind::RawLength);

    let cfa = DETECTION_ORDER.iter().position(|k| *k == FormatKind::TiffCfa);
    let tiff = DETECTION_ORDER.iter().position(|k| *k == FormatKind::Tiff);
    assert!(cfa < tiff);
}

#[test]
fn test_arf_header_on_raw_length_is_arf() {
    let mut data = create_arf(true, 16, 16, 8, 1, &[0; 256]);
    data.resize(160 * 120 + 640 * 480, 0);
    assert_eq!(detect_bytes(data, "ambiguous").unwrap(), FormatKind::Arf);
}

#[test]
fn test_headerless_raw_length_is_recognised() {
    let data = vec![0x5Au8; 640 * 480 * 3 / 2];
    assert_eq!(detect_bytes(data, "frame.raw").unwrap(), FormatKind::RawLength);
}

#[test]
fn test_unrecognized_source() {
    let err = detect_bytes(b"%PDF-1.7 not an image".to_vec(), "doc.pdf").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnrecognizedFormat);
}

#[test]
fn test_sniffing_reads_a_bounded_prefix() {
    let reader = TrackingMockReader::new(vec![0u8; 1 << 20], "big.bin");
    assert!(detect(&reader).is_err());
    for (offset, len) in reader.get_requests() {
        assert!(len <= 8192, "sniff read {} bytes at {}", len, offset);
    }
}

// =============================================================================
// Header parsing
// =============================================================================

#[test]
fn test_deltavision_header() {
    let pixels = vec![0u8; 2 * 2 * 2 * 6];
    let engine = open(
        create_deltavision(false, 2, 2, 6, 6, 2, 3, &pixels),
        "cells.dv",
    );
    let desc = engine.descriptor(0).unwrap();
    assert_eq!(desc.pixel_type, PixelType::Uint16);
    assert!(!desc.little_endian);
    assert_eq!((desc.size_z, desc.size_c, desc.size_t), (1, 2, 3));
    let dz = engine.calibration().physical_size_z.unwrap();
    assert!((dz - 0.3).abs() < 1e-6);
}

#[test]
fn test_truncated_deltavision_keeps_channels() {
    // Two channels, four timepoints declared; only three timepoints written
    let pixels = pattern(2 * 2 * 6);
    let engine = open(
        create_deltavision(true, 2, 2, 8, 0, 2, 4, &pixels),
        "short.dv",
    );
    let desc = engine.descriptor(0).unwrap();
    assert_eq!((desc.size_z, desc.size_c, desc.size_t), (1, 2, 3));
    assert_eq!(desc.image_count(), 6);

    let last = engine.decode_plane(0, 5, None).unwrap();
    assert_eq!(last.data, pixels[20..24].to_vec());
    let err = engine.decode_plane(0, 6, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PlaneIndexOutOfRange);
}

#[test]
fn test_truncated_deltavision_shortens_depth() {
    // Z=3, C=2, T=2 in XYZTC order with eight planes present
    let engine = open(
        create_deltavision(true, 2, 2, 12, 0, 2, 2, &pattern(2 * 2 * 8)),
        "stack.dv",
    );
    let desc = engine.descriptor(0).unwrap();
    assert_eq!((desc.size_z, desc.size_c, desc.size_t), (2, 2, 2));
}

#[test]
fn test_biorad_notes_reach_metadata() {
    let engine = open(
        create_biorad(
            2,
            2,
            2,
            1,
            &[0; 8],
            &[(1, "stained with DAPI"), (20, "AXIS_2 = 257 0.0 0.5 microns")],
        ),
        "cells.pic",
    );
    assert_eq!(
        engine.metadata().get_text("Note 1").as_deref(),
        Some("stained with DAPI")
    );
    assert_eq!(engine.calibration().physical_size_x, Some(0.5));
}

#[test]
fn test_ics_keys_update_descriptor() {
    let engine = open(
        create_ics(
            &[
                "layout\torder\tbits\tx\ty\tz",
                "layout\tsizes\t16\t2\t2\t3",
                "representation\tbyte_order\t1\t2",
                "layout\tsizes\t16\t2\t2\t2",
                "sensor\tmodel\tXR-1",
            ],
            &[0; 2 * 2 * 2 * 2],
        ),
        "stack.ics",
    );
    let desc = engine.descriptor(0).unwrap();
    // The later sizes line wins
    assert_eq!(desc.size_z, 2);
    assert!(desc.little_endian);
    assert_eq!(
        engine.metadata().get_text("sensor model").as_deref(),
        Some("XR-1")
    );
}

#[test]
fn test_spe_timestamp() {
    let engine = open(create_spe(2, 2, 3, 2, &[0; 16]), "run.spe");
    assert_eq!(engine.descriptor(0).unwrap().size_t, 2);
    assert_eq!(engine.calibration().timestamp.as_deref(), Some("05Feb2008"));
}

#[test]
fn test_imagej_decoder_is_recorded() {
    let mut tags = tiff_image_tags(2, 2, 8, 1);
    tags.push((
        270,
        TiffValue::Ascii("ImageJ=1.54f\nimages=2\nslices=2\n".into()),
    ));
    let engine = open(create_tiff(vec![(tags, vec![1; 8])]), "hs.tif");
    assert_eq!(engine.decoder_used(), "ImageJ hyperstack");
    assert_eq!(engine.descriptor(0).unwrap().size_z, 2);
}

#[test]
fn test_compressed_tiff_is_unsupported() {
    let mut tags = tiff_image_tags(2, 2, 8, 1);
    tags[3] = (259, TiffValue::Short(8));
    let data = create_tiff(vec![(tags, vec![0; 4])]);
    let err = Engine::open(MemoryReader::new(data, "zip.tif"), EngineOptions::default())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::UnsupportedVariant);
}

#[test]
fn test_truncated_arf_fails_to_open() {
    let data = create_arf(true, 4, 4, 8, 1, &[0; 10]);
    let err = Engine::open(MemoryReader::new(data, "short.arf"), EngineOptions::default())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::TruncatedData);
}
