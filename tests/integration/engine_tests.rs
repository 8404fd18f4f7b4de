//! Plane addressing and decoding through the engine.

use sciplane::codec::swap_in_place;
use sciplane::{ByteOrder, Engine, EngineOptions, ErrorKind, FormatKind, MemoryReader, Region};

use super::test_utils::*;

fn open(data: Vec<u8>, name: &str) -> Engine<MemoryReader> {
    Engine::open(MemoryReader::new(data, name), EngineOptions::default()).unwrap()
}

fn sample_sources() -> Vec<Engine<MemoryReader>> {
    vec![
        open(create_arf(false, 3, 2, 16, 2, &pattern(24)), "two.arf"),
        open(
            create_deltavision(true, 4, 3, 4, 0, 2, 1, &pattern(48)),
            "four.dv",
        ),
        open(create_biorad(5, 2, 3, 0, &pattern(60), &[]), "three.pic"),
        open(create_spe(2, 2, 0, 2, &pattern(32)), "float.spe"),
        open(create_netcdf(2, 3, 2, &pattern(24)), "vol.nc"),
        open(
            create_liff(2, &[liff_v2_image(8, "rgb", 2, 2, &pattern(12))]),
            "rgb.liff",
        ),
        open(
            create_tiff(vec![
                (tiff_image_tags(3, 3, 8, 3), pattern(27)),
                (tiff_image_tags(3, 3, 8, 3), pattern(27)),
            ]),
            "rgb.tif",
        ),
        open(vec![0u8; 160 * 120 + 640 * 480], "frames.raw"),
    ]
}

// =============================================================================
// Buffer sizes and addressing
// =============================================================================

#[test]
fn test_every_plane_has_the_declared_size() {
    for engine in sample_sources() {
        for series in 0..engine.series_count() {
            let desc = engine.descriptor(series).unwrap().clone();
            for plane in 0..desc.image_count() {
                let buf = engine.decode_plane(series, plane, None).unwrap();
                let expected = desc.width as usize
                    * desc.height as usize
                    * desc.channels_per_pixel()
                    * desc.bytes_per_sample();
                assert_eq!(
                    buf.len(),
                    expected,
                    "{} series {} plane {}",
                    engine.identifier(),
                    series,
                    plane
                );
            }
        }
    }
}

#[test]
fn test_plane_past_the_end_is_out_of_range() {
    for engine in sample_sources() {
        for series in 0..engine.series_count() {
            let count = engine.descriptor(series).unwrap().image_count();
            let err = engine.decode_plane(series, count, None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PlaneIndexOutOfRange);
        }
        let err = engine
            .decode_plane(engine.series_count(), 0, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SeriesOutOfRange);
    }
}

#[test]
fn test_multi_series_raw_addressing() {
    let engine = open(vec![0u8; 160 * 120 + 640 * 480], "frames.raw");
    assert_eq!(engine.format(), FormatKind::RawLength);
    assert_eq!(engine.series_count(), 2);
    assert_eq!(engine.resolve(0, 0).unwrap().offset, 0);
    assert_eq!(engine.resolve(1, 0).unwrap().offset, 160 * 120);
    assert_eq!(engine.descriptor(1).unwrap().width, 640);
}

#[test]
fn test_imagej_plane_index() {
    let mut tags = tiff_image_tags(2, 2, 8, 1);
    tags.push((
        270,
        TiffValue::Ascii("ImageJ=1.54f\nimages=4\nchannels=2\nslices=2\nhyperstack=true\n".into()),
    ));
    let engine = open(create_tiff(vec![(tags, pattern(16))]), "hs.tif");
    assert_eq!(engine.plane_index(0, 1, 1, 0).unwrap(), Some(3));
    assert_eq!(engine.plane_index(0, 2, 0, 0).unwrap(), None);

    let plane = engine.decode_plane(0, 3, None).unwrap();
    assert_eq!(plane.data, pattern(16)[12..16].to_vec());
}

// =============================================================================
// Byte order
// =============================================================================

#[test]
fn test_big_endian_samples_in_host_order() {
    let values = [1u16, 258, 513, 65535];
    let engine = open(
        create_deltavision(false, 2, 2, 1, 6, 1, 1, &u16_bytes(&values, false)),
        "be.dv",
    );
    let buf = engine.decode_plane(0, 0, None).unwrap();
    assert_eq!(buf.byte_order, ByteOrder::native());
    assert_eq!(buf.to_u16().unwrap(), values.to_vec());
}

#[test]
fn test_forced_order_matches_swapped_native() {
    let values = [7u16, 0x1234, 0xABCD, 42];
    let engine = open(
        create_deltavision(false, 2, 2, 1, 6, 1, 1, &u16_bytes(&values, false)),
        "be.dv",
    );
    let native = engine.decode_plane(0, 0, None).unwrap();
    let mut forced = engine
        .decode_plane_as(0, 0, None, ByteOrder::native().opposite())
        .unwrap();
    swap_in_place(&mut forced.data, 2);
    assert_eq!(forced.data, native.data);
}

// =============================================================================
// Direct reads
// =============================================================================

#[test]
fn test_arf_scenario() {
    let pixels: Vec<u8> = (0..16).collect();
    let engine = open(create_arf(true, 4, 4, 8, 1, &pixels), "scenario.arf");
    let desc = engine.descriptor(0).unwrap();
    assert_eq!((desc.width, desc.height, desc.image_count()), (4, 4, 1));

    let buf = engine
        .decode_plane(0, 0, Some(Region::new(0, 0, 4, 4)))
        .unwrap();
    assert_eq!(buf.data, pixels);
}

#[test]
fn test_region_read_touches_only_needed_rows() {
    let width = 256usize;
    let height = 256usize;
    let plane_bytes = width * height * 2;
    let reader = TrackingMockReader::new(
        create_spe(width as u16, height as u16, 3, 1, &pattern(plane_bytes)),
        "big.spe",
    );
    let options = EngineOptions {
        block_size: 1024,
        ..EngineOptions::default()
    };
    let engine = Engine::open(reader.clone(), options).unwrap();
    reader.reset_tracking();

    let buf = engine
        .decode_plane(0, 0, Some(Region::new(0, 10, 16, 2)))
        .unwrap();
    assert_eq!(buf.len(), 16 * 2 * 2);
    assert!(reader.request_count() > 0);
    assert!(
        reader.bytes_requested() < plane_bytes / 16,
        "read {} bytes for a two-row region",
        reader.bytes_requested()
    );
}

#[test]
fn test_inverted_volume_type() {
    let engine = open(
        create_liff(2, &[liff_v2_image(5, "grey", 2, 2, &[0, 1, 2, 3])]),
        "mac.liff",
    );
    let buf = engine.decode_plane(0, 0, None).unwrap();
    assert_eq!(buf.data, vec![255, 254, 253, 252]);
}

#[test]
fn test_planar_rgb_region() {
    let pixels: Vec<u8> = (1..=12).collect();
    let engine = open(
        create_liff(2, &[liff_v2_image(8, "rgb", 2, 2, &pixels)]),
        "rgb.liff",
    );
    let buf = engine
        .decode_plane(0, 0, Some(Region::new(1, 0, 1, 2)))
        .unwrap();
    assert_eq!(buf.channels, 3);
    assert!(!buf.interleaved);
    assert_eq!(buf.data, vec![2, 4, 6, 8, 10, 12]);

    let interleaved = buf.into_interleaved();
    assert_eq!(interleaved.data, vec![2, 6, 10, 4, 8, 12]);
}

// =============================================================================
// Decode cache
// =============================================================================

#[test]
fn test_decoded_planes_are_cached() {
    let planes = vec![vec![1u16, 2, 3, 4], vec![5, 6, 7, 8]];
    let engine = open(create_rle_stack(2, 2, 1000, &planes), "two.rlds");
    assert_eq!(engine.cached_planes(), 0);

    engine.decode_plane(0, 1, None).unwrap();
    engine.decode_plane(0, 1, Some(Region::new(0, 0, 1, 1))).unwrap();
    assert_eq!(engine.cached_planes(), 1);

    engine.decode_plane(0, 0, None).unwrap();
    assert_eq!(engine.cached_planes(), 2);
}

#[test]
fn test_zero_capacity_disables_cache() {
    let planes = vec![vec![1u16, 2, 3, 4]];
    let options = EngineOptions {
        cache_planes: 0,
        ..EngineOptions::default()
    };
    let engine = Engine::open(
        MemoryReader::new(create_rle_stack(2, 2, 1000, &planes), "one.rlds"),
        options,
    )
    .unwrap();
    let first = engine.decode_plane(0, 0, None).unwrap();
    let second = engine.decode_plane(0, 0, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.cached_planes(), 0);
}
