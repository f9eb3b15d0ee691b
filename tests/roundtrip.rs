
//! End-to-end scenarios: files are created, closed, reopened, corrupted,
//! and inspected byte by byte.

use gvrs::crc;
use gvrs::error::Error;
use gvrs::io::{Data, RandomAccessFile};
use gvrs::metadata::GvrsMetadata;
use gvrs::prelude::*;
use gvrs::spec::element::{ElementSpecification, ElementType, IntCodedFloatRange};

use std::convert::TryInto;
use std::path::PathBuf;


fn temp_path(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    (dir, path)
}

fn bathymetry_specification() -> GvrsFileSpecification {
    let mut specification = GvrsFileSpecification::new(722, 1442, 60, 60).unwrap();

    specification.add_element(
        ElementSpecification::new("z", ElementType::Short {
            min_value: -11000, max_value: 9000, fill_value: i16::MIN,
        }).unwrap().with_unit_of_measure("m").with_label("elevation"),
    ).unwrap();

    specification
}


#[test]
fn specification_survives_close_and_open() {
    let (_dir, path) = temp_path("specification.gvrs");

    let mut specification = bathymetry_specification();
    specification.enable_checksums();
    specification.enable_data_compression();
    specification.geometry = CellGeometry::Area;
    specification.model = ModelTransform::axis_aligned(
        CoordinateSystem::Geographic, -180.0, -90.0, 180.0, 90.0, 722, 1442,
    ).unwrap();
    specification.product_label = Some("ETOPO1 downsample".to_string());

    specification.add_element(
        ElementSpecification::new("uncertainty", ElementType::IntCodedFloat(
            IntCodedFloatRange::new(0.0, 100.0, 10.0, 0.0).unwrap(),
        )).unwrap().categorical(),
    ).unwrap();

    let gvrs = GvrsFile::create(&path, specification.clone()).unwrap();
    let identity = gvrs.identity();
    gvrs.close().unwrap();

    let reopened = GvrsFile::open_read_only(&path).unwrap();
    assert_eq!(*reopened.specification(), specification);
    assert_eq!(reopened.identity(), identity);
}

#[test]
fn every_element_type_round_trips_through_a_reopen() {
    let (_dir, path) = temp_path("elements.gvrs");

    let mut specification = GvrsFileSpecification::new(100, 100, 20, 20).unwrap();
    specification.add_element(ElementSpecification::new("s", ElementType::Short {
        min_value: -1000, max_value: 1000, fill_value: -32768,
    }).unwrap()).unwrap();
    specification.add_element(ElementSpecification::new("i", ElementType::Int {
        min_value: -1_000_000, max_value: 1_000_000, fill_value: i32::MIN,
    }).unwrap()).unwrap();
    specification.add_element(ElementSpecification::new("f", ElementType::Float {
        min_value: -1.0, max_value: 1.0, fill_value: f32::NAN,
    }).unwrap()).unwrap();
    specification.add_element(ElementSpecification::new("icf", ElementType::IntCodedFloat(
        IntCodedFloatRange::new(-50.0, 50.0, 100.0, 0.0).unwrap(),
    )).unwrap()).unwrap();

    {
        let mut gvrs = GvrsFile::create(&path, specification).unwrap();
        let s = gvrs.element("s").unwrap();
        let i = gvrs.element("i").unwrap();
        let f = gvrs.element("f").unwrap();
        let icf = gvrs.element("icf").unwrap();

        for row in 0 .. 100 {
            for col in (0 .. 100).step_by(7) {
                gvrs.write_value_int(&s, row, col, ((row + col) % 2000) as i32 - 1000).unwrap();
                gvrs.write_value_int(&i, row, col, (row * 1000 + col) as i32 - 500_000).unwrap();
                gvrs.write_value(&f, row, col, (row as f32 / 100.0) - (col as f32 / 200.0)).unwrap();
                gvrs.write_value(&icf, row, col, (row as f32 / 4.0) - (col as f32 / 8.0)).unwrap();
            }
        }

        gvrs.close().unwrap();
    }

    let mut gvrs = GvrsFile::open_read_only(&path).unwrap();
    let s = gvrs.element("s").unwrap();
    let i = gvrs.element("i").unwrap();
    let f = gvrs.element("f").unwrap();
    let icf = gvrs.element("icf").unwrap();

    for row in 0 .. 100 {
        for col in (0 .. 100).step_by(7) {
            assert_eq!(
                gvrs.read_value_int(&s, row, col).unwrap(),
                ((row + col) % 2000) as i32 - 1000,
            );
            assert_eq!(
                gvrs.read_value_int(&i, row, col).unwrap(),
                (row * 1000 + col) as i32 - 500_000,
            );

            let value = gvrs.read_value(&f, row, col).unwrap();
            let expected = (row as f32 / 100.0) - (col as f32 / 200.0);
            assert!((value - expected).abs() < 1e-6);

            // int-coded floats recover within half a quantization step
            let value = gvrs.read_value(&icf, row, col).unwrap();
            let expected = (row as f32 / 4.0) - (col as f32 / 8.0);
            assert!((value - expected).abs() <= 1.0 / 200.0 + 1e-5);
        }
    }

    // cells that were never written report the fill values
    assert!(gvrs.read_value(&s, 1, 1).unwrap().is_nan());
    assert_eq!(gvrs.read_value_int(&i, 1, 1).unwrap(), i32::MIN);
    assert!(gvrs.read_value(&f, 1, 1).unwrap().is_nan());
    assert!(gvrs.read_value(&icf, 1, 1).unwrap().is_nan());
}

#[test]
fn a_flipped_header_byte_is_detected_on_open() {
    let (_dir, path) = temp_path("corrupt.gvrs");

    let mut specification = bathymetry_specification();
    specification.enable_checksums();
    GvrsFile::create(&path, specification).unwrap().close().unwrap();

    // flip one byte inside the specification payload region of the header
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[110] ^= 0x40;
    std::fs::write(&path, bytes).unwrap();

    assert!(matches!(
        GvrsFile::open_read_only(&path),
        Err(Error::HeaderChecksumMismatch),
    ));
}

#[test]
fn a_wrong_identifier_or_version_is_refused() {
    let (_dir, path) = temp_path("magic.gvrs");
    GvrsFile::create(&path, bathymetry_specification()).unwrap().close().unwrap();

    let pristine = std::fs::read(&path).unwrap();

    let mut wrong_magic = pristine.clone();
    wrong_magic[0] = b'x';
    std::fs::write(&path, wrong_magic).unwrap();
    assert!(matches!(GvrsFile::open_read_only(&path), Err(Error::BadMagic)));

    let mut wrong_version = pristine;
    wrong_version[12] = 9;
    std::fs::write(&path, wrong_version).unwrap();
    assert!(matches!(
        GvrsFile::open_read_only(&path),
        Err(Error::UnsupportedVersion { version: 9, .. }),
    ));
}

#[test]
fn constant_tiles_compress_below_standard_size() {
    let (_dir, path) = temp_path("compressed.gvrs");

    let mut specification = GvrsFileSpecification::new(60, 60, 60, 60).unwrap();
    specification.add_element(ElementSpecification::new("z", ElementType::Short {
        min_value: -11000, max_value: 9000, fill_value: -32768,
    }).unwrap()).unwrap();
    specification.enable_data_compression();

    let standard_size = specification.standard_tile_size_in_bytes();

    {
        let mut gvrs = GvrsFile::create(&path, specification).unwrap();
        let z = gvrs.element("z").unwrap();

        for row in 0 .. 60 {
            for col in 0 .. 60 {
                gvrs.write_value_int(&z, row, col, 42).unwrap();
            }
        }

        gvrs.close().unwrap();
    }

    // the whole file, header and directories included, stays far
    // below one uncompressed tile
    let file_size = std::fs::metadata(&path).unwrap().len();
    assert!(
        (file_size as usize) < standard_size,
        "file of {} bytes does not beat the standard tile of {}", file_size, standard_size,
    );

    let mut gvrs = GvrsFile::open_read_only(&path).unwrap();
    let z = gvrs.element("z").unwrap();
    let block = gvrs.read_block_int(&z, 0, 0, 60, 60).unwrap();
    assert!(block.iter().all(|value| *value == 42));
}

#[test]
fn fill_only_tiles_are_elided_from_the_file() {
    let (_dir, path) = temp_path("fill.gvrs");
    GvrsFile::create(&path, bathymetry_specification()).unwrap().close().unwrap();

    let mut gvrs = GvrsFile::open_for_writing(&path).unwrap();
    let z = gvrs.element("z").unwrap();

    // touch a tile, writing nothing but fill values
    for col in 0 .. 60 {
        gvrs.write_value(&z, 10, col, f32::NAN).unwrap();
    }
    gvrs.flush().unwrap();
    gvrs.close().unwrap();

    // no tile record exists anywhere in the file
    let bytes = std::fs::read(&path).unwrap();
    let header_size = u64::from_le_bytes(bytes[48 .. 56].try_into().unwrap());

    let mut position = header_size as usize;
    while position < bytes.len() {
        let record_size = i32::from_le_bytes(bytes[position .. position + 4].try_into().unwrap());
        let record_type = bytes[position + 4];
        assert_ne!(record_type, 2, "unexpected tile record at {}", position);
        position += record_size as usize;
    }

    let mut gvrs = GvrsFile::open_read_only(&path).unwrap();
    let z = gvrs.element("z").unwrap();
    assert!(gvrs.read_value(&z, 10, 0).unwrap().is_nan());
}

#[test]
fn metadata_record_ids_count_up_and_survive_reopen() {
    let (_dir, path) = temp_path("metadata.gvrs");

    {
        let mut gvrs = GvrsFile::create(&path, bathymetry_specification()).unwrap();

        for author in ["alice", "bob", "carol"] {
            gvrs.write_metadata(GvrsMetadata::new_string("Author", author).unwrap()).unwrap();
        }

        gvrs.write_metadata(
            GvrsMetadata::new_doubles("extent", &[-180.0, -90.0, 180.0, 90.0]).unwrap(),
        ).unwrap();

        gvrs.close().unwrap();
    }

    let mut gvrs = GvrsFile::open_read_only(&path).unwrap();

    let authors = gvrs.read_metadata_by_name("Author").unwrap();
    let ids: Vec<i32> = authors.iter().map(|record| record.record_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let names: Vec<String> = authors.iter()
        .map(|record| record.as_string().unwrap())
        .collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);

    let extent = gvrs.read_metadata("extent", 1).unwrap().unwrap();
    assert_eq!(extent.as_doubles().unwrap(), vec![-180.0, -90.0, 180.0, 90.0]);
}

#[test]
fn compression_codecs_are_recorded_as_metadata() {
    let (_dir, path) = temp_path("codecs.gvrs");

    let mut specification = bathymetry_specification();
    specification.enable_data_compression();
    GvrsFile::create(&path, specification).unwrap().close().unwrap();

    let mut gvrs = GvrsFile::open_read_only(&path).unwrap();
    let codecs = gvrs.read_metadata("GvrsCompressionCodecs", 1).unwrap().unwrap();
    assert_eq!(codecs.as_string().unwrap(), "GvrsHuffman|GvrsDeflate|GvrsFloat");
}

#[test]
fn compressed_tiles_need_a_matching_registry() {
    let (_dir, path) = temp_path("registry.gvrs");

    let mut specification = GvrsFileSpecification::new(60, 60, 60, 60).unwrap();
    specification.add_element(ElementSpecification::new("z", ElementType::Int {
        min_value: 0, max_value: 1000, fill_value: -1,
    }).unwrap()).unwrap();
    specification.enable_data_compression();

    {
        let mut gvrs = GvrsFile::create(&path, specification).unwrap();
        let z = gvrs.element("z").unwrap();

        for row in 0 .. 60 {
            for col in 0 .. 60 {
                gvrs.write_value_int(&z, row, col, 7).unwrap();
            }
        }

        gvrs.close().unwrap();
    }

    // without the codecs, the compressed tile cannot be decoded
    let mut crippled =
        GvrsFile::open_with_registry(&path, false, &CodecRegistry::empty()).unwrap();
    let z = crippled.element("z").unwrap();
    assert!(matches!(
        crippled.read_value_int(&z, 0, 0),
        Err(Error::InvalidCompressionCode(_)),
    ));

    // with the standard registry everything decodes
    let mut gvrs = GvrsFile::open_read_only(&path).unwrap();
    let z = gvrs.element("z").unwrap();
    assert_eq!(gvrs.read_value_int(&z, 0, 0).unwrap(), 7);
}

#[test]
fn a_held_file_refuses_a_second_writer() {
    let (_dir, path) = temp_path("busy.gvrs");
    GvrsFile::create(&path, bathymetry_specification()).unwrap().close().unwrap();

    let holder = GvrsFile::open_for_writing(&path).unwrap();

    assert!(matches!(
        GvrsFile::open_for_writing(&path),
        Err(Error::FileBusyOrUnclean),
    ));
    assert!(matches!(
        GvrsFile::open_read_only(&path),
        Err(Error::FileBusyOrUnclean),
    ));

    holder.close().unwrap();
    GvrsFile::open_read_only(&path).unwrap();
}

#[test]
fn a_crashed_writer_leaves_the_file_marked() {
    let (_dir, path) = temp_path("crashed.gvrs");
    GvrsFile::create(&path, bathymetry_specification()).unwrap().close().unwrap();

    // simulate a crash: the writer disappears without running any cleanup
    let holder = GvrsFile::open_for_writing(&path).unwrap();
    std::mem::forget(holder);

    assert!(matches!(
        GvrsFile::open_read_only(&path),
        Err(Error::FileBusyOrUnclean),
    ));
}

#[test]
fn updates_to_an_existing_tile_are_visible_after_reopen() {
    let (_dir, path) = temp_path("updates.gvrs");

    {
        let mut gvrs = GvrsFile::create(&path, bathymetry_specification()).unwrap();
        let z = gvrs.element("z").unwrap();
        gvrs.write_value_int(&z, 5, 5, 111).unwrap();
        gvrs.write_value_int(&z, 5, 6, 222).unwrap();
        gvrs.close().unwrap();
    }

    {
        let mut gvrs = GvrsFile::open_for_writing(&path).unwrap();
        let z = gvrs.element("z").unwrap();
        assert_eq!(gvrs.read_value_int(&z, 5, 5).unwrap(), 111);

        // rewrite one cell; the record is updated in place
        gvrs.write_value_int(&z, 5, 5, 333).unwrap();
        gvrs.close().unwrap();
    }

    let mut gvrs = GvrsFile::open_read_only(&path).unwrap();
    let z = gvrs.element("z").unwrap();
    assert_eq!(gvrs.read_value_int(&z, 5, 5).unwrap(), 333);
    assert_eq!(gvrs.read_value_int(&z, 5, 6).unwrap(), 222);
}

/// Walk every record of a closed file and verify the framing discipline:
/// 8-byte alignment, sizes in multiples of 8, known types, valid checksums,
/// and complete coverage of the space between header and end of file.
#[test]
fn record_framing_and_checksums_hold_for_a_closed_file() {
    let (_dir, path) = temp_path("anatomy.gvrs");

    {
        let mut specification = bathymetry_specification();
        specification.enable_checksums();
        specification.enable_data_compression();

        let mut gvrs = GvrsFile::create(&path, specification).unwrap();
        let z = gvrs.element("z").unwrap();

        for row in 0 .. 120 {
            for col in 0 .. 120 {
                gvrs.write_value_int(&z, row, col, ((row * 7 + col * 3) % 500) as i32).unwrap();
            }
        }

        gvrs.write_metadata(GvrsMetadata::new_string("Author", "anatomy test").unwrap()).unwrap();
        gvrs.close().unwrap();
    }

    let bytes = std::fs::read(&path).unwrap();
    let mut file = RandomAccessFile::open(&path, false).unwrap();

    // header: size from offset 48, crc over everything before the crc slot
    file.seek(48).unwrap();
    let header_size = u64::read(&mut file).unwrap();
    assert_eq!(header_size % 8, 0);

    let header_crc = u32::from_le_bytes(
        bytes[header_size as usize - 4 .. header_size as usize].try_into().unwrap());
    assert_eq!(header_crc, crc::checksum(&bytes[.. header_size as usize - 4]));

    // records: walk from the content base to the end of the file
    let mut position = header_size;
    let mut record_count = 0;

    while position < bytes.len() as u64 {
        assert_eq!(position % 8, 0);

        file.seek(position).unwrap();
        let record_size = i32::read(&mut file).unwrap() as u64;
        let record_type = u8::read(&mut file).unwrap();

        assert!(record_size >= 12);
        assert_eq!(record_size % 8, 0);
        assert!(record_type <= 5, "unknown record type {}", record_type);

        let start = position as usize;
        let end = start + record_size as usize;
        let stored_crc = u32::from_le_bytes(bytes[end - 4 .. end].try_into().unwrap());

        let computed = if record_type == 0 {
            crc::free_space_checksum(
                bytes[start .. start + 8].try_into().unwrap(),
                record_size as usize - 12,
            )
        } else {
            crc::checksum(&bytes[start .. end - 4])
        };

        assert_eq!(stored_crc, computed, "record checksum at {}", position);

        position += record_size;
        record_count += 1;
    }

    // the records tile the file exactly
    assert_eq!(position, bytes.len() as u64);
    assert!(record_count >= 4, "expected tiles plus three directories");
}
