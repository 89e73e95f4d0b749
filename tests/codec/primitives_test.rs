// Byte Codec Primitive Tests
// Fixed-width reads and writes, cursors and bounds checking

use homegate::codec::{
    read_bool, read_int, read_uint, write_int, write_uint, ByteReader, ByteWriter, CodecError,
    Endian,
};

// ============================================================================
// READ / WRITE
// ============================================================================

#[test]
fn test_read_uint_respects_endianness() {
    let bytes = [0x12, 0x34, 0x56];

    assert_eq!(read_uint(&bytes, 0, 2, Endian::Big), Some(0x1234));
    assert_eq!(read_uint(&bytes, 0, 2, Endian::Little), Some(0x3412));
    assert_eq!(read_uint(&bytes, 1, 2, Endian::Little), Some(0x5634));
}

#[test]
fn test_read_uint_out_of_bounds_is_none() {
    let bytes = [0x01, 0x02];

    assert_eq!(read_uint(&bytes, 1, 2, Endian::Big), None);
    assert_eq!(read_uint(&bytes, usize::MAX, 1, Endian::Big), None);
    assert_eq!(read_uint(&bytes, 0, 0, Endian::Big), None);
    assert_eq!(read_uint(&[0u8; 9], 0, 9, Endian::Big), None);
}

#[test]
fn test_read_bool_any_nonzero_is_true() {
    assert_eq!(read_bool(&[0x00, 0x02], 0), Some(false));
    assert_eq!(read_bool(&[0x00, 0x02], 1), Some(true));
    assert_eq!(read_bool(&[], 0), None);
}

#[test]
fn test_write_uint_widths() {
    assert_eq!(write_uint(0x0102, 2, Endian::Big), Ok(vec![0x01, 0x02]));
    assert_eq!(write_uint(0x0102, 2, Endian::Little), Ok(vec![0x02, 0x01]));
    assert_eq!(write_uint(0x01, 3, Endian::Big), Ok(vec![0x00, 0x00, 0x01]));
}

#[test]
fn test_write_uint_rejects_overflow() {
    assert_eq!(
        write_uint(256, 1, Endian::Big),
        Err(CodecError::ValueTooLarge { value: 256, width: 1 })
    );
    assert_eq!(write_uint(1, 0, Endian::Big), Err(CodecError::WidthOutOfRange(0)));
    assert_eq!(write_uint(1, 9, Endian::Big), Err(CodecError::WidthOutOfRange(9)));
}

#[test]
fn test_signed_values() {
    assert_eq!(write_int(-1, 2, Endian::Little), Ok(vec![0xFF, 0xFF]));
    assert_eq!(write_int(-2, 2, Endian::Big), Ok(vec![0xFF, 0xFE]));
    assert_eq!(read_int(&[0xFE, 0xFF], 0, 2, Endian::Little), Some(-2));
    assert!(write_int(128, 1, Endian::Big).is_err());
    assert!(write_int(-129, 1, Endian::Big).is_err());
    assert_eq!(write_int(-128, 1, Endian::Big), Ok(vec![0x80]));
}

// ============================================================================
// CURSORS
// ============================================================================

#[test]
fn test_reader_walks_fields() {
    let bytes = [0x01, 0x34, 0x12, 0xFF, 0xAA, 0xBB];
    let mut reader = ByteReader::new(&bytes);

    assert_eq!(reader.u8(), Some(0x01));
    assert_eq!(reader.u16(Endian::Little), Some(0x1234));
    assert_eq!(reader.i8(), Some(-1));
    assert_eq!(reader.position(), 4);
    assert_eq!(reader.rest(), &[0xAA, 0xBB]);
    assert!(reader.is_empty());
}

#[test]
fn test_reader_failure_leaves_cursor() {
    let bytes = [0x01, 0x02, 0x03];
    let mut reader = ByteReader::new(&bytes);

    assert_eq!(reader.u32(Endian::Big), None);
    assert_eq!(reader.position(), 0);
    assert_eq!(reader.take(2), Some(&[0x01, 0x02][..]));
    assert_eq!(reader.take(2), None);
    assert_eq!(reader.remaining(), 1);
    assert_eq!(reader.bool(), Some(true));
}

#[test]
fn test_writer_builds_frame() {
    let mut writer = ByteWriter::new();
    writer
        .u8(0x05)
        .u16(0x0102, Endian::Big)
        .u16(0x0102, Endian::Little)
        .bool(true)
        .bytes(&[0xEE]);
    writer.uint(0x030201, 3, Endian::Little).unwrap();

    let frame = writer.finish();
    assert_eq!(
        &frame[..],
        &[0x05, 0x01, 0x02, 0x02, 0x01, 0x01, 0xEE, 0x01, 0x02, 0x03]
    );
}

#[test]
fn test_writer_rejects_out_of_range_values() {
    let mut writer = ByteWriter::new();

    assert!(writer.uint(0x1_0000, 2, Endian::Big).is_err());
    assert!(writer.is_empty());
}
