//! Variable-length integer codec.
//!
//! Values up to 240 take a single byte, values up to 2287 take two, values
//! up to 67823 take three. Anything larger is a length-prefix byte in
//! 250..=255 followed by 3..=8 raw little-endian bytes. Signed values are
//! zig-zag mapped first so that small magnitudes of either sign stay small.

use crate::{bit_reader::BitReader, bit_writer::BitWrite, error::SerdeErr, serde::Serde};

const ONE_BYTE_MAX: u64 = 240;
const TWO_BYTE_MAX: u64 = 2287;
const THREE_BYTE_MAX: u64 = 67823;
const THREE_BYTE_PREFIX: u8 = 249;
const RAW_PREFIX_BASE: u8 = 247;

pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Number of bytes `value` occupies once packed
pub fn packed_u64_len(value: u64) -> u32 {
    if value <= ONE_BYTE_MAX {
        1
    } else if value <= TWO_BYTE_MAX {
        2
    } else if value <= THREE_BYTE_MAX {
        3
    } else {
        1 + raw_byte_count(value)
    }
}

// values past THREE_BYTE_MAX are stored raw, never in fewer than 3 bytes
fn raw_byte_count(value: u64) -> u32 {
    let significant = 8 - value.leading_zeros() / 8;
    significant.max(3)
}

pub fn write_packed_u64(writer: &mut dyn BitWrite, value: u64) {
    if value <= ONE_BYTE_MAX {
        writer.write_byte(value as u8);
    } else if value <= TWO_BYTE_MAX {
        let offset = value - ONE_BYTE_MAX;
        writer.write_byte(((offset >> 8) + 241) as u8);
        writer.write_byte((offset & 0xFF) as u8);
    } else if value <= THREE_BYTE_MAX {
        let offset = value - (TWO_BYTE_MAX + 1);
        writer.write_byte(THREE_BYTE_PREFIX);
        writer.write_byte((offset >> 8) as u8);
        writer.write_byte((offset & 0xFF) as u8);
    } else {
        let count = raw_byte_count(value);
        writer.write_byte(RAW_PREFIX_BASE + count as u8);
        let bytes = value.to_le_bytes();
        for byte in bytes.iter().take(count as usize) {
            writer.write_byte(*byte);
        }
    }
}

pub fn read_packed_u64(reader: &mut BitReader) -> Result<u64, SerdeErr> {
    let prefix = reader.read_byte()?;
    match prefix {
        0..=240 => Ok(prefix as u64),
        241..=248 => {
            let low = reader.read_byte()? as u64;
            Ok(ONE_BYTE_MAX + ((prefix as u64 - 241) << 8) + low)
        }
        THREE_BYTE_PREFIX => {
            let high = reader.read_byte()? as u64;
            let low = reader.read_byte()? as u64;
            Ok(TWO_BYTE_MAX + 1 + (high << 8) + low)
        }
        _ => {
            let count = prefix - RAW_PREFIX_BASE;
            let mut value: u64 = 0;
            for index in 0..count {
                value |= (reader.read_byte()? as u64) << (8 * index as u32);
            }
            Ok(value)
        }
    }
}

pub fn read_packed_u32(reader: &mut BitReader) -> Result<u32, SerdeErr> {
    let value = read_packed_u64(reader)?;
    u32::try_from(value).map_err(|_| SerdeErr::PackedOverflow {
        value,
        target: "u32",
    })
}

pub fn write_packed_i64(writer: &mut dyn BitWrite, value: i64) {
    write_packed_u64(writer, zigzag_encode(value));
}

pub fn read_packed_i64(reader: &mut BitReader) -> Result<i64, SerdeErr> {
    Ok(zigzag_decode(read_packed_u64(reader)?))
}

/// An unsigned integer that serializes with the packed codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedU64(pub u64);

impl Serde for PackedU64 {
    fn ser(&self, writer: &mut dyn BitWrite) {
        write_packed_u64(writer, self.0);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self(read_packed_u64(reader)?))
    }

    fn bit_length(&self) -> u32 {
        packed_u64_len(self.0) * 8
    }
}

/// A signed integer that serializes zig-zag mapped with the packed codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedI64(pub i64);

impl Serde for PackedI64 {
    fn ser(&self, writer: &mut dyn BitWrite) {
        write_packed_i64(writer, self.0);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self(read_packed_i64(reader)?))
    }

    fn bit_length(&self) -> u32 {
        packed_u64_len(zigzag_encode(self.0)) * 8
    }
}
