//! # Meridian Serde
//! Bit-level readers/writers, the `Serde` trait, and the packed integer codec
//! used by every meridian wire format.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod bit_reader;
mod bit_writer;
mod constants;
mod error;
mod impls;
mod math;
mod packed;
mod serde;
mod stream_writer;

pub use bit_reader::BitReader;
pub use bit_writer::{BitCounter, BitWrite, BitWriter};
pub use constants::{MTU_SIZE_BITS, MTU_SIZE_BYTES};
pub use error::SerdeErr;
pub use math::CompressedQuat;
pub use packed::{
    packed_u64_len, read_packed_i64, read_packed_u32, read_packed_u64, write_packed_i64,
    write_packed_u64, zigzag_decode, zigzag_encode, PackedI64, PackedU64,
};
pub use serde::{ConstBitLength, Serde};
pub use stream_writer::StreamWriter;
