use glam::{Quat, Vec3};

use crate::{bit_reader::BitReader, bit_writer::BitWrite, error::SerdeErr, serde::Serde};

impl Serde for Vec3 {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.x.ser(writer);
        self.y.ser(writer);
        self.z.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let x = f32::de(reader)?;
        let y = f32::de(reader)?;
        let z = f32::de(reader)?;
        Ok(Vec3::new(x, y, z))
    }

    fn bit_length(&self) -> u32 {
        96
    }
}

impl Serde for Quat {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.x.ser(writer);
        self.y.ser(writer);
        self.z.ser(writer);
        self.w.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let x = f32::de(reader)?;
        let y = f32::de(reader)?;
        let z = f32::de(reader)?;
        let w = f32::de(reader)?;
        Ok(Quat::from_xyzw(x, y, z, w))
    }

    fn bit_length(&self) -> u32 {
        128
    }
}

const BITS_PER_AXIS: u8 = 10;
const MAX_NUMBER: u32 = (1 << BITS_PER_AXIS) - 1;
const MINIMUM: f32 = -std::f32::consts::FRAC_1_SQRT_2;
const MAXIMUM: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// A unit rotation packed into 32 bits with the smallest-three scheme: the
/// index of the largest component in 2 bits, then the other three
/// components quantized to 10 bits each. The largest component is
/// rebuilt from the unit-length constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressedQuat(pub Quat);

impl CompressedQuat {
    pub fn compress(rotation: Quat) -> u32 {
        let values = rotation.to_array();
        let mut largest_index = 0;
        for index in 1..4 {
            if values[index].abs() > values[largest_index].abs() {
                largest_index = index;
            }
        }
        let sign = if values[largest_index] < 0.0 { -1.0 } else { 1.0 };

        let mut packed = (largest_index as u32) << (BITS_PER_AXIS as u32 * 3);
        let mut shift = BITS_PER_AXIS as u32 * 2;
        for (index, value) in values.iter().enumerate() {
            if index == largest_index {
                continue;
            }
            let normalized = (value * sign - MINIMUM) / (MAXIMUM - MINIMUM);
            let quantized = (normalized * MAX_NUMBER as f32).round().clamp(0.0, MAX_NUMBER as f32);
            packed |= (quantized as u32) << shift;
            shift = shift.saturating_sub(BITS_PER_AXIS as u32);
        }
        packed
    }

    pub fn decompress(packed: u32) -> Quat {
        let largest_index = (packed >> (BITS_PER_AXIS as u32 * 3)) as usize & 0b11;
        let mut values = [0.0f32; 4];
        let mut shift = BITS_PER_AXIS as u32 * 2;
        let mut sum_squares = 0.0;
        for (index, value) in values.iter_mut().enumerate() {
            if index == largest_index {
                continue;
            }
            let quantized = (packed >> shift) & MAX_NUMBER;
            *value = quantized as f32 / MAX_NUMBER as f32 * (MAXIMUM - MINIMUM) + MINIMUM;
            sum_squares += *value * *value;
            shift = shift.saturating_sub(BITS_PER_AXIS as u32);
        }
        values[largest_index] = (1.0 - sum_squares).max(0.0).sqrt();
        Quat::from_array(values)
    }
}

impl Serde for CompressedQuat {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_bits(Self::compress(self.0) as u64, 32);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let packed = reader.read_bits(32)? as u32;
        Ok(Self(Self::decompress(packed)))
    }

    fn bit_length(&self) -> u32 {
        32
    }
}
