use crate::error::SerdeErr;

// BitReader
pub struct BitReader<'b> {
    buffer: &'b [u8],
    buffer_index: usize,
    scratch: u8,
    scratch_index: u8,
}

impl<'b> BitReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        Self {
            buffer,
            buffer_index: 0,
            scratch: 0,
            scratch_index: 0,
        }
    }

    pub fn bits_remaining(&self) -> u32 {
        ((self.buffer.len() - self.buffer_index) * 8) as u32 + self.scratch_index as u32
    }

    pub fn has_remaining(&self) -> bool {
        self.bits_remaining() > 0
    }

    /// True if at least `bytes` whole bytes can still be read.
    pub fn can_read_bytes(&self, bytes: u32) -> bool {
        self.bits_remaining() >= bytes * 8
    }

    pub fn read_bit(&mut self) -> Result<bool, SerdeErr> {
        if self.scratch_index == 0 {
            if self.buffer_index == self.buffer.len() {
                return Err(SerdeErr::OutOfBounds {
                    requested: 1,
                    remaining: 0,
                });
            }

            self.scratch = self.buffer[self.buffer_index];

            self.buffer_index += 1;
            self.scratch_index += 8;
        }

        let value = self.scratch & 1;

        self.scratch >>= 1;

        self.scratch_index -= 1;

        Ok(value != 0)
    }

    pub fn read_byte(&mut self) -> Result<u8, SerdeErr> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Reads `bits` bits, least significant first.
    pub fn read_bits(&mut self, bits: u8) -> Result<u64, SerdeErr> {
        let remaining = self.bits_remaining();
        if remaining < bits as u32 {
            return Err(SerdeErr::OutOfBounds {
                requested: bits as u32,
                remaining,
            });
        }
        let mut output: u64 = 0;
        for index in 0..bits {
            if self.read_bit()? {
                output |= 1 << index;
            }
        }
        Ok(output)
    }

    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>, SerdeErr> {
        let remaining = self.bits_remaining();
        if (remaining as usize) < length * 8 {
            return Err(SerdeErr::LengthOutOfBounds {
                length: length as u64,
                remaining,
            });
        }
        let mut output = Vec::with_capacity(length);
        for _ in 0..length {
            output.push(self.read_byte()?);
        }
        Ok(output)
    }
}
