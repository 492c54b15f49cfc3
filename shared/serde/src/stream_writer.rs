use crate::BitWrite;

/// A growable writer used for object state payloads. Unlike BitWriter it has
/// no capacity limit, and it can copy a span of bits it has already
/// written into another StreamWriter.
pub struct StreamWriter {
    scratch: u8,
    scratch_index: u8,
    buffer: Vec<u8>,
    bits_written: u32,
}

impl Default for StreamWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamWriter {
    pub fn new() -> Self {
        Self {
            scratch: 0,
            scratch_index: 0,
            buffer: Vec::with_capacity(256),
            bits_written: 0,
        }
    }

    fn flush_scratch(&mut self) {
        if self.scratch_index > 0 {
            let byte = (self.scratch << (8 - self.scratch_index)).reverse_bits();
            self.buffer.push(byte);
            self.scratch = 0;
            self.scratch_index = 0;
        }
    }

    pub fn to_bytes(mut self) -> Box<[u8]> {
        self.flush_scratch();
        self.buffer.into_boxed_slice()
    }

    pub fn bits_written(&self) -> u32 {
        self.bits_written
    }

    pub fn is_empty(&self) -> bool {
        self.bits_written == 0
    }

    /// Reads back a bit that was previously written.
    pub fn bit_at(&self, index: u32) -> Option<bool> {
        if index >= self.bits_written {
            return None;
        }
        let flushed_bits = (self.buffer.len() * 8) as u32;
        if index < flushed_bits {
            let byte = self.buffer[(index / 8) as usize];
            return Some((byte >> (index % 8)) & 1 != 0);
        }
        // bits still sitting in scratch, oldest at the highest position
        let offset = index - flushed_bits;
        let position = self.scratch_index as u32 - 1 - offset;
        Some((self.scratch >> position) & 1 != 0)
    }

    /// Appends `bit_length` bits of `source`, starting at `start_bit`.
    /// Returns the number of bits actually copied.
    pub fn copy_bits_from(&mut self, source: &StreamWriter, start_bit: u32, bit_length: u32) -> u32 {
        let mut copied = 0;
        for index in start_bit..start_bit.saturating_add(bit_length) {
            match source.bit_at(index) {
                Some(bit) => {
                    self.write_bit(bit);
                    copied += 1;
                }
                None => break,
            }
        }
        copied
    }
}

impl BitWrite for StreamWriter {
    fn write_bit(&mut self, bit: bool) {
        self.scratch <<= 1;

        if bit {
            self.scratch |= 1;
        }

        self.scratch_index += 1;
        self.bits_written += 1;

        if self.scratch_index >= 8 {
            self.buffer.push(self.scratch.reverse_bits());
            self.scratch_index = 0;
            self.scratch = 0;
        }
    }

    fn write_byte(&mut self, byte: u8) {
        let mut temp = byte;
        for _ in 0..8 {
            self.write_bit(temp & 1 != 0);
            temp >>= 1;
        }
    }

    fn is_counter(&self) -> bool {
        false
    }

    fn count_bits(&mut self, _bits: u32) {
        // StreamWriter grows as needed, nothing to count
    }
}
