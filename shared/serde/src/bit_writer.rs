use crate::{constants::MTU_SIZE_BITS, error::SerdeErr};

// BitWrite
pub trait BitWrite {
    fn write_bit(&mut self, bit: bool);
    fn write_byte(&mut self, byte: u8);
    fn count_bits(&mut self, bits: u32);
    fn is_counter(&self) -> bool;

    /// Writes the lowest `bits` bits of `value`, least significant first.
    fn write_bits(&mut self, value: u64, bits: u8) {
        let mut temp = value;
        for _ in 0..bits {
            self.write_bit(temp & 1 != 0);
            temp >>= 1;
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.write_byte(*byte);
        }
    }
}

// BitWriter

/// A bounded writer used to assemble outgoing packets. Bits past the
/// capacity are dropped and the writer is flagged as overflowed, which
/// `finish` reports as an error.
pub struct BitWriter {
    scratch: u8,
    scratch_index: u8,
    buffer: Vec<u8>,
    current_bits: u32,
    max_bits: u32,
    overflowed: bool,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_capacity(MTU_SIZE_BITS)
    }

    pub fn with_capacity(bit_capacity: u32) -> Self {
        Self {
            scratch: 0,
            scratch_index: 0,
            buffer: Vec::with_capacity(bit_capacity.div_ceil(8) as usize),
            current_bits: 0,
            max_bits: bit_capacity,
            overflowed: false,
        }
    }

    pub fn bits_written(&self) -> u32 {
        self.current_bits
    }

    pub fn bits_free(&self) -> u32 {
        self.max_bits.saturating_sub(self.current_bits)
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    /// Returns a counter that starts from this writer's current position
    /// and shares its capacity.
    pub fn counter(&self) -> BitCounter {
        BitCounter::new(self.current_bits, self.max_bits)
    }

    fn flush_scratch(&mut self) {
        if self.scratch_index > 0 {
            let byte = (self.scratch << (8 - self.scratch_index)).reverse_bits();
            self.buffer.push(byte);
            self.scratch = 0;
            self.scratch_index = 0;
        }
    }

    /// Finalizes the writer, padding the last partial byte with zeroes.
    pub fn to_bytes(mut self) -> Box<[u8]> {
        self.flush_scratch();
        self.buffer.into_boxed_slice()
    }

    /// Like `to_bytes`, but fails if any write was dropped for lack of capacity.
    pub fn finish(self) -> Result<Box<[u8]>, SerdeErr> {
        if self.overflowed {
            return Err(SerdeErr::WriteOverflow {
                bits_written: self.current_bits,
                max_bits: self.max_bits,
            });
        }
        Ok(self.to_bytes())
    }
}

impl BitWrite for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        if self.current_bits >= self.max_bits {
            self.overflowed = true;
            return;
        }

        self.scratch <<= 1;

        if bit {
            self.scratch |= 1;
        }

        self.scratch_index += 1;
        self.current_bits += 1;

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

    fn count_bits(&mut self, _bits: u32) {
        panic!("This method should not be called for BitWriter!");
    }

    fn is_counter(&self) -> bool {
        false
    }
}

// BitCounter

/// Counts bits instead of writing them, for planning whether a value
/// fits into the remaining space of a packet.
pub struct BitCounter {
    start_bits: u32,
    current_bits: u32,
    max_bits: u32,
}

impl BitCounter {
    pub fn new(start_bits: u32, max_bits: u32) -> Self {
        Self {
            start_bits,
            current_bits: start_bits,
            max_bits,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0, u32::MAX)
    }

    pub fn overflowed(&self) -> bool {
        self.current_bits > self.max_bits
    }

    pub fn bits_needed(&self) -> u32 {
        self.current_bits - self.start_bits
    }
}

impl BitWrite for BitCounter {
    fn write_bit(&mut self, _: bool) {
        self.current_bits = self.current_bits.saturating_add(1);
    }

    fn write_byte(&mut self, _: u8) {
        self.current_bits = self.current_bits.saturating_add(8);
    }

    fn count_bits(&mut self, bits: u32) {
        self.current_bits = self.current_bits.saturating_add(bits);
    }

    fn is_counter(&self) -> bool {
        true
    }
}
