use thiserror::Error;

/// Errors that can occur while configuring a sequencer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    /// The bit width must leave room in a 64-bit word for the shift trick.
    #[error("Sequencer bit width {bits} is out of range, must be between 1 and 63")]
    InvalidBitCount { bits: u8 },
}

/// A fixed-width wrapping counter.
///
/// Values live in `0..2^bits` and wrap back to zero. Comparing two values is
/// only meaningful when they are within half the range of each other, see
/// [`Sequencer::distance`].
#[derive(Debug, Clone)]
pub struct Sequencer {
    bits: u8,
    shift: u32,
    mask: u64,
    sequence: u64,
}

impl Sequencer {
    /// Creates a sequencer of `bits` width.
    ///
    /// # Panics
    ///
    /// Panics if `bits` is 0 or greater than 63. Use [`Sequencer::try_new`] to
    /// handle that case.
    pub fn new(bits: u8) -> Self {
        Self::try_new(bits).unwrap_or_else(|error| panic!("{}", error))
    }

    pub fn try_new(bits: u8) -> Result<Self, SequencerError> {
        if bits == 0 || bits > 63 {
            return Err(SequencerError::InvalidBitCount { bits });
        }
        Ok(Self {
            bits,
            shift: 64 - bits as u32,
            mask: (1u64 << bits) - 1,
            sequence: 0,
        })
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn max_value(&self) -> u64 {
        self.mask
    }

    /// The value the next call to `next` will return.
    pub fn current(&self) -> u64 {
        self.sequence
    }

    /// Returns the current value and advances, wrapping at `2^bits`.
    pub fn next(&mut self) -> u64 {
        let current = self.sequence;
        self.sequence = self.next_after(current);
        current
    }

    pub fn next_after(&self, sequence: u64) -> u64 {
        sequence.wrapping_add(1) & self.mask
    }

    pub fn move_in_bounds(&self, sequence: u64) -> u64 {
        sequence & self.mask
    }

    pub fn reset(&mut self) {
        self.sequence = 0;
    }

    /// Shortest signed difference `from - to` modulo `2^bits`.
    ///
    /// Both values are shifted into the top of a 64-bit word so that the
    /// subtraction wraps through two's complement, then shifted back down
    /// arithmetically to keep the sign.
    ///
    /// ```
    /// # use meridian_shared::Sequencer;
    /// let sequencer = Sequencer::new(16);
    /// assert_eq!(sequencer.distance(2, 1), 1);
    /// assert_eq!(sequencer.distance(0, 65535), 1);
    /// assert_eq!(sequencer.distance(65535, 0), -1);
    /// ```
    pub fn distance(&self, from: u64, to: u64) -> i64 {
        let from = from << self.shift;
        let to = to << self.shift;
        (from.wrapping_sub(to) as i64) >> self.shift
    }
}
