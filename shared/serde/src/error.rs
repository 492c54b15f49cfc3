use thiserror::Error;

/// Errors raised while reading or writing wire data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerdeErr {
    /// The reader ran past the end of its buffer
    #[error("Attempted to read {requested} bit(s) but only {remaining} remain in the buffer")]
    OutOfBounds { requested: u32, remaining: u32 },

    /// A length prefix claims more data than the buffer can hold
    #[error("Length prefix {length} exceeds the {remaining} bit(s) remaining in the buffer")]
    LengthOutOfBounds { length: u64, remaining: u32 },

    /// A packed integer decoded to a value too wide for its target type
    #[error("Packed integer {value} does not fit in {target}")]
    PackedOverflow { value: u64, target: &'static str },

    /// A string payload was not valid UTF-8
    #[error("String payload is not valid UTF-8")]
    InvalidUtf8,

    /// A discriminant byte did not map to any known variant
    #[error("Invalid discriminant {value} for {type_name}")]
    InvalidDiscriminant { value: u8, type_name: &'static str },

    /// A bounded writer was asked to hold more bits than its capacity
    #[error("Write overflow: {bits_written} bit(s) written into a writer with capacity {max_bits}")]
    WriteOverflow { bits_written: u32, max_bits: u32 },
}
