#[derive(Debug, PartialEq, Eq)]
pub enum PduError {
    /// A read ran past the end of the buffer window
    BufferEnded { field: &'static str },
    /// A write did not fit the remaining capacity
    CapacityExceeded { needed_bits: usize, available_bits: usize },
    /// A field held a value outside its legal range
    InvalidValue { field: &'static str, value: u64 },
    /// Declared and actual lengths disagree
    InconsistentLength { expected: usize, found: usize },
}
