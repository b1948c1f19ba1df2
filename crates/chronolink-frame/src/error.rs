/// Errors that can occur while fragmenting or transporting link frames.
///
/// Corrupt input on the receive side is not an error: the framer resyncs
/// past it silently.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A single fragment's chunk does not fit the 16-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload would need more fragments than the 8-bit index can count.
    #[error("payload needs {needed} fragments, max {max}")]
    TooManyFragments { needed: usize, max: usize },

    /// The configured chunk size cannot carry any payload.
    #[error("invalid chunk size {0}")]
    InvalidChunkSize(usize),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
