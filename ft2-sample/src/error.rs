//! Error types for sample allocation

use core::fmt;

/// Errors that can occur while building a [`crate::Sample`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    /// `pcm_bytes` is shorter than `length` frames at the given bit depth
    Truncated,
    /// The host allocator reported failure (or the requested length
    /// overflows the tap-padded buffer size)
    OutOfMemory,
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "sample data shorter than declared length"),
            Self::OutOfMemory => write!(f, "failed to allocate tap-padded sample buffer"),
        }
    }
}

impl std::error::Error for SampleError {}
