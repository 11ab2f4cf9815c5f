//! Loader error types
use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    TooSmall,
    InvalidMagic,
    UnsupportedVersion(u16),
    TooManyChannels(u16),
    TooManyPatterns(u16),
    TooManyOrders(u16),
    TooManyInstruments(u16),
    UnexpectedEof,
    SampleError(ft2_sample::SampleError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::TooSmall => write!(f, "file too small to contain a header"),
            LoadError::InvalidMagic => write!(f, "unrecognised magic/signature bytes"),
            LoadError::UnsupportedVersion(v) => write!(f, "unsupported format version 0x{v:04X}"),
            LoadError::TooManyChannels(n) => write!(f, "too many channels: {n}"),
            LoadError::TooManyPatterns(n) => write!(f, "too many patterns: {n}"),
            LoadError::TooManyOrders(n) => write!(f, "too many orders: {n}"),
            LoadError::TooManyInstruments(n) => write!(f, "too many instruments: {n}"),
            LoadError::UnexpectedEof => write!(f, "unexpected end of file"),
            LoadError::SampleError(e) => write!(f, "sample error: {e}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<ft2_sample::SampleError> for LoadError {
    fn from(e: ft2_sample::SampleError) -> Self {
        LoadError::SampleError(e)
    }
}
