//! Decoders from raw module bytes into the [`ft2_song`] data model.

mod cursor;
mod delta;
pub mod error;
pub mod mod_format;
pub mod s3m;
pub mod xm;

pub use error::LoadError;

use ft2_song::song::Song;
use tracing::debug;

/// Sniffs the format from magic bytes and loads it. XM is tried first
/// (cheap, unambiguous 17-byte magic), then S3M (signature at a fixed
/// offset), then MOD (channel-count tag at offset 1080) as the fallback
/// since MOD has no single universal signature.
pub fn load_module(data: &[u8]) -> Result<Song, LoadError> {
    if data.len() >= 17 && &data[0..17] == b"Extended Module: " {
        debug!("detected XM module");
        return xm::load(data);
    }
    if s3m::detect(data) {
        debug!("detected S3M module");
        return s3m::load(data);
    }
    if mod_format::detect(data) {
        debug!("detected MOD module");
        return mod_format::load(data);
    }
    Err(LoadError::InvalidMagic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognised_bytes_are_rejected() {
        assert_eq!(load_module(&[0u8; 16]).unwrap_err(), LoadError::InvalidMagic);
    }
}
