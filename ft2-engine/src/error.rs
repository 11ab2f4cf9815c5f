//! Error taxonomy for the engine façade. Malformed pattern data and
//! out-of-range live-input parameters are clamped at the source (§7
//! `InvalidParameter`) rather than surfaced here; a full ring buffer simply
//! drops the newest entry (§7 `QueueFull`) instead of erroring. What's left
//! is genuinely exceptional: a file that doesn't parse, or a call made in a
//! state that doesn't support it.

use std::fmt;

/// Allocation failure isn't representable here: the global allocator aborts
/// the process rather than returning an error, so there's no `OutOfMemory`
/// variant to construct in safe code (unlike the source's `calloc`
/// null-checks).
#[derive(Debug)]
pub enum EngineError {
    Load(ft2_loader::LoadError),
    InvalidChannel(usize),
    NotLoaded,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Load(e) => write!(f, "module load failed: {e}"),
            EngineError::InvalidChannel(ch) => write!(f, "channel index {ch} out of range"),
            EngineError::NotLoaded => write!(f, "no module loaded"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Load(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ft2_loader::LoadError> for EngineError {
    fn from(e: ft2_loader::LoadError) -> Self {
        EngineError::Load(e)
    }
}

/// Persisted `Config` blobs are versioned; anything but the current version
/// is rejected outright rather than partially applied.
#[derive(Debug)]
pub enum ConfigError {
    Truncated,
    UnsupportedVersion(u32),
    Malformed(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Truncated => write!(f, "config blob shorter than the version prefix"),
            ConfigError::UnsupportedVersion(v) => write!(f, "unsupported config version {v}"),
            ConfigError::Malformed(e) => write!(f, "malformed config body: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}
