//! Culling Errors
//!
//! The kernels themselves cannot fail. Everything fallible happens before a
//! dispatch (input validation, config loading) or in the GPU host plumbing.

use thiserror::Error;

/// Errors raised while validating inputs or driving the GPU path.
#[derive(Debug, Error)]
pub enum CullError {
    /// A configuration value is out of its allowed range.
    #[error("invalid culling config: {0}")]
    InvalidConfig(String),

    /// Two index-aligned input arrays disagree in length.
    #[error("{what}: expected {expected} entries, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A visible-light candidate points past the end of the light arrays.
    #[error("visible light index {index} out of range ({light_count} lights)")]
    LightIndexOutOfRange { index: u32, light_count: usize },

    /// Output buffer or G-buffer dimensions differ from the configured viewport.
    #[error("viewport mismatch: expected {expected:?}, got {actual:?}")]
    ViewportMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// No wgpu adapter could be found for headless compute.
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// A readback buffer could not be mapped.
    #[error("buffer map failed: {0}")]
    BufferMap(String),
}

/// Result alias used throughout the culling module.
pub type Result<T> = std::result::Result<T, CullError>;

impl CullError {
    /// Build a `LengthMismatch` if `actual != expected`.
    pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(CullError::LengthMismatch {
                what,
                expected,
                actual,
            })
        }
    }
}
