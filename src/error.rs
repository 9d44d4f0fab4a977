// Error taxonomy. Every variant states *where* things went wrong.
//
// ConfigError is returned synchronously to the caller that introduced it.
// CaptureError and BlurError never reach the host: the session recovers from them.

use thiserror::Error;

use crate::types::ViewHandle;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("the {name} cannot be negative (got {value_ms} ms)")]
    NegativeDelay { name: &'static str, value_ms: i64 },
    #[error("buffer dimensions differ: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("root view {root:?} is not an ancestor of element {element:?}")]
    InvalidAncestor {
        root: ViewHandle,
        element: ViewHandle,
    },
    #[error("invalid pixel buffer layout: {width}x{height}, stride {stride}, {len} pixels")]
    InvalidBuffer {
        width: u32,
        height: u32,
        stride: u32,
        len: usize,
    },
    #[error("{name} must be a finite non-negative number (got {value})")]
    InvalidRadius { name: &'static str, value: f32 },
    #[error("downsample factor must be 1 or 2 (got {0})")]
    InvalidDownsample(u8),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture root {root:?} is not an ancestor of element {element:?}")]
    NotAncestor {
        root: ViewHandle,
        element: ViewHandle,
    },
    #[error("platform denied the backdrop snapshot: {0}")]
    Denied(String),
    #[error("element {0:?} is detached from the view tree")]
    Detached(ViewHandle),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlurError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("native blur effect failed: {0}")]
    Effect(String),
    #[error("corrupt pixel buffer: {len} pixels for {width}x{height} stride {stride}")]
    CorruptBuffer {
        width: u32,
        height: u32,
        stride: u32,
        len: usize,
    },
}

/// Errors surfaced by the public `MaterialBlur` API.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown or disabled blur session {0}")]
    UnknownSession(u64),
    #[error("failed to spawn the auto-update thread: {0}")]
    Thread(#[source] std::io::Error),
}
