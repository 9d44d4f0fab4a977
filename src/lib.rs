//! Realtime backdrop blur for "material" cards.
//!
//! `MaterialBlur` captures whatever the host renders behind an element, blurs it with
//! the best backend the platform offers (native effect, GPU snapshot, or CPU Stack Blur),
//! tints it, clips the rounded corners and hands the frame to the host compositor.
//! Without any usable backdrop it falls back to a flat tint.

pub mod backend;
pub mod capture;
pub mod config;
pub mod divisor;
pub mod error;
pub mod host;
pub mod overlay;
pub mod resample;
pub mod selector;
pub mod session;
pub mod stack_blur;
pub mod timer;
pub mod types;

pub use backend::{BlurBackend, BlurKernel, BlurPlan, Downsampled, HardwareBlurBackend};
pub use capture::RealtimeBackdropCapture;
pub use config::{BlurConfig, CaptureTiming};
pub use error::{BlurError, CaptureError, ConfigError, Error};
pub use host::{Compositor, HostViewSystem, NativeBlurEffect, SnapshotDenied};
pub use overlay::OverlayCompositor;
pub use selector::{BackendCapability, BlurBackendSelector, CapabilityProbe, SelectorState};
pub use session::{BlurSessionHandle, MaterialBlur, RefreshOutcome, SkipReason};
pub use stack_blur::{StackBlur, stack_blur};
pub use types::{Argb, BlurRequest, BlurStyle, PixelBuffer, Theme, ViewHandle};
