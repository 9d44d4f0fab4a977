// Collaborators living outside this crate: the host view system that can snapshot
// whatever sits behind an element, and the compositor that displays finished frames
// and may expose native blur primitives.

use std::sync::Arc;

use crate::error::BlurError;
use crate::types::{PixelBuffer, ViewHandle};

/// Why the host refused a snapshot (e.g. a secure-content window).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotDenied(pub String);

pub trait HostViewSystem: Send + Sync {
    /// Parent of `view`, `None` at the top of the tree or when detached.
    fn parent(&self, view: ViewHandle) -> Option<ViewHandle>;

    /// Current size of `view` in pixels.
    fn size(&self, view: ViewHandle) -> (u32, u32);

    /// Render what `root` shows beneath `element` into `target`.
    ///
    /// `target` is already sized to the element; the host overwrites every pixel.
    /// With `exclude_element` set the element itself must not appear in the snapshot.
    fn snapshot(
        &self,
        root: ViewHandle,
        element: ViewHandle,
        target: &mut PixelBuffer,
        exclude_element: bool,
    ) -> Result<(), SnapshotDenied>;
}

/// A blur primitive provided by the platform graphics stack.
pub trait NativeBlurEffect: Send + Sync {
    /// Blur `input` into `output` (same dimensions) with an already capped radius.
    fn blur(&self, input: &PixelBuffer, output: &mut PixelBuffer, radius: f32) -> Result<(), BlurError>;
}

pub trait Compositor: Send + Sync {
    /// Compositor-level blur effect (e.g. a backdrop filter on a hardware layer).
    fn hardware_effect(&self) -> Option<Arc<dyn NativeBlurEffect>> {
        None
    }

    /// Blur obtained by rendering a view snapshot through a GPU effect.
    fn snapshot_effect(&self) -> Option<Arc<dyn NativeBlurEffect>> {
        None
    }

    /// Display `frame` as the content of `element`.
    fn present(&self, element: ViewHandle, frame: &PixelBuffer);
}
