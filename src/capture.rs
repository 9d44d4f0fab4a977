// Grabs the backdrop behind a blurred element into a reusable pixel buffer.
// What you get back: the pixels the element covers, as drawn by the root view.

use std::sync::Arc;

use tracing::trace;

use crate::error::{CaptureError, ConfigError};
use crate::host::HostViewSystem;
use crate::types::{PixelBuffer, ViewHandle};

pub struct RealtimeBackdropCapture {
    host: Arc<dyn HostViewSystem>,
    element: ViewHandle,
    exclude_element: bool,
}

impl RealtimeBackdropCapture {
    pub fn new(host: Arc<dyn HostViewSystem>, element: ViewHandle, exclude_element: bool) -> Self {
        Self {
            host,
            element,
            exclude_element,
        }
    }

    /// True when `root` appears somewhere in the element's parent chain.
    pub fn is_ancestor(&self, root: ViewHandle) -> bool {
        let mut current = self.host.parent(self.element);
        while let Some(view) = current {
            if view == root {
                return true;
            }
            current = self.host.parent(view);
        }
        false
    }

    /// Check a user-supplied root before it is stored.
    pub fn validate_root(&self, root: ViewHandle) -> Result<(), ConfigError> {
        if self.is_ancestor(root) {
            Ok(())
        } else {
            Err(ConfigError::InvalidAncestor {
                root,
                element: self.element,
            })
        }
    }

    /// The top-most ancestor, used when no root was configured.
    /// `None` when the element has no parent at all.
    pub fn default_root(&self) -> Option<ViewHandle> {
        let mut top = self.host.parent(self.element)?;
        while let Some(parent) = self.host.parent(top) {
            top = parent;
        }
        Some(top)
    }

    /// Current element size as reported by the host.
    pub fn element_size(&self) -> (u32, u32) {
        self.host.size(self.element)
    }

    /// Capture into a fresh buffer.
    pub fn capture(&self, root: ViewHandle) -> Result<PixelBuffer, CaptureError> {
        let mut target = PixelBuffer::default();
        self.capture_into(root, &mut target)?;
        Ok(target)
    }

    /// Capture into `target`, resizing it in place to the element size.
    pub fn capture_into(&self, root: ViewHandle, target: &mut PixelBuffer) -> Result<(), CaptureError> {
        if !self.is_ancestor(root) {
            return Err(CaptureError::NotAncestor {
                root,
                element: self.element,
            });
        }

        let (w, h) = self.element_size();
        if w == 0 || h == 0 {
            return Err(CaptureError::Detached(self.element));
        }
        target.resize(w, h);

        self.host
            .snapshot(root, self.element, target, self.exclude_element)
            .map_err(|denied| CaptureError::Denied(denied.0))?;
        trace!(element = ?self.element, w, h, "captured backdrop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::host::SnapshotDenied;

    // root(1) -> panel(2) -> card(3); stray(9) is detached.
    struct Tree {
        parents: HashMap<u64, u64>,
        deny: bool,
    }

    impl HostViewSystem for Tree {
        fn parent(&self, view: ViewHandle) -> Option<ViewHandle> {
            self.parents.get(&view.0).copied().map(ViewHandle)
        }

        fn size(&self, view: ViewHandle) -> (u32, u32) {
            if view.0 == 9 { (0, 0) } else { (6, 4) }
        }

        fn snapshot(
            &self,
            _root: ViewHandle,
            _element: ViewHandle,
            target: &mut PixelBuffer,
            _exclude_element: bool,
        ) -> Result<(), SnapshotDenied> {
            if self.deny {
                return Err(SnapshotDenied("secure window".into()));
            }
            target.fill(0xFF33_6699);
            Ok(())
        }
    }

    fn capture_for(element: u64, deny: bool) -> RealtimeBackdropCapture {
        let tree = Tree {
            parents: HashMap::from([(2, 1), (3, 2)]),
            deny,
        };
        RealtimeBackdropCapture::new(Arc::new(tree), ViewHandle(element), false)
    }

    #[test]
    fn ancestor_chain() {
        let capture = capture_for(3, false);
        assert!(capture.is_ancestor(ViewHandle(2)));
        assert!(capture.is_ancestor(ViewHandle(1)));
        assert!(!capture.is_ancestor(ViewHandle(3)));
        assert!(!capture.is_ancestor(ViewHandle(9)));
        assert_eq!(capture.default_root(), Some(ViewHandle(1)));
        assert_eq!(
            capture.validate_root(ViewHandle(9)),
            Err(ConfigError::InvalidAncestor {
                root: ViewHandle(9),
                element: ViewHandle(3)
            })
        );
    }

    #[test]
    fn capture_sizes_to_element() {
        let capture = capture_for(3, false);
        let buf = capture.capture(ViewHandle(1)).unwrap();
        assert_eq!(buf.dimensions(), (6, 4));
        assert!(buf.pixels().iter().all(|&p| p == 0xFF33_6699));
    }

    #[test]
    fn capture_reuses_target() {
        let capture = capture_for(3, false);
        let mut target = PixelBuffer::new(6, 4);
        let ptr = target.pixels().as_ptr();
        capture.capture_into(ViewHandle(2), &mut target).unwrap();
        assert_eq!(target.pixels().as_ptr(), ptr);
    }

    #[test]
    fn capture_failures() {
        let denied = capture_for(3, true);
        assert!(matches!(denied.capture(ViewHandle(1)), Err(CaptureError::Denied(_))));

        let capture = capture_for(3, false);
        assert!(matches!(
            capture.capture(ViewHandle(9)),
            Err(CaptureError::NotAncestor { .. })
        ));

        let stray = capture_for(9, false);
        assert_eq!(stray.default_root(), None);
    }
}
