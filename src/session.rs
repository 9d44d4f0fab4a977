// Blur sessions and the public entry point.
//
// A refresh runs capture -> blur -> overlay -> present for one element:
//   1) under the state lock: take the capture buffer out of the session and fill it,
//   2) under the backend lock only: blur into an owned output buffer,
//   3) under the state lock again: drop the result if the session was disposed or a
//      newer capture started meanwhile, otherwise composite and present it.
// Lock order is always state -> backend.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::backend::{BlurBackend, BlurPlan};
use crate::capture::RealtimeBackdropCapture;
use crate::config::BlurConfig;
use crate::error::{BlurError, CaptureError, Error};
use crate::host::{Compositor, HostViewSystem};
use crate::overlay::OverlayCompositor;
use crate::selector::{BlurBackendSelector, CapabilityProbe, SelectorState};
use crate::timer::{AutoUpdateTimer, Tick};
use crate::types::{BlurRequest, PixelBuffer, Theme, ViewHandle};

/// Identifies one blur session returned by `MaterialBlur::enable_blur`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlurSessionHandle(u64);

impl BlurSessionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The element has no area; buffers were released.
    ZeroSize,
    /// The backend failed; the previous frame stays on screen.
    BlurFailed,
    /// No backdrop to capture (element detached or moved away from its root);
    /// the previous frame stays on screen and the next refresh tries again.
    NoBackdrop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A blurred frame was handed to the compositor.
    Presented,
    /// A flat overlay frame was handed to the compositor.
    Overlay,
    /// A newer capture superseded this one; its result was dropped.
    Stale,
    Skipped(SkipReason),
    Disposed,
}

struct SessionState {
    disposed: bool,
    request: BlurRequest,
    root: Option<ViewHandle>,
    selector: BlurBackendSelector,
    capture: Option<PixelBuffer>, // None while a refresh owns it
    spare: Option<PixelBuffer>,   // recycled output buffer
    frame: PixelBuffer,           // last frame handed to the compositor
    applied: Option<BlurPlan>,
    dirty: bool,
}

impl SessionState {
    fn release_buffers(&mut self) {
        self.capture = None;
        self.spare = None;
        self.frame.release();
        self.applied = None;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}

pub(crate) struct SessionCore {
    element: ViewHandle,
    capture: RealtimeBackdropCapture,
    compositor: Arc<dyn Compositor>,
    state: Mutex<SessionState>,
    backend: Mutex<BlurBackend>,
    generation: AtomicU64,
}

impl SessionCore {
    fn refresh(&self) -> RefreshOutcome {
        // 1) Capture.
        let (generation, input, mut output, plan) = {
            let mut state = self.state.lock();
            if state.disposed {
                return RefreshOutcome::Disposed;
            }

            let (w, h) = self.capture.element_size();
            if w == 0 || h == 0 {
                state.release_buffers();
                self.backend.lock().release_buffers();
                trace!(element = ?self.element, "zero-sized element, buffers released");
                return RefreshOutcome::Skipped(SkipReason::ZeroSize);
            }

            // Any blur still in flight is older than what we show next.
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

            if state.selector.state() == SelectorState::OverlayOnly {
                return self.present_overlay(&mut state, w, h);
            }

            let mut input = state.capture.take().unwrap_or_default();
            let captured = match state.root.or_else(|| self.capture.default_root()) {
                Some(root) => self.capture.capture_into(root, &mut input),
                None => Err(CaptureError::Detached(self.element)),
            };
            if let Err(e) = captured {
                state.capture = Some(input);
                return match &e {
                    CaptureError::Denied(_) => {
                        self.degrade(&mut state, &e);
                        self.present_overlay(&mut state, w, h)
                    }
                    CaptureError::NotAncestor { root, .. } => {
                        // Reparented (still attached): forget the stale root and use the
                        // top-most ancestor next time. A detached element keeps its root.
                        warn!(element = ?self.element, root = ?root, "capture root is no longer an ancestor");
                        if state.root == Some(*root) && self.capture.default_root().is_some() {
                            state.root = None;
                        }
                        RefreshOutcome::Skipped(SkipReason::NoBackdrop)
                    }
                    CaptureError::Detached(_) => {
                        warn!(element = ?self.element, "element detached, keeping previous frame");
                        RefreshOutcome::Skipped(SkipReason::NoBackdrop)
                    }
                };
            }

            let plan = state.selector.plan(&state.request);
            if state.applied != Some(plan) {
                debug!(element = ?self.element, radius = plan.radius, downsample = plan.downsample_factor, "applying blur plan");
                state.applied = Some(plan);
            }
            let output = state.spare.take().unwrap_or_default();
            (generation, input, output, plan)
        };

        // 2) Blur, without blocking the session state. A panicking platform effect
        // is turned into an error so the timer thread survives it.
        let blurred = {
            let mut backend = self.backend.lock();
            panic::catch_unwind(AssertUnwindSafe(|| backend.process(&input, &mut output, plan))).unwrap_or_else(
                |payload| {
                    Err(BlurError::Effect(format!(
                        "blur backend panicked: {}",
                        panic_message(&*payload)
                    )))
                },
            )
        };

        // 3) Composite.
        let mut state = self.state.lock();
        if state.disposed {
            return RefreshOutcome::Disposed;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            trace!(element = ?self.element, generation, "discarding stale blur result");
            if state.capture.is_none() {
                state.capture = Some(input);
            }
            state.spare.get_or_insert(output);
            return RefreshOutcome::Stale;
        }
        state.capture = Some(input);

        if let Err(e) = blurred {
            error!(element = ?self.element, error = %e, "blur failed, keeping previous frame");
            state.spare = Some(output);
            return RefreshOutcome::Skipped(SkipReason::BlurFailed);
        }

        OverlayCompositor::compose(&mut output, state.request.overlay_color, state.request.corner_radius);
        let previous = std::mem::replace(&mut state.frame, output);
        state.spare = Some(previous);
        state.dirty = false;
        self.compositor.present(self.element, &state.frame);
        RefreshOutcome::Presented
    }

    fn present_overlay(&self, state: &mut SessionState, w: u32, h: u32) -> RefreshOutcome {
        state.frame.resize(w, h);
        OverlayCompositor::fill_overlay(&mut state.frame, state.request.overlay_color, state.request.corner_radius);
        state.dirty = false;
        self.compositor.present(self.element, &state.frame);
        RefreshOutcome::Overlay
    }

    fn degrade(&self, state: &mut SessionState, reason: &dyn Display) {
        if state.selector.degrade(reason) {
            let mut backend = self.backend.lock();
            backend.release_buffers();
            *backend = BlurBackend::StaticOverlay;
            state.capture = None;
            state.applied = None;
        }
    }

    fn update_request(&self, request: BlurRequest) {
        let mut state = self.state.lock();
        if state.request != request {
            debug!(element = ?self.element, ?request, "blur request updated");
        }
        state.request = request;
        state.dirty = true;
    }

    fn set_root(&self, root: ViewHandle) -> Result<(), Error> {
        self.capture.validate_root(root)?;
        let mut state = self.state.lock();
        state.root = Some(root);
        state.dirty = true;
        Ok(())
    }

    fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.release_buffers();
        self.backend.lock().release_buffers();
        debug!(element = ?self.element, "blur session disposed");
    }
}

impl Tick for SessionCore {
    fn tick(&self) -> bool {
        let due = {
            let state = self.state.lock();
            if state.disposed {
                return false;
            }
            state.request.auto_update || state.dirty
        };
        !due || self.refresh() != RefreshOutcome::Disposed
    }
}

/// One blurred element: its pipeline plus the timer driving it.
struct BlurSession {
    core: Arc<SessionCore>,
    timer: Mutex<AutoUpdateTimer>,
}

impl BlurSession {
    fn shut_down(&self) {
        self.core.dispose();
        self.timer.lock().cancel();
    }
}

impl Drop for BlurSession {
    fn drop(&mut self) {
        self.shut_down();
    }
}

#[derive(Default)]
struct Registry {
    by_id: HashMap<u64, Arc<BlurSession>>,
    by_element: HashMap<ViewHandle, u64>,
}

/// Entry point: owns the collaborators and the sessions of every blurred element.
pub struct MaterialBlur {
    config: BlurConfig,
    host: Arc<dyn HostViewSystem>,
    compositor: Arc<dyn Compositor>,
    probe: Arc<CapabilityProbe>,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl MaterialBlur {
    pub fn new(
        config: BlurConfig,
        host: Arc<dyn HostViewSystem>,
        compositor: Arc<dyn Compositor>,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            host,
            compositor,
            probe: Arc::new(CapabilityProbe::new()),
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &BlurConfig {
        &self.config
    }

    /// Start blurring `element`. Enabling an element that already has a session
    /// updates that session and returns its handle.
    pub fn enable_blur(&self, element: ViewHandle, request: BlurRequest) -> Result<BlurSessionHandle, Error> {
        request.validate()?;

        let mut registry = self.registry.lock();
        if let Some(&id) = registry.by_element.get(&element) {
            if let Some(session) = registry.by_id.get(&id) {
                self.apply_request(session, request);
                return Ok(BlurSessionHandle(id));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let capture =
            RealtimeBackdropCapture::new(self.host.clone(), element, self.config.exclude_element_from_capture);
        let mut selector = BlurBackendSelector::new(self.probe.clone(), self.compositor.clone(), &self.config);
        let backend = selector.activate(capture.default_root().is_some());

        let core = Arc::new(SessionCore {
            element,
            capture,
            compositor: self.compositor.clone(),
            state: Mutex::new(SessionState {
                disposed: false,
                request,
                root: None,
                selector,
                capture: None,
                spare: None,
                frame: PixelBuffer::default(),
                applied: None,
                dirty: true,
            }),
            backend: Mutex::new(backend),
            generation: AtomicU64::new(0),
        });
        let timer = AutoUpdateTimer::spawn(
            format!("blur-auto-update-{id}"),
            Arc::downgrade(&core),
            self.config.timing,
            request.auto_update,
        )?;
        // First frame once the content had time to settle.
        timer.content_changed();

        debug!(element = ?element, id, "blur enabled");
        registry.by_id.insert(
            id,
            Arc::new(BlurSession {
                core,
                timer: Mutex::new(timer),
            }),
        );
        registry.by_element.insert(element, id);
        Ok(BlurSessionHandle(id))
    }

    /// Re-apply radius, tint, corner radius, downsampling and auto-update
    /// without recreating the session.
    pub fn update_request(&self, handle: BlurSessionHandle, request: BlurRequest) -> Result<(), Error> {
        request.validate()?;
        let session = self.session(handle)?;
        self.apply_request(&session, request);
        Ok(())
    }

    fn apply_request(&self, session: &BlurSession, request: BlurRequest) {
        session.core.update_request(request);
        let timer = session.timer.lock();
        timer.set_auto_update(request.auto_update);
        timer.content_changed();
    }

    /// Capture the backdrop from `root` instead of the top-most ancestor.
    /// `root` must be an ancestor of the blurred element.
    pub fn set_root_capture_view(&self, handle: BlurSessionHandle, root: ViewHandle) -> Result<(), Error> {
        let session = self.session(handle)?;
        session.core.set_root(root)?;
        session.timer.lock().content_changed();
        Ok(())
    }

    /// Stop blurring: cancels the timer and releases buffers. Unknown or already
    /// disabled handles are ignored.
    pub fn disable_blur(&self, handle: BlurSessionHandle) {
        let removed = {
            let mut registry = self.registry.lock();
            let removed = registry.by_id.remove(&handle.0);
            if let Some(session) = &removed {
                registry.by_element.remove(&session.core.element);
            }
            removed
        };
        if let Some(session) = removed {
            session.shut_down();
            debug!(id = handle.0, "blur disabled");
        }
    }

    /// Run the pipeline now (size change, explicit invalidation).
    pub fn refresh(&self, handle: BlurSessionHandle) -> Result<RefreshOutcome, Error> {
        let session = self.session(handle)?;
        Ok(session.core.refresh())
    }

    /// The content behind the element changed: re-capture after the processing delay.
    pub fn notify_content_changed(&self, handle: BlurSessionHandle) -> Result<(), Error> {
        let session = self.session(handle)?;
        session.core.mark_dirty();
        session.timer.lock().content_changed();
        Ok(())
    }

    /// Follow a theme switch. Returns whether blur is still enabled.
    pub fn apply_theme(&self, handle: BlurSessionHandle, theme: Theme) -> Result<bool, Error> {
        let session = self.session(handle)?;
        if theme.uses_blur() {
            session.core.mark_dirty();
            session.timer.lock().content_changed();
            return Ok(true);
        }
        drop(session);
        self.disable_blur(handle);
        Ok(false)
    }

    pub fn backend_state(&self, handle: BlurSessionHandle) -> Option<SelectorState> {
        let session = self.session(handle).ok()?;
        let state = session.core.state.lock().selector.state();
        Some(state)
    }

    /// Copy of the last frame handed to the compositor.
    pub fn last_frame(&self, handle: BlurSessionHandle) -> Option<PixelBuffer> {
        let session = self.session(handle).ok()?;
        let frame = session.core.state.lock().frame.clone();
        Some(frame)
    }

    pub fn session_count(&self) -> usize {
        self.registry.lock().by_id.len()
    }

    fn session(&self, handle: BlurSessionHandle) -> Result<Arc<BlurSession>, Error> {
        self.registry
            .lock()
            .by_id
            .get(&handle.0)
            .cloned()
            .ok_or(Error::UnknownSession(handle.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SnapshotDenied;
    use crate::types::Argb;

    // window(1) -> card(2); lonely(3) has no parent.
    struct Host {
        size: Mutex<(u32, u32)>,
        deny: bool,
    }

    impl HostViewSystem for Host {
        fn parent(&self, view: ViewHandle) -> Option<ViewHandle> {
            (view == ViewHandle(2)).then_some(ViewHandle(1))
        }

        fn size(&self, _view: ViewHandle) -> (u32, u32) {
            *self.size.lock()
        }

        fn snapshot(
            &self,
            _root: ViewHandle,
            _element: ViewHandle,
            target: &mut PixelBuffer,
            _exclude_element: bool,
        ) -> Result<(), SnapshotDenied> {
            if self.deny {
                return Err(SnapshotDenied("protected".into()));
            }
            target.fill(0xFF00_0000);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Screen {
        frames: Mutex<Vec<(ViewHandle, PixelBuffer)>>,
    }

    impl Compositor for Screen {
        fn present(&self, element: ViewHandle, frame: &PixelBuffer) {
            self.frames.lock().push((element, frame.clone()));
        }
    }

    fn service(deny: bool) -> (MaterialBlur, Arc<Host>, Arc<Screen>) {
        let host = Arc::new(Host {
            size: Mutex::new((8, 6)),
            deny,
        });
        let screen = Arc::new(Screen::default());
        // Timers stay quiet; tests drive refresh by hand.
        let config = BlurConfig::default()
            .with_auto_update_delay_ms(60_000)
            .unwrap()
            .with_processing_delay_ms(60_000)
            .unwrap();
        let blur = MaterialBlur::new(config, host.clone(), screen.clone()).unwrap();
        (blur, host, screen)
    }

    fn manual(radius: f32) -> BlurRequest {
        BlurRequest::new(radius)
            .with_auto_update(false)
            .with_overlay_color(Argb::TRANSPARENT)
    }

    #[test_log::test]
    fn refresh_presents_a_blurred_frame() {
        let (blur, _host, screen) = service(false);
        let handle = blur.enable_blur(ViewHandle(2), manual(3.0)).unwrap();
        assert_eq!(blur.backend_state(handle), Some(SelectorState::CpuReady));

        assert_eq!(blur.refresh(handle).unwrap(), RefreshOutcome::Presented);
        let frames = screen.frames.lock();
        let (element, frame) = frames.last().unwrap();
        assert_eq!(*element, ViewHandle(2));
        assert_eq!(frame.dimensions(), (8, 6));
        assert!(frame.pixels().iter().all(|&p| p == 0xFF00_0000));
    }

    #[test_log::test]
    fn capture_failure_degrades_to_overlay() {
        let (blur, _host, screen) = service(true);
        let tint = Argb(0x80FF_0000);
        let handle = blur
            .enable_blur(ViewHandle(2), manual(3.0).with_overlay_color(tint))
            .unwrap();
        assert_eq!(blur.refresh(handle).unwrap(), RefreshOutcome::Overlay);
        assert_eq!(blur.backend_state(handle), Some(SelectorState::OverlayOnly));
        assert_eq!(blur.refresh(handle).unwrap(), RefreshOutcome::Overlay);

        let frames = screen.frames.lock();
        assert!(!frames.is_empty());
        for (_, frame) in frames.iter() {
            assert_eq!(*frame, PixelBuffer::filled(8, 6, tint.0));
        }
    }

    #[test_log::test]
    fn element_without_ancestor_is_overlay_only() {
        let (blur, _host, _screen) = service(false);
        let handle = blur.enable_blur(ViewHandle(3), manual(3.0)).unwrap();
        assert_eq!(blur.backend_state(handle), Some(SelectorState::OverlayOnly));
        assert_eq!(blur.refresh(handle).unwrap(), RefreshOutcome::Overlay);
    }

    #[test_log::test]
    fn zero_size_releases_buffers() {
        let (blur, host, _screen) = service(false);
        let handle = blur.enable_blur(ViewHandle(2), manual(3.0)).unwrap();
        blur.refresh(handle).unwrap();
        *host.size.lock() = (0, 6);
        assert_eq!(
            blur.refresh(handle).unwrap(),
            RefreshOutcome::Skipped(SkipReason::ZeroSize)
        );
        assert!(blur.last_frame(handle).unwrap().is_empty());
    }

    #[test_log::test]
    fn enabling_twice_reuses_the_session() {
        let (blur, _host, _screen) = service(false);
        let first = blur.enable_blur(ViewHandle(2), manual(3.0)).unwrap();
        let second = blur.enable_blur(ViewHandle(2), manual(8.0)).unwrap();
        assert_eq!(first, second);
        assert_eq!(blur.session_count(), 1);
    }

    #[test_log::test]
    fn disable_is_idempotent() {
        let (blur, _host, _screen) = service(false);
        let handle = blur.enable_blur(ViewHandle(2), manual(3.0)).unwrap();
        blur.disable_blur(handle);
        blur.disable_blur(handle);
        assert_eq!(blur.session_count(), 0);
        assert!(matches!(blur.refresh(handle), Err(Error::UnknownSession(_))));
    }

    #[test_log::test]
    fn stale_result_is_discarded() {
        let (blur, _host, screen) = service(false);
        let handle = blur.enable_blur(ViewHandle(2), manual(3.0)).unwrap();
        let session = blur.session(handle).unwrap();
        let core = &session.core;

        // Hold the backend so the next refresh stops between capture and blur.
        let backend = core.backend.lock();
        let racing = {
            let core = core.clone();
            std::thread::spawn(move || core.refresh())
        };
        while core.generation.load(Ordering::SeqCst) == 0 {
            std::thread::yield_now();
        }
        // A newer capture starts while the first one is in flight.
        core.generation.fetch_add(1, Ordering::SeqCst);
        drop(backend);

        assert_eq!(racing.join().unwrap(), RefreshOutcome::Stale);
        assert!(screen.frames.lock().is_empty());
    }

    #[test_log::test]
    fn theme_switch_away_from_blur_disables() {
        let (blur, _host, _screen) = service(false);
        let handle = blur.enable_blur(ViewHandle(2), manual(3.0)).unwrap();
        assert!(blur.apply_theme(handle, Theme::AcrylicBlur).unwrap());
        assert!(!blur.apply_theme(handle, Theme::Dark).unwrap());
        assert_eq!(blur.session_count(), 0);
    }

    #[test_log::test]
    fn invalid_inputs_are_rejected() {
        let (blur, _host, _screen) = service(false);
        assert!(blur.enable_blur(ViewHandle(2), BlurRequest::new(-2.0)).is_err());
        let handle = blur.enable_blur(ViewHandle(2), manual(3.0)).unwrap();
        assert!(matches!(
            blur.set_root_capture_view(handle, ViewHandle(3)),
            Err(Error::Config(crate::error::ConfigError::InvalidAncestor { .. }))
        ));
        assert!(blur.set_root_capture_view(handle, ViewHandle(1)).is_ok());
    }
}
