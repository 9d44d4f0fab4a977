// What you SEE:
// • Live camera is the backdrop filling the window.
// • A frosted card sits on top; its blur follows the camera in real time.
// • Hold Left Mouse: drag the card around.
// • 1 / 2 / 3 pick Light / ExtraLight / Dark. Up / Down change the radius.
// • B toggles blur on the card. ESC quits.
// Logging: RUST_LOG=material_blur=trace shows every capture.

mod camera;
mod window;

use std::sync::Arc;
use std::time::{Duration, Instant};

use material_blur::{
    Argb, BlurConfig, BlurRequest, BlurSessionHandle, BlurStyle, Compositor, HostViewSystem, MaterialBlur,
    PixelBuffer, SnapshotDenied, ViewHandle,
};
use minifb::Key;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use camera::CameraCapture;
use window::Drawer;

const WINDOW: ViewHandle = ViewHandle(1);
const CARD: ViewHandle = ViewHandle(2);
const CARD_SIZE: (u32, u32) = (320, 200);
const CARD_CORNER: f32 = 18.0;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("window init error: {0}")]
    WindowInit(String),
    #[error("window update error: {0}")]
    WindowUpdate(String),
    #[error("camera init error: {0}")]
    CameraInit(String),
    #[error("camera frame error: {0}")]
    CameraFrame(String),
    #[error(transparent)]
    Blur(#[from] material_blur::Error),
}

/// Two-view tree: the window shows the camera, the card floats inside it.
struct CameraBackdrop {
    frame: Mutex<PixelBuffer>,
    card_origin: Mutex<(u32, u32)>,
}

impl CameraBackdrop {
    fn new(width: u32, height: u32) -> Self {
        let origin = (
            width.saturating_sub(CARD_SIZE.0) / 2,
            height.saturating_sub(CARD_SIZE.1) / 2,
        );
        Self {
            frame: Mutex::new(PixelBuffer::new(width, height)),
            card_origin: Mutex::new(origin),
        }
    }

    /// Center the card on (x, y), kept inside the window.
    fn move_card(&self, x: u32, y: u32) {
        let (w, h) = self.frame.lock().dimensions();
        let max_x = w.saturating_sub(CARD_SIZE.0);
        let max_y = h.saturating_sub(CARD_SIZE.1);
        *self.card_origin.lock() = (
            x.saturating_sub(CARD_SIZE.0 / 2).min(max_x),
            y.saturating_sub(CARD_SIZE.1 / 2).min(max_y),
        );
    }

    fn card_origin(&self) -> (u32, u32) {
        *self.card_origin.lock()
    }
}

impl HostViewSystem for CameraBackdrop {
    fn parent(&self, view: ViewHandle) -> Option<ViewHandle> {
        (view == CARD).then_some(WINDOW)
    }

    fn size(&self, view: ViewHandle) -> (u32, u32) {
        let (w, h) = self.frame.lock().dimensions();
        if view == CARD {
            (CARD_SIZE.0.min(w), CARD_SIZE.1.min(h))
        } else {
            (w, h)
        }
    }

    fn snapshot(
        &self,
        _root: ViewHandle,
        _element: ViewHandle,
        target: &mut PixelBuffer,
        _exclude_element: bool,
    ) -> Result<(), SnapshotDenied> {
        // The camera never contains the card, so excluding it is free.
        let (ox, oy) = self.card_origin();
        let frame = self.frame.lock();
        for y in 0..target.height() {
            for x in 0..target.width() {
                let color = frame.get(ox + x, oy + y).unwrap_or(Argb::BLACK.0);
                target.set(x, y, color);
            }
        }
        Ok(())
    }
}

/// Keeps the latest card frame until the render loop paints it.
#[derive(Default)]
struct CardCompositor {
    card: Mutex<PixelBuffer>,
}

impl Compositor for CardCompositor {
    fn present(&self, _element: ViewHandle, frame: &PixelBuffer) {
        self.card.lock().clone_from(frame);
    }
}

/// Source-over the card onto the screen at (ox, oy); clipped corners stay see-through.
fn draw_card(screen: &mut PixelBuffer, card: &PixelBuffer, ox: u32, oy: u32) {
    for y in 0..card.height() {
        for x in 0..card.width() {
            let (Some(src), Some(dst)) = (card.get(x, y), screen.get(ox + x, oy + y)) else {
                continue;
            };
            let a = src >> 24;
            if a == 0 {
                continue;
            }
            let mix = |shift: u32| {
                let s = (src >> shift) & 0xFF;
                let d = (dst >> shift) & 0xFF;
                (s * a + d * (255 - a) + 127) / 255
            };
            screen.set(ox + x, oy + y, 0xFF00_0000 | (mix(16) << 16) | (mix(8) << 8) | mix(0));
        }
    }
}

fn request(style: BlurStyle, radius: f32) -> BlurRequest {
    BlurRequest {
        radius,
        ..BlurRequest::from_style(style)
    }
    .with_corner_radius(CARD_CORNER)
}

fn main() -> Result<(), DemoError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,material_blur=debug")),
        )
        .init();

    let mut cam = CameraCapture::new(0, 640, 480)?;
    let (w, h) = cam.resolution();
    let mut drawer = Drawer::new("Material Blur", w as usize, h as usize)?;

    let host = Arc::new(CameraBackdrop::new(w, h));
    let compositor = Arc::new(CardCompositor::default());
    let blur = MaterialBlur::new(BlurConfig::default(), host.clone(), compositor.clone())?;

    let mut style = BlurStyle::Light;
    let mut radius = blur.config().radius;
    let mut session: Option<BlurSessionHandle> = Some(blur.enable_blur(CARD, request(style, radius))?);

    let mut screen = PixelBuffer::new(w, h);
    let mut last_title = Instant::now();
    let mut frames_this_second: u32 = 0;

    while drawer.is_open() && !drawer.esc_pressed() {
        // 1) New backdrop; the auto-update timer picks it up on its next tick.
        let live = cam.next_frame()?;
        host.frame.lock().clone_from(&live);

        // 2) Inputs
        let mut changed = false;
        for (key, preset) in [
            (Key::Key1, BlurStyle::Light),
            (Key::Key2, BlurStyle::ExtraLight),
            (Key::Key3, BlurStyle::Dark),
        ] {
            if drawer.pressed_once(key) {
                style = preset;
                changed = true;
            }
        }
        if drawer.pressed_repeat(Key::Up) {
            radius = (radius + 2.0).min(120.0);
            changed = true;
        }
        if drawer.pressed_repeat(Key::Down) {
            radius = (radius - 2.0).max(0.0);
            changed = true;
        }
        if drawer.pressed_once(Key::B) {
            session = match session.take() {
                Some(handle) => {
                    blur.disable_blur(handle);
                    None
                }
                None => Some(blur.enable_blur(CARD, request(style, radius))?),
            };
        }
        if changed {
            if let Some(handle) = session {
                blur.update_request(handle, request(style, radius))?;
            }
        }
        if drawer.left_mouse_down() {
            if let Some((mx, my)) = drawer.mouse_pos() {
                host.move_card(mx as u32, my as u32);
            }
        }

        // 3) Camera first, card on top.
        screen.clone_from(&live);
        if session.is_some() {
            let (ox, oy) = host.card_origin();
            draw_card(&mut screen, &compositor.card.lock(), ox, oy);
        }
        drawer.present(&screen)?;

        // 4) Status in the title bar once per second.
        frames_this_second += 1;
        let now = Instant::now();
        if now.duration_since(last_title) >= Duration::from_secs(1) {
            let fps = frames_this_second as f32 / now.duration_since(last_title).as_secs_f32();
            let backend = session.and_then(|handle| blur.backend_state(handle));
            let title = match backend {
                Some(state) => format!("Material Blur | {style:?} r={radius:.0} | {state:?} | {fps:.1} fps"),
                None => format!("Material Blur | blur off | {fps:.1} fps"),
            };
            info!("{title}");
            drawer.set_title(&title);
            frames_this_second = 0;
            last_title = now;
        }
    }

    if let Some(handle) = session {
        blur.disable_blur(handle);
    }
    Ok(())
}
