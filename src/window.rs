// Demo window: shows the camera backdrop with the blurred card on top.

use material_blur::PixelBuffer;
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};

use crate::DemoError;

pub struct Drawer {
    window: Window,
}

impl Drawer {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self, DemoError> {
        let window = Window::new(title, width, height, WindowOptions::default())
            .map_err(|e| DemoError::WindowInit(e.to_string()))?;
        Ok(Self { window })
    }

    /// Push a frame; minifb ignores the alpha byte.
    pub fn present(&mut self, frame: &PixelBuffer) -> Result<(), DemoError> {
        self.window
            .update_with_buffer(frame.pixels(), frame.stride() as usize, frame.height() as usize)
            .map_err(|e| DemoError::WindowUpdate(e.to_string()))
    }

    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    pub fn esc_pressed(&self) -> bool {
        self.window.is_key_down(Key::Escape)
    }

    pub fn pressed_once(&self, key: Key) -> bool {
        self.window.is_key_pressed(key, KeyRepeat::No)
    }

    /// Held keys repeat, so the radius can be swept.
    pub fn pressed_repeat(&self, key: Key) -> bool {
        self.window.is_key_pressed(key, KeyRepeat::Yes)
    }

    pub fn mouse_pos(&self) -> Option<(usize, usize)> {
        self.window
            .get_mouse_pos(MouseMode::Clamp)
            .map(|(x, y)| (x.max(0.0) as usize, y.max(0.0) as usize))
    }

    pub fn left_mouse_down(&self) -> bool {
        self.window.get_mouse_down(MouseButton::Left)
    }
}
