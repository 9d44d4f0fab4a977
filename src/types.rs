// Core types shared by every stage of the blur pipeline.
// Pixels are ARGB8888 packed into u32: (a << 24) | (r << 16) | (g << 8) | b.

use image::{ImageBuffer, Rgb, Rgba, RgbaImage};

use crate::error::ConfigError;

/// Radius used when a request comes from a style preset rather than an explicit value.
pub const STYLED_BLUR_RADIUS: f32 = 64.0;

/// A contiguous ARGB8888 pixel store.
///
/// Invariant: `pixels.len() == stride * height` and `stride >= width`.
/// The fields are private so the invariant can only be broken through `from_pixels`,
/// which checks it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: u32,      // pixels per row in storage, >= width
    pixels: Vec<u32>, // row-major, `stride * height` entries
}

impl PixelBuffer {
    /// Allocate a transparent buffer with a tight stride.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_stride(width, height, width)
    }

    /// Allocate a transparent buffer with an explicit row stride (clamped up to `width`).
    pub fn with_stride(width: u32, height: u32, stride: u32) -> Self {
        let stride = stride.max(width);
        Self {
            width,
            height,
            stride,
            pixels: vec![0; stride as usize * height as usize],
        }
    }

    /// A buffer where every pixel holds `color`.
    pub fn filled(width: u32, height: u32, color: u32) -> Self {
        let mut buffer = Self::new(width, height);
        buffer.fill(color);
        buffer
    }

    /// Wrap existing storage, checking the layout invariant.
    pub fn from_pixels(
        width: u32,
        height: u32,
        stride: u32,
        pixels: Vec<u32>,
    ) -> Result<Self, ConfigError> {
        let expected = stride as usize * height as usize;
        if stride < width || pixels.len() != expected {
            return Err(ConfigError::InvalidBuffer {
                width,
                height,
                stride,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Raw storage including any padding columns.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    /// Heap capacity currently held, in pixels.
    pub fn capacity(&self) -> usize {
        self.pixels.capacity()
    }

    /// The visible part of row `y` (padding excluded).
    pub fn row(&self, y: u32) -> &[u32] {
        let start = y as usize * self.stride as usize;
        &self.pixels[start..start + self.width as usize]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u32] {
        let start = y as usize * self.stride as usize;
        &mut self.pixels[start..start + self.width as usize]
    }

    /// Pixel at (x, y); `None` when out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y as usize * self.stride as usize + x as usize])
    }

    /// Write one pixel; writes outside the buffer are ignored.
    pub fn set(&mut self, x: u32, y: u32, color: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.pixels[y as usize * self.stride as usize + x as usize] = color;
    }

    /// Set every visible pixel to `color`.
    pub fn fill(&mut self, color: u32) {
        for y in 0..self.height {
            self.row_mut(y).fill(color);
        }
    }

    /// Resize in place. Same dimensions: nothing happens and contents are kept.
    /// Otherwise the storage is reused (grown only when needed) and cleared.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.stride = width;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize, 0);
    }

    /// Drop the storage; the buffer becomes 0x0.
    pub fn release(&mut self) {
        self.width = 0;
        self.height = 0;
        self.stride = 0;
        self.pixels = Vec::new();
    }

    /// Copy visible pixels from `other`, which must have the same dimensions.
    pub fn copy_from(&mut self, other: &PixelBuffer) -> Result<(), ConfigError> {
        if self.dimensions() != other.dimensions() {
            return Err(ConfigError::DimensionMismatch {
                expected: self.dimensions(),
                actual: other.dimensions(),
            });
        }
        for y in 0..self.height {
            self.row_mut(y).copy_from_slice(other.row(y));
        }
        Ok(())
    }

    /// Build from an RGBA image (straight alpha).
    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        let (w, h) = img.dimensions();
        let mut pixels = Vec::with_capacity(w as usize * h as usize);
        for pixel in img.pixels() {
            let [r, g, b, a] = pixel.0;
            pixels.push(Argb::from_channels(a, r, g, b).0);
        }
        Self {
            width: w,
            height: h,
            stride: w,
            pixels,
        }
    }

    /// Build from an RGB image (camera frames); every pixel is opaque.
    pub fn from_rgb_image(img: &ImageBuffer<Rgb<u8>, Vec<u8>>) -> Self {
        let (w, h) = img.dimensions();
        let mut pixels = Vec::with_capacity(w as usize * h as usize);
        for pixel in img.pixels() {
            let [r, g, b] = pixel.0;
            pixels.push(Argb::from_channels(0xFF, r, g, b).0);
        }
        Self {
            width: w,
            height: h,
            stride: w,
            pixels,
        }
    }

    /// Export the visible pixels as an RGBA image.
    pub fn to_rgba_image(&self) -> RgbaImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let c = Argb(self.pixels[y as usize * self.stride as usize + x as usize]);
            Rgba([c.red(), c.green(), c.blue(), c.alpha()])
        })
    }
}

/// One ARGB8888 color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Argb(pub u32);

impl Argb {
    pub const TRANSPARENT: Argb = Argb(0x0000_0000);
    pub const BLACK: Argb = Argb(0xFF00_0000);
    pub const WHITE: Argb = Argb(0xFFFF_FFFF);

    pub const fn from_channels(a: u8, r: u8, g: u8, b: u8) -> Self {
        Argb(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    #[inline]
    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    #[inline]
    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline]
    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline]
    pub const fn blue(self) -> u8 {
        self.0 as u8
    }

    /// Parse `#AARRGGBB` or `#RRGGBB` (opaque). The leading `#` is optional.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        let value = u32::from_str_radix(digits, 16).ok()?;
        match digits.len() {
            8 => Some(Argb(value)),
            6 => Some(Argb(0xFF00_0000 | value)),
            _ => None,
        }
    }
}

/// Tint presets for the blurred card.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlurStyle {
    #[default]
    Light,
    ExtraLight,
    Dark,
}

impl BlurStyle {
    /// Fixed overlay tint for the style.
    pub const fn overlay_color(self) -> Argb {
        match self {
            BlurStyle::Light => Argb(0x40FF_FFFF),
            BlurStyle::ExtraLight => Argb(0xB0FF_FFFF),
            BlurStyle::Dark => Argb(0x8000_0000),
        }
    }
}

/// Surface themes. Only `AcrylicBlur` runs the blur pipeline; the rest are flat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Acrylic,
    AcrylicBlur,
}

impl Theme {
    pub const fn uses_blur(self) -> bool {
        matches!(self, Theme::AcrylicBlur)
    }
}

/// Opaque id of a view in the host view system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewHandle(pub u64);

/// Parameters for one refresh cycle of a blurred element.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlurRequest {
    pub radius: f32,                    // >= 0; 0 means "no blur"
    pub downsample_factor: Option<u8>,  // None = radius-based policy, else 1 or 2
    pub overlay_color: Argb,            // tint composited over the blur
    pub corner_radius: Option<f32>,     // None = unset (rectangular)
    pub auto_update: bool,              // re-capture periodically while visible
}

impl Default for BlurRequest {
    fn default() -> Self {
        Self::from_style(BlurStyle::default())
    }
}

impl BlurRequest {
    /// Explicit radius with the default (Light) tint.
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            ..Self::default()
        }
    }

    /// Styled preset: fixed radius and the style's tint.
    pub fn from_style(style: BlurStyle) -> Self {
        Self {
            radius: STYLED_BLUR_RADIUS,
            downsample_factor: None,
            overlay_color: style.overlay_color(),
            corner_radius: None,
            auto_update: true,
        }
    }

    pub fn with_overlay_color(mut self, color: Argb) -> Self {
        self.overlay_color = color;
        self
    }

    pub fn with_corner_radius(mut self, radius: f32) -> Self {
        self.corner_radius = Some(radius);
        self
    }

    pub fn with_downsample_factor(mut self, factor: u8) -> Self {
        self.downsample_factor = Some(factor);
        self
    }

    pub fn with_auto_update(mut self, enabled: bool) -> Self {
        self.auto_update = enabled;
        self
    }

    /// Reject values that would otherwise be silently clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(ConfigError::InvalidRadius {
                name: "radius",
                value: self.radius,
            });
        }
        if let Some(corner) = self.corner_radius {
            if !corner.is_finite() || corner < 0.0 {
                return Err(ConfigError::InvalidRadius {
                    name: "corner_radius",
                    value: corner,
                });
            }
        }
        if let Some(factor) = self.downsample_factor {
            if factor != 1 && factor != 2 {
                return Err(ConfigError::InvalidDownsample(factor));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pixels_checks_layout() {
        assert!(PixelBuffer::from_pixels(2, 2, 2, vec![0; 4]).is_ok());
        assert!(PixelBuffer::from_pixels(2, 2, 3, vec![0; 6]).is_ok());
        assert!(matches!(
            PixelBuffer::from_pixels(3, 2, 2, vec![0; 4]),
            Err(ConfigError::InvalidBuffer { .. })
        ));
        assert!(matches!(
            PixelBuffer::from_pixels(2, 2, 2, vec![0; 5]),
            Err(ConfigError::InvalidBuffer { .. })
        ));
    }

    #[test]
    fn resize_keeps_contents_when_unchanged() {
        let mut buf = PixelBuffer::filled(4, 3, 0xFF11_2233);
        let cap = buf.capacity();
        buf.resize(4, 3);
        assert_eq!(buf.get(3, 2), Some(0xFF11_2233));
        assert_eq!(buf.capacity(), cap);

        buf.resize(2, 2);
        assert_eq!(buf.dimensions(), (2, 2));
        assert_eq!(buf.pixels().len(), 4);
        assert_eq!(buf.get(0, 0), Some(0));
        // Shrinking keeps the allocation around for the next frame.
        assert!(buf.capacity() >= cap);

        buf.release();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 0);
    }

    #[test]
    fn strided_rows_skip_padding() {
        let mut buf = PixelBuffer::with_stride(2, 2, 4);
        buf.fill(7);
        assert_eq!(buf.pixels(), &[7, 7, 0, 0, 7, 7, 0, 0]);
        assert_eq!(buf.row(1), &[7, 7]);
    }

    #[test]
    fn argb_channels_and_hex() {
        let c = Argb::from_hex("#80102030").unwrap();
        assert_eq!((c.alpha(), c.red(), c.green(), c.blue()), (0x80, 0x10, 0x20, 0x30));
        assert_eq!(Argb::from_hex("FFFFFF"), Some(Argb::WHITE));
        assert_eq!(Argb::from_hex("#123"), None);
        assert_eq!(Argb::from_channels(1, 2, 3, 4), Argb(0x0102_0304));
    }

    #[test]
    fn rgba_image_round_trip_preserves_pixels() {
        let buf = PixelBuffer::from_pixels(2, 1, 2, vec![0x80FF_0000, 0xFF00_FF00]).unwrap();
        let img = buf.to_rgba_image();
        assert_eq!(img.get_pixel(0, 0).0, [0xFF, 0, 0, 0x80]);
        assert_eq!(PixelBuffer::from_rgba_image(&img), buf);
    }

    #[test]
    fn request_validation() {
        assert!(BlurRequest::default().validate().is_ok());
        assert!(BlurRequest::new(-1.0).validate().is_err());
        assert!(BlurRequest::new(f32::NAN).validate().is_err());
        assert!(BlurRequest::new(5.0).with_corner_radius(-2.0).validate().is_err());
        assert!(matches!(
            BlurRequest::new(5.0).with_downsample_factor(3).validate(),
            Err(ConfigError::InvalidDownsample(3))
        ));
        assert_eq!(BlurRequest::from_style(BlurStyle::Dark).overlay_color, Argb(0x8000_0000));
        assert!(Theme::AcrylicBlur.uses_blur());
        assert!(!Theme::Acrylic.uses_blur());
    }
}
