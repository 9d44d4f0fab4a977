// Final touches before a frame goes to the host compositor.
// Visual: the blur gets its themed tint, then the card corners are cut round.

use crate::types::{Argb, PixelBuffer};

pub struct OverlayCompositor;

impl OverlayCompositor {
    /// Tint `frame` with `overlay`, then clip it to a rounded rectangle.
    pub fn compose(frame: &mut PixelBuffer, overlay: Argb, corner_radius: Option<f32>) {
        blend_overlay(frame, overlay);
        clip_rounded(frame, corner_radius.unwrap_or(0.0));
    }

    /// The frame shown when no blur is possible: a flat tint, clipped the same way.
    pub fn fill_overlay(frame: &mut PixelBuffer, overlay: Argb, corner_radius: Option<f32>) {
        frame.fill(overlay.0);
        clip_rounded(frame, corner_radius.unwrap_or(0.0));
    }
}

/// Source-over blend of `overlay` onto every pixel (straight alpha, integer math).
pub fn blend_overlay(frame: &mut PixelBuffer, overlay: Argb) {
    let oa = overlay.alpha() as u32;
    if oa == 0 {
        return;
    }
    let inv = 255 - oa;
    let (or, og, ob) = (overlay.red() as u32, overlay.green() as u32, overlay.blue() as u32);

    for y in 0..frame.height() {
        for px in frame.row_mut(y) {
            let p = Argb(*px);
            let pa = p.alpha() as u32;
            // Resulting alpha, scaled by 255.
            let a255 = oa * 255 + pa * inv;
            if a255 == 0 {
                *px = 0;
                continue;
            }
            let mix = |oc: u32, pc: u32| (oc * oa * 255 + pc * pa * inv + a255 / 2) / a255;
            let r = mix(or, p.red() as u32);
            let g = mix(og, p.green() as u32);
            let b = mix(ob, p.blue() as u32);
            let a = (a255 + 127) / 255;
            *px = (a << 24) | (r << 16) | (g << 8) | b;
        }
    }
}

/// True when the centre of pixel (x, y) lies inside the `w x h` rectangle with corner radius `r`.
pub fn inside_rounded_rect(x: u32, y: u32, w: u32, h: u32, r: f32) -> bool {
    let r = r.min(w.min(h) as f32 / 2.0);
    if r <= 0.0 {
        return x < w && y < h;
    }
    let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
    let cx = if px < r {
        r
    } else if px > w as f32 - r {
        w as f32 - r
    } else {
        return true;
    };
    let cy = if py < r {
        r
    } else if py > h as f32 - r {
        h as f32 - r
    } else {
        return true;
    };
    let (dx, dy) = (px - cx, py - cy);
    dx * dx + dy * dy <= r * r
}

/// Make every pixel outside the rounded rectangle fully transparent.
/// Radius 0 keeps the plain rectangle.
pub fn clip_rounded(frame: &mut PixelBuffer, radius: f32) {
    if !(radius > 0.0) || frame.is_empty() {
        return;
    }
    let (w, h) = frame.dimensions();
    let band = (radius.min(w.min(h) as f32 / 2.0).ceil() as u32).min(w).min(h);

    // Only the corner squares can be outside.
    let rows = (0..band).chain(h.saturating_sub(band).max(band)..h);
    for y in rows {
        let cols = (0..band).chain(w.saturating_sub(band).max(band)..w);
        for x in cols {
            if !inside_rounded_rect(x, y, w, h, radius) {
                frame.set(x, y, 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_overlay_is_a_no_op() {
        let mut frame = PixelBuffer::filled(3, 3, 0xFF12_3456);
        let before = frame.clone();
        blend_overlay(&mut frame, Argb::TRANSPARENT);
        assert_eq!(frame, before);
    }

    #[test]
    fn dark_tint_halves_white() {
        let mut frame = PixelBuffer::filled(2, 2, 0xFFFF_FFFF);
        blend_overlay(&mut frame, Argb(0x8000_0000));
        assert_eq!(frame.get(0, 0), Some(0xFF7F_7F7F));
    }

    #[test]
    fn opaque_overlay_replaces() {
        let mut frame = PixelBuffer::filled(2, 2, 0x4011_2233);
        blend_overlay(&mut frame, Argb(0xFF00_FF00));
        assert!(frame.pixels().iter().all(|&p| p == 0xFF00_FF00));
    }

    #[test]
    fn overlay_on_transparent_keeps_overlay_colour() {
        let mut frame = PixelBuffer::filled(1, 1, 0);
        blend_overlay(&mut frame, Argb(0x40FF_FFFF));
        assert_eq!(frame.get(0, 0), Some(0x40FF_FFFF));
    }

    #[test]
    fn zero_radius_keeps_rectangle() {
        let mut frame = PixelBuffer::filled(5, 5, 0xFFFF_FFFF);
        clip_rounded(&mut frame, 0.0);
        assert!(frame.pixels().iter().all(|&p| p == 0xFFFF_FFFF));
    }

    #[test]
    fn corners_are_cleared_inside_kept() {
        let (w, h, r) = (40, 24, 8.0);
        let mut frame = PixelBuffer::filled(w, h, 0xFF80_8080);
        OverlayCompositor::compose(&mut frame, Argb::TRANSPARENT, Some(r));

        for y in 0..h {
            for x in 0..w {
                let alpha = frame.get(x, y).unwrap() >> 24;
                if inside_rounded_rect(x, y, w, h, r) {
                    assert_eq!(alpha, 0xFF, "({x},{y}) should be kept");
                } else {
                    assert_eq!(alpha, 0, "({x},{y}) should be cleared");
                }
            }
        }
        for (x, y) in [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1), (1, 1)] {
            assert_eq!(frame.get(x, y), Some(0), "corner ({x},{y})");
        }
        for (x, y) in [(8, 0), (0, 8), (w / 2, h / 2), (w - 1, 12), (20, h - 1)] {
            assert_eq!(frame.get(x, y), Some(0xFF80_8080), "edge ({x},{y})");
        }
    }

    #[test]
    fn oversized_radius_is_clamped_to_half_the_short_side() {
        let mut frame = PixelBuffer::filled(10, 4, 0xFFFF_FFFF);
        clip_rounded(&mut frame, 100.0);
        // Radius 2: left and right ends become semicircles, the middle stays.
        assert_eq!(frame.get(0, 0), Some(0));
        assert_eq!(frame.get(5, 0), Some(0xFFFF_FFFF));
        assert_eq!(frame.get(0, 2), Some(0xFFFF_FFFF));
    }

    #[test]
    fn flat_overlay_frame() {
        let mut frame = PixelBuffer::new(6, 6);
        OverlayCompositor::fill_overlay(&mut frame, Argb(0x80FF_0000), None);
        assert!(frame.pixels().iter().all(|&p| p == 0x80FF_0000));
    }
}
