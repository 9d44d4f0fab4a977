// Downsampling before the blur and upsampling after it.
// Visual: a halved capture blurs four times faster; the result is slightly softer.

use crate::types::PixelBuffer;

/// Dimensions of a `width x height` buffer scaled down by `factor` (never 0 for a non-empty input).
pub fn scaled_dimensions(width: u32, height: u32, factor: u8) -> (u32, u32) {
    let f = factor.max(1) as u32;
    (width.div_ceil(f), height.div_ceil(f))
}

/// Shrink `src` by `factor` into `dst`, averaging each `factor x factor` block.
/// `dst` is resized in place to the scaled dimensions.
pub fn downsample_into(src: &PixelBuffer, factor: u8, dst: &mut PixelBuffer) {
    let (dw, dh) = scaled_dimensions(src.width(), src.height(), factor);
    dst.resize(dw, dh);
    if src.is_empty() {
        return;
    }

    let f = factor.max(1) as u32;
    let (wm, hm) = (src.width() - 1, src.height() - 1);
    for dy in 0..dh {
        for dx in 0..dw {
            let mut acc = [0u32; 4];
            for oy in 0..f {
                for ox in 0..f {
                    // Blocks hanging over the edge reuse the last row/column.
                    let p = src.row((dy * f + oy).min(hm))[(dx * f + ox).min(wm) as usize];
                    acc[0] += p >> 24;
                    acc[1] += (p >> 16) & 0xFF;
                    acc[2] += (p >> 8) & 0xFF;
                    acc[3] += p & 0xFF;
                }
            }
            let n = f * f;
            let half = n / 2;
            let [a, r, g, b] = acc.map(|c| (c + half) / n);
            dst.set(dx, dy, (a << 24) | (r << 16) | (g << 8) | b);
        }
    }
}

/// Stretch `src` to fill `dst` (dimensions of `dst` are kept) with nearest-neighbour sampling.
pub fn upsample_into(src: &PixelBuffer, dst: &mut PixelBuffer) {
    if src.is_empty() || dst.is_empty() {
        return;
    }
    let (sw, sh) = src.dimensions();
    let (dw, dh) = dst.dimensions();
    for y in 0..dh {
        let sy = ((y as u64 * sh as u64) / dh as u64) as u32;
        let src_row = src.row(sy);
        let dst_row = dst.row_mut(y);
        for (x, out) in dst_row.iter_mut().enumerate() {
            let sx = (x as u64 * sw as u64) / dw as u64;
            *out = src_row[sx as usize];
        }
    }
}
