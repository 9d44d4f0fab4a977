// CPU blur used whenever no native blur effect is available.
//
// Stack Blur (Mario Klingemann's moving-window approximation of a Gaussian):
// each pass keeps a running triangle-weighted sum per channel, split into the
// pixels entering ("in") and leaving ("out") the window, so the cost per pixel
// does not depend on the radius. A circular stack of `2r + 1` entries remembers
// which values leave the window, and `DivisorTable` turns the final division
// into a lookup. Edges replicate the first/last row or column.

use crate::divisor::DivisorTable;
use crate::error::{BlurError, ConfigError};
use crate::types::PixelBuffer;

/// Largest radius the kernel accepts; bigger values are clamped.
/// Keeps the divisor table at 256 * 255^2 entries at most.
pub const MAX_KERNEL_RADIUS: u32 = 254;

/// Integer radius the kernel runs with, or `None` for the identity case.
///
/// Zero, negative and NaN radii are "no blur"; anything else is rounded to the
/// nearest integer and never below 1.
pub fn effective_radius(radius: f32) -> Option<u32> {
    if radius.is_nan() || radius <= 0.0 {
        return None;
    }
    Some((radius.round() as u32).clamp(1, MAX_KERNEL_RADIUS))
}

/// One-shot blur. Allocates fresh scratch; prefer a long-lived `StackBlur` per frame loop.
pub fn stack_blur(input: &PixelBuffer, radius: f32) -> PixelBuffer {
    StackBlur::new().blur(input, radius)
}

/// Blur engine owning its scratch memory so consecutive frames do not allocate.
#[derive(Default)]
pub struct StackBlur {
    table: Option<DivisorTable>, // rebuilt only when the radius changes
    plane: Vec<[u8; 4]>,         // horizontal pass output as [r, g, b, a]
    stack: Vec<[u32; 4]>,        // circular window, 2r + 1 entries
}

impl StackBlur {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blur `input` into a new buffer with the same dimensions and stride.
    /// A radius of 0 returns an exact copy.
    pub fn blur(&mut self, input: &PixelBuffer, radius: f32) -> PixelBuffer {
        let mut output = input.clone();
        if let Some(r) = effective_radius(radius) {
            if !input.is_empty() {
                self.run(input, &mut output, r);
            }
        }
        output
    }

    /// Blur `input` into `output`, which must have the same width and height.
    pub fn blur_into(
        &mut self,
        input: &PixelBuffer,
        output: &mut PixelBuffer,
        radius: f32,
    ) -> Result<(), BlurError> {
        if input.dimensions() != output.dimensions() {
            return Err(ConfigError::DimensionMismatch {
                expected: input.dimensions(),
                actual: output.dimensions(),
            }
            .into());
        }
        check_layout(input)?;
        check_layout(output)?;

        match effective_radius(radius) {
            None => output.copy_from(input)?,
            Some(_) if input.is_empty() => {}
            Some(r) => self.run(input, output, r),
        }
        Ok(())
    }

    fn run(&mut self, input: &PixelBuffer, output: &mut PixelBuffer, radius: u32) {
        let Self {
            table,
            plane,
            stack,
        } = self;

        if table.as_ref().is_none_or(|t| t.radius() != radius) {
            *table = Some(DivisorTable::new(radius));
        }
        let Some(table) = table.as_ref() else {
            return;
        };

        let w = input.width() as usize;
        let h = input.height() as usize;
        let wm = w - 1;
        let hm = h - 1;
        let r = radius as usize;
        let div = 2 * r + 1;

        plane.resize(w * h, [0; 4]);
        stack.clear();
        stack.resize(div, [0; 4]);

        // ---- Pass 1: horizontal, input rows -> plane ----
        let src_stride = input.stride() as usize;
        let src = input.pixels();
        for y in 0..h {
            let row = &src[y * src_stride..y * src_stride + w];
            let mut acc = Accumulators::default();
            for (i, slot) in stack.iter_mut().enumerate() {
                let offset = i as isize - r as isize;
                let px = unpack(row[offset.clamp(0, wm as isize) as usize]);
                *slot = px;
                acc.prime(px, offset, r);
            }

            let mut sp = r;
            let out_row = &mut plane[y * w..(y + 1) * w];
            for (x, out) in out_row.iter_mut().enumerate() {
                *out = acc.quotients(table);
                let incoming = unpack(row[(x + r + 1).min(wm)]);
                acc.slide(stack, &mut sp, r, incoming);
            }
        }

        // ---- Pass 2: vertical, plane columns -> output ----
        let dst_stride = output.stride() as usize;
        let dst = output.pixels_mut();
        for x in 0..w {
            let mut acc = Accumulators::default();
            for (i, slot) in stack.iter_mut().enumerate() {
                let offset = i as isize - r as isize;
                let px = widen(plane[offset.clamp(0, hm as isize) as usize * w + x]);
                *slot = px;
                acc.prime(px, offset, r);
            }

            let mut sp = r;
            for y in 0..h {
                let [cr, cg, cb, ca] = acc.quotients(table);
                dst[y * dst_stride + x] =
                    ((ca as u32) << 24) | ((cr as u32) << 16) | ((cg as u32) << 8) | cb as u32;
                let incoming = widen(plane[(y + r + 1).min(hm) * w + x]);
                acc.slide(stack, &mut sp, r, incoming);
            }
        }
    }
}

/// Running sums for one row or column, per channel [r, g, b, a].
#[derive(Default)]
struct Accumulators {
    sum: [u32; 4],    // triangle-weighted window sum
    insum: [u32; 4],  // pixels right of / below the centre
    outsum: [u32; 4], // centre and pixels left of / above it
}

impl Accumulators {
    /// Add the pixel at `offset` from the first centre while filling the window.
    #[inline]
    fn prime(&mut self, px: [u32; 4], offset: isize, radius: usize) {
        let weight = (radius + 1 - offset.unsigned_abs()) as u32;
        for c in 0..4 {
            self.sum[c] += px[c] * weight;
            if offset > 0 {
                self.insum[c] += px[c];
            } else {
                self.outsum[c] += px[c];
            }
        }
    }

    #[inline]
    fn quotients(&self, table: &DivisorTable) -> [u8; 4] {
        [
            table.lookup(self.sum[0]),
            table.lookup(self.sum[1]),
            table.lookup(self.sum[2]),
            table.lookup(self.sum[3]),
        ]
    }

    /// Move the window one pixel forward, pushing `incoming` onto the stack.
    #[inline]
    fn slide(&mut self, stack: &mut [[u32; 4]], sp: &mut usize, radius: usize, incoming: [u32; 4]) {
        let div = stack.len();
        let start = (*sp + div - radius) % div;

        let leaving = stack[start];
        for c in 0..4 {
            self.sum[c] -= self.outsum[c];
            self.outsum[c] -= leaving[c];
            self.insum[c] += incoming[c];
            self.sum[c] += self.insum[c];
        }
        stack[start] = incoming;

        *sp = (*sp + 1) % div;
        let centre = stack[*sp];
        for c in 0..4 {
            self.outsum[c] += centre[c];
            self.insum[c] -= centre[c];
        }
    }
}

#[inline]
fn unpack(p: u32) -> [u32; 4] {
    [(p >> 16) & 0xFF, (p >> 8) & 0xFF, p & 0xFF, p >> 24]
}

#[inline]
fn widen(px: [u8; 4]) -> [u32; 4] {
    [px[0] as u32, px[1] as u32, px[2] as u32, px[3] as u32]
}

fn check_layout(buffer: &PixelBuffer) -> Result<(), BlurError> {
    let expected = buffer.stride() as usize * buffer.height() as usize;
    if buffer.pixels().len() != expected || buffer.stride() < buffer.width() {
        return Err(BlurError::CorruptBuffer {
            width: buffer.width(),
            height: buffer.height(),
            stride: buffer.stride(),
            len: buffer.pixels().len(),
        });
    }
    Ok(())
}
