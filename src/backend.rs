// The blur backends, as one tagged variant selected once per session.
//
// Hardware runs at full resolution with a capped radius. GpuSnapshot and
// CpuStackBlur shrink the capture first and blur at `radius / factor`.
// StaticOverlay does no blurring; the overlay compositor paints a flat tint.

use std::sync::Arc;

use crate::error::{BlurError, ConfigError};
use crate::host::NativeBlurEffect;
use crate::resample::{downsample_into, upsample_into};
use crate::selector::BackendCapability;
use crate::stack_blur::StackBlur;
use crate::types::PixelBuffer;

/// Radius and downsample factor for one refresh, computed by the selector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurPlan {
    pub radius: f32,
    pub downsample_factor: u8,
}

/// Anything that can blur a buffer into another of the same size.
pub trait BlurKernel {
    fn blur_into(&mut self, input: &PixelBuffer, output: &mut PixelBuffer, radius: f32) -> Result<(), BlurError>;
}

impl BlurKernel for StackBlur {
    fn blur_into(&mut self, input: &PixelBuffer, output: &mut PixelBuffer, radius: f32) -> Result<(), BlurError> {
        StackBlur::blur_into(self, input, output, radius)
    }
}

/// Adapter over a platform blur primitive.
pub struct HardwareBlurBackend {
    effect: Arc<dyn NativeBlurEffect>,
    radius_cap: Option<f32>,
}

impl HardwareBlurBackend {
    pub fn new(effect: Arc<dyn NativeBlurEffect>, radius_cap: Option<f32>) -> Self {
        Self { effect, radius_cap }
    }

    /// Radius handed to the platform after applying the cap.
    pub fn capped_radius(&self, radius: f32) -> f32 {
        match self.radius_cap {
            Some(cap) => radius.min(cap),
            None => radius,
        }
    }
}

impl BlurKernel for HardwareBlurBackend {
    fn blur_into(&mut self, input: &PixelBuffer, output: &mut PixelBuffer, radius: f32) -> Result<(), BlurError> {
        if input.dimensions() != output.dimensions() {
            return Err(ConfigError::DimensionMismatch {
                expected: input.dimensions(),
                actual: output.dimensions(),
            }
            .into());
        }
        let radius = self.capped_radius(radius);
        if radius <= 0.0 {
            output.copy_from(input)?;
            return Ok(());
        }
        self.effect.blur(input, output, radius)
    }
}

/// Wraps a kernel with the shrink -> blur -> stretch steps and their reused buffers.
pub struct Downsampled<K> {
    kernel: K,
    small: PixelBuffer,
    small_blurred: PixelBuffer,
}

impl<K: BlurKernel> Downsampled<K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            small: PixelBuffer::default(),
            small_blurred: PixelBuffer::default(),
        }
    }

    fn process(&mut self, input: &PixelBuffer, output: &mut PixelBuffer, plan: BlurPlan) -> Result<(), BlurError> {
        if plan.downsample_factor <= 1 {
            return self.kernel.blur_into(input, output, plan.radius);
        }
        let factor = plan.downsample_factor;
        downsample_into(input, factor, &mut self.small);
        self.small_blurred.resize(self.small.width(), self.small.height());
        self.kernel
            .blur_into(&self.small, &mut self.small_blurred, plan.radius / factor as f32)?;
        upsample_into(&self.small_blurred, output);
        Ok(())
    }

    fn release(&mut self) {
        self.small.release();
        self.small_blurred.release();
    }
}

pub enum BlurBackend {
    Hardware(HardwareBlurBackend),
    GpuSnapshot(Downsampled<HardwareBlurBackend>),
    CpuStackBlur(Downsampled<StackBlur>),
    StaticOverlay,
}

impl BlurBackend {
    pub fn cpu() -> Self {
        BlurBackend::CpuStackBlur(Downsampled::new(StackBlur::new()))
    }

    pub fn capability(&self) -> BackendCapability {
        match self {
            BlurBackend::Hardware(_) => BackendCapability::HardwareEffect,
            BlurBackend::GpuSnapshot(_) => BackendCapability::GpuSnapshotEffect,
            BlurBackend::CpuStackBlur(_) => BackendCapability::CpuStackBlur,
            BlurBackend::StaticOverlay => BackendCapability::StaticOverlay,
        }
    }

    /// Whether this backend consumes a backdrop capture.
    pub fn needs_capture(&self) -> bool {
        !matches!(self, BlurBackend::StaticOverlay)
    }

    /// Blur `input` into `output`; `output` is resized in place to the input size.
    pub fn process(&mut self, input: &PixelBuffer, output: &mut PixelBuffer, plan: BlurPlan) -> Result<(), BlurError> {
        output.resize(input.width(), input.height());
        match self {
            BlurBackend::Hardware(hw) => hw.blur_into(input, output, plan.radius),
            BlurBackend::GpuSnapshot(gpu) => gpu.process(input, output, plan),
            BlurBackend::CpuStackBlur(cpu) => cpu.process(input, output, plan),
            BlurBackend::StaticOverlay => {
                output.fill(0);
                Ok(())
            }
        }
    }

    /// Free intermediate buffers (element detached or resized to zero).
    pub fn release_buffers(&mut self) {
        match self {
            BlurBackend::GpuSnapshot(gpu) => gpu.release(),
            BlurBackend::CpuStackBlur(cpu) => cpu.release(),
            BlurBackend::Hardware(_) | BlurBackend::StaticOverlay => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    /// Records the radius it was asked for and copies input to output.
    #[derive(Default)]
    struct RecordingEffect {
        radii: Mutex<Vec<f32>>,
    }

    impl NativeBlurEffect for RecordingEffect {
        fn blur(&self, input: &PixelBuffer, output: &mut PixelBuffer, radius: f32) -> Result<(), BlurError> {
            self.radii.lock().push(radius);
            output.copy_from(input)?;
            Ok(())
        }
    }

    #[test]
    fn hardware_caps_radius() {
        let effect = Arc::new(RecordingEffect::default());
        let mut backend = BlurBackend::Hardware(HardwareBlurBackend::new(effect.clone(), Some(25.0)));
        let input = PixelBuffer::filled(8, 8, 0xFF00_00FF);
        let mut output = PixelBuffer::default();

        backend
            .process(&input, &mut output, BlurPlan { radius: 64.0, downsample_factor: 1 })
            .unwrap();
        backend
            .process(&input, &mut output, BlurPlan { radius: 12.0, downsample_factor: 1 })
            .unwrap();
        assert_eq!(*effect.radii.lock(), vec![25.0, 12.0]);
        assert_eq!(output, input);
        assert_eq!(backend.capability(), BackendCapability::HardwareEffect);
    }

    #[test]
    fn snapshot_backend_blurs_the_shrunk_capture() {
        let effect = Arc::new(RecordingEffect::default());
        let mut backend = BlurBackend::GpuSnapshot(Downsampled::new(HardwareBlurBackend::new(effect.clone(), None)));
        let input = PixelBuffer::filled(10, 6, 0xFF10_2030);
        let mut output = PixelBuffer::default();

        backend
            .process(&input, &mut output, BlurPlan { radius: 20.0, downsample_factor: 2 })
            .unwrap();
        assert_eq!(*effect.radii.lock(), vec![10.0]);
        assert_eq!(output, input);
    }

    #[test]
    fn cpu_backend_keeps_size_when_downsampling() {
        let mut backend = BlurBackend::cpu();
        let mut input = PixelBuffer::filled(11, 7, 0xFF00_0000);
        input.set(5, 3, 0xFFFF_FFFF);
        let mut output = PixelBuffer::default();

        backend
            .process(&input, &mut output, BlurPlan { radius: 12.0, downsample_factor: 2 })
            .unwrap();
        assert_eq!(output.dimensions(), (11, 7));
        assert!(output.pixels().iter().all(|&p| p >> 24 == 0xFF));
        assert!(backend.needs_capture());
    }

    #[test]
    fn static_overlay_produces_a_clear_frame() {
        let mut backend = BlurBackend::StaticOverlay;
        let input = PixelBuffer::filled(3, 3, 0xFFFF_FFFF);
        let mut output = PixelBuffer::default();
        backend
            .process(&input, &mut output, BlurPlan { radius: 5.0, downsample_factor: 1 })
            .unwrap();
        assert!(output.pixels().iter().all(|&p| p == 0));
        assert!(!backend.needs_capture());
    }
}
