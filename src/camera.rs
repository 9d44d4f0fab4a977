// Opens the default camera for the demo backdrop.
// Each `next_frame()` gives an opaque ARGB buffer, ready to be blurred or shown.

use material_blur::PixelBuffer;
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution},
};

use crate::DemoError;

pub struct CameraCapture {
    cam: Camera,
    width: u32,
    height: u32,
}

impl CameraCapture {
    /// Open camera `index` near the requested resolution; the device may pick another one.
    pub fn new(index: u32, width: u32, height: u32) -> Result<Self, DemoError> {
        let fmt = CameraFormat::new(Resolution::new(width, height), FrameFormat::YUYV, 30);
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(fmt));

        let mut cam = Camera::new(CameraIndex::Index(index), req)
            .map_err(|e| DemoError::CameraInit(format!("create camera: {e}")))?;
        cam.open_stream()
            .map_err(|e| DemoError::CameraInit(format!("open stream: {e}")))?;

        let actual = cam.resolution();
        tracing::info!(width = actual.width(), height = actual.height(), "camera streaming");
        Ok(Self {
            cam,
            width: actual.width(),
            height: actual.height(),
        })
    }

    /// Block until the next frame arrives.
    pub fn next_frame(&mut self) -> Result<PixelBuffer, DemoError> {
        let frame = self
            .cam
            .frame()
            .map_err(|e| DemoError::CameraFrame(format!("fetch frame: {e}")))?;
        let rgb = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| DemoError::CameraFrame(format!("decode rgb: {e}")))?;
        Ok(PixelBuffer::from_rgb_image(&rgb))
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
