// Tuning knobs for the blur pipeline, passed to `MaterialBlur` at construction.

use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{Argb, BlurRequest, BlurStyle, STYLED_BLUR_RADIUS};

/// Default pause between two automatic re-captures.
pub const DEFAULT_AUTO_UPDATE_DELAY_MS: i64 = 20;

/// Default settle time after a content change before capturing.
pub const DEFAULT_PROCESSING_DELAY_MS: i64 = 10;

/// At or below this radius the capture is blurred at full resolution.
pub const DEFAULT_DOWNSAMPLE_THRESHOLD: f32 = 10.0;

/// Native effects stop looking like a blur above this radius.
pub const DEFAULT_HARDWARE_RADIUS_CAP: f32 = 25.0;

/// Capture cadence: how often to re-capture and how long to wait for content to settle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CaptureTiming {
    auto_update_delay: Duration,
    processing_delay: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            auto_update_delay: Duration::from_millis(DEFAULT_AUTO_UPDATE_DELAY_MS as u64),
            processing_delay: Duration::from_millis(DEFAULT_PROCESSING_DELAY_MS as u64),
        }
    }
}

impl CaptureTiming {
    /// Both delays in milliseconds; negative values are rejected.
    pub fn from_millis(auto_update_ms: i64, processing_ms: i64) -> Result<Self, ConfigError> {
        Ok(Self {
            auto_update_delay: non_negative("auto-update delay", auto_update_ms)?,
            processing_delay: non_negative("processing delay", processing_ms)?,
        })
    }

    pub fn auto_update_delay(&self) -> Duration {
        self.auto_update_delay
    }

    pub fn processing_delay(&self) -> Duration {
        self.processing_delay
    }
}

fn non_negative(name: &'static str, value_ms: i64) -> Result<Duration, ConfigError> {
    if value_ms < 0 {
        return Err(ConfigError::NegativeDelay { name, value_ms });
    }
    Ok(Duration::from_millis(value_ms as u64))
}

/// Process-wide defaults for every blur session created by one `MaterialBlur`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlurConfig {
    pub radius: f32,
    pub style: BlurStyle,
    pub overlay_color: Option<Argb>, // None = the style's preset
    pub corner_radius: Option<f32>,  // None = unset
    pub downsample_factor: Option<u8>,
    pub downsample_threshold: f32,
    pub hardware_radius_cap: f32,
    pub timing: CaptureTiming,
    /// Ask the host to leave the blurred element itself out of the backdrop snapshot.
    /// Cleaner result, but some hosts cannot debug with it on.
    pub exclude_element_from_capture: bool,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            radius: STYLED_BLUR_RADIUS,
            style: BlurStyle::Light,
            overlay_color: None,
            corner_radius: None,
            downsample_factor: None,
            downsample_threshold: DEFAULT_DOWNSAMPLE_THRESHOLD,
            hardware_radius_cap: DEFAULT_HARDWARE_RADIUS_CAP,
            timing: CaptureTiming::default(),
            exclude_element_from_capture: false,
        }
    }
}

impl BlurConfig {
    pub fn with_style(mut self, style: BlurStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_timing(mut self, timing: CaptureTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Set the auto-update delay; negative values are rejected.
    pub fn with_auto_update_delay_ms(mut self, ms: i64) -> Result<Self, ConfigError> {
        let processing = self.timing.processing_delay.as_millis() as i64;
        self.timing = CaptureTiming::from_millis(ms, processing)?;
        Ok(self)
    }

    /// Set the processing delay; negative values are rejected.
    pub fn with_processing_delay_ms(mut self, ms: i64) -> Result<Self, ConfigError> {
        let auto_update = self.timing.auto_update_delay.as_millis() as i64;
        self.timing = CaptureTiming::from_millis(auto_update, ms)?;
        Ok(self)
    }

    /// The request a session starts from when the caller has no explicit values.
    pub fn default_request(&self) -> BlurRequest {
        BlurRequest {
            radius: self.radius,
            downsample_factor: self.downsample_factor,
            overlay_color: self.overlay_color.unwrap_or(self.style.overlay_color()),
            corner_radius: self.corner_radius,
            auto_update: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_request().validate()?;
        for (name, value) in [
            ("downsample_threshold", self.downsample_threshold),
            ("hardware_radius_cap", self.hardware_radius_cap),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidRadius { name, value });
            }
        }
        Ok(())
    }
}
