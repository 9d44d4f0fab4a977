// Picks the best available blur backend and decides how it is driven.
//
// Preference: hardware effect -> GPU snapshot effect -> CPU Stack Blur -> flat overlay.
// A missing capability is not an error, the chain just falls through.

use std::fmt::Display;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::backend::{BlurBackend, BlurPlan, Downsampled, HardwareBlurBackend};
use crate::config::BlurConfig;
use crate::host::Compositor;
use crate::types::BlurRequest;

/// What the platform can do, best first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendCapability {
    HardwareEffect,
    GpuSnapshotEffect,
    CpuStackBlur,
    StaticOverlay,
}

/// Probes the compositor once and remembers the answer; capabilities do not change at runtime.
#[derive(Debug, Default)]
pub struct CapabilityProbe {
    best: OnceLock<BackendCapability>,
}

impl CapabilityProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self, compositor: &dyn Compositor) -> BackendCapability {
        *self.best.get_or_init(|| {
            let best = if compositor.hardware_effect().is_some() {
                BackendCapability::HardwareEffect
            } else if compositor.snapshot_effect().is_some() {
                BackendCapability::GpuSnapshotEffect
            } else {
                BackendCapability::CpuStackBlur
            };
            debug!(?best, "probed blur capability");
            best
        })
    }

    pub fn cached(&self) -> Option<BackendCapability> {
        self.best.get().copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SelectorState {
    Unprobed,
    HardwareReady,
    GpuSnapshotReady,
    CpuReady,
    OverlayOnly,
}

/// Downsample factor for `radius`: full resolution up to the threshold, halved above it.
pub fn downsample_policy(radius: f32, threshold: f32) -> u8 {
    if radius <= threshold { 1 } else { 2 }
}

pub struct BlurBackendSelector {
    state: SelectorState,
    probe: Arc<CapabilityProbe>,
    compositor: Arc<dyn Compositor>,
    downsample_threshold: f32,
    hardware_radius_cap: f32,
}

impl BlurBackendSelector {
    pub fn new(probe: Arc<CapabilityProbe>, compositor: Arc<dyn Compositor>, config: &BlurConfig) -> Self {
        Self {
            state: SelectorState::Unprobed,
            probe,
            compositor,
            downsample_threshold: config.downsample_threshold,
            hardware_radius_cap: config.hardware_radius_cap,
        }
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    /// First activation probes and picks a state; later calls just rebuild the backend
    /// for the current state. `can_capture` is false when there is no accessible
    /// ancestor to take the backdrop from.
    pub fn activate(&mut self, can_capture: bool) -> BlurBackend {
        if self.state == SelectorState::Unprobed {
            let best = self.probe.probe(self.compositor.as_ref());
            self.state = if !can_capture {
                SelectorState::OverlayOnly
            } else {
                match best {
                    BackendCapability::HardwareEffect => SelectorState::HardwareReady,
                    BackendCapability::GpuSnapshotEffect => SelectorState::GpuSnapshotReady,
                    BackendCapability::CpuStackBlur => SelectorState::CpuReady,
                    BackendCapability::StaticOverlay => SelectorState::OverlayOnly,
                }
            };
            debug!(state = ?self.state, "blur backend selected");
        }
        self.build_backend()
    }

    fn build_backend(&mut self) -> BlurBackend {
        match self.state {
            SelectorState::HardwareReady => match self.compositor.hardware_effect() {
                Some(effect) => {
                    BlurBackend::Hardware(HardwareBlurBackend::new(effect, Some(self.hardware_radius_cap)))
                }
                None => self.fall_back_to_cpu("hardware effect"),
            },
            SelectorState::GpuSnapshotReady => match self.compositor.snapshot_effect() {
                Some(effect) => BlurBackend::GpuSnapshot(Downsampled::new(HardwareBlurBackend::new(effect, None))),
                None => self.fall_back_to_cpu("snapshot effect"),
            },
            SelectorState::Unprobed | SelectorState::CpuReady => BlurBackend::cpu(),
            SelectorState::OverlayOnly => BlurBackend::StaticOverlay,
        }
    }

    fn fall_back_to_cpu(&mut self, missing: &str) -> BlurBackend {
        debug!(missing, "native blur effect no longer offered, using CPU blur");
        self.state = SelectorState::CpuReady;
        BlurBackend::cpu()
    }

    /// Switch to the flat overlay after a capture failure. Returns false if already there.
    pub fn degrade(&mut self, reason: &dyn Display) -> bool {
        if self.state == SelectorState::OverlayOnly {
            return false;
        }
        warn!(from = ?self.state, %reason, "blur degraded to overlay only");
        self.state = SelectorState::OverlayOnly;
        true
    }

    /// Radius and downsample factor the active backend should run with.
    pub fn plan(&self, request: &BlurRequest) -> BlurPlan {
        match self.state {
            SelectorState::HardwareReady => BlurPlan {
                radius: request.radius.min(self.hardware_radius_cap),
                downsample_factor: 1,
            },
            _ => BlurPlan {
                radius: request.radius,
                downsample_factor: request
                    .downsample_factor
                    .unwrap_or_else(|| downsample_policy(request.radius, self.downsample_threshold)),
            },
        }
    }
}
