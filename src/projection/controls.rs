//! Live projection controls
//!
//! Values are written from any thread (UI, network, scripting) and read by
//! the render thread once per frame. Floats are stored as their bit
//! patterns in atomics; a frame sees each value either before or after a
//! concurrent write, never a torn one.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use super::mapping::{clamp_fov_degrees, clamp_size_percentage};
use super::target::{clamp_resolution, MAX_RESOLUTION};
use super::ViewSelection;

/// Default dome field of view in degrees
pub const DEFAULT_FOV_DEGREES: f32 = 210.0;

/// Default fisheye size percentage
pub const DEFAULT_SIZE_PERCENTAGE: f32 = 100.0;

#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

#[derive(Debug)]
struct ControlState {
    pitch: AtomicF32,
    yaw: AtomicF32,
    roll: AtomicF32,
    fov: AtomicF32,
    size: AtomicF32,
    view: AtomicU8,
    /// Requested cube resolution, 0 when none is pending
    pending_resolution: AtomicU32,
    /// Largest resolution the device supports
    max_resolution: AtomicU32,
}

/// Thread-safe handle to the projection controls. Clones share state.
#[derive(Debug, Clone)]
pub struct ProjectionControls {
    state: Arc<ControlState>,
}

/// Control values read at one frame boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSnapshot {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub fov_degrees: f32,
    pub size_percentage: f32,
    pub view: ViewSelection,
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        Self {
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            fov_degrees: DEFAULT_FOV_DEGREES,
            size_percentage: DEFAULT_SIZE_PERCENTAGE,
            view: ViewSelection::default(),
        }
    }
}

impl Default for ProjectionControls {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectionControls {
    pub fn new() -> Self {
        Self::from_snapshot(&ControlSnapshot::default())
    }

    pub fn from_snapshot(snapshot: &ControlSnapshot) -> Self {
        let controls = Self {
            state: Arc::new(ControlState {
                pitch: AtomicF32::new(0.0),
                yaw: AtomicF32::new(0.0),
                roll: AtomicF32::new(0.0),
                fov: AtomicF32::new(DEFAULT_FOV_DEGREES),
                size: AtomicF32::new(DEFAULT_SIZE_PERCENTAGE),
                view: AtomicU8::new(ViewSelection::default().to_index()),
                pending_resolution: AtomicU32::new(0),
                max_resolution: AtomicU32::new(MAX_RESOLUTION),
            }),
        };
        controls.set_pitch(snapshot.pitch);
        controls.set_yaw(snapshot.yaw);
        controls.set_roll(snapshot.roll);
        controls.set_fov(snapshot.fov_degrees);
        controls.set_size_percentage(snapshot.size_percentage);
        controls.set_view(snapshot.view);
        controls
    }

    // ─── Orientation (radians) ───────────────────────────────────────

    pub fn set_pitch(&self, radians: f32) {
        if radians.is_finite() {
            self.state.pitch.store(radians);
        }
    }

    pub fn set_yaw(&self, radians: f32) {
        if radians.is_finite() {
            self.state.yaw.store(radians);
        }
    }

    pub fn set_roll(&self, radians: f32) {
        if radians.is_finite() {
            self.state.roll.store(radians);
        }
    }

    pub fn pitch(&self) -> f32 {
        self.state.pitch.load()
    }

    pub fn yaw(&self) -> f32 {
        self.state.yaw.load()
    }

    pub fn roll(&self) -> f32 {
        self.state.roll.load()
    }

    // ─── Fisheye ─────────────────────────────────────────────────────

    /// Set the fisheye field of view, clamped to [0, 360] degrees.
    pub fn set_fov(&self, degrees: f32) {
        if !degrees.is_nan() {
            self.state.fov.store(clamp_fov_degrees(degrees));
        }
    }

    pub fn fov(&self) -> f32 {
        self.state.fov.load()
    }

    /// Set the fisheye size percentage, clamped to [0, 100].
    pub fn set_size_percentage(&self, percentage: f32) {
        if !percentage.is_nan() {
            self.state.size.store(clamp_size_percentage(percentage));
        }
    }

    pub fn size_percentage(&self) -> f32 {
        self.state.size.load()
    }

    // ─── View and resolution ─────────────────────────────────────────

    pub fn set_view(&self, view: ViewSelection) {
        self.state.view.store(view.to_index(), Ordering::Release);
    }

    pub fn view(&self) -> ViewSelection {
        ViewSelection::from_index(self.state.view.load(Ordering::Acquire))
    }

    /// Request a new cube resolution, applied at the next frame boundary.
    ///
    /// The value is clamped to [`ProjectionControls::max_resolution`]. Later
    /// requests replace earlier ones not yet applied.
    pub fn request_resize(&self, resolution: u32) {
        self.state
            .pending_resolution
            .store(clamp_resolution(resolution, self.max_resolution()), Ordering::Release);
    }

    /// Largest cube resolution the rendering device accepts.
    pub fn max_resolution(&self) -> u32 {
        self.state.max_resolution.load(Ordering::Acquire)
    }

    pub(crate) fn set_max_resolution(&self, resolution: u32) {
        self.state.max_resolution.store(resolution, Ordering::Release);
    }

    /// Take the pending resolution, if any.
    pub fn take_pending_resize(&self) -> Option<u32> {
        match self.state.pending_resolution.swap(0, Ordering::AcqRel) {
            0 => None,
            resolution => Some(resolution),
        }
    }

    /// Read every value once for the coming frame.
    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            pitch: self.pitch(),
            yaw: self.yaw(),
            roll: self.roll(),
            fov_degrees: self.fov(),
            size_percentage: self.size_percentage(),
            view: self.view(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let controls = ProjectionControls::new();
        let snapshot = controls.snapshot();
        assert_eq!(snapshot, ControlSnapshot::default());
        assert_eq!(controls.take_pending_resize(), None);
    }

    #[test]
    fn test_resize_request_respects_the_device_limit() {
        let controls = ProjectionControls::new();
        assert_eq!(controls.max_resolution(), MAX_RESOLUTION);

        controls.set_max_resolution(4096);
        controls.request_resize(8192);
        assert_eq!(controls.take_pending_resize(), Some(4096));
        controls.request_resize(2048);
        assert_eq!(controls.take_pending_resize(), Some(2048));
        assert_eq!(controls.clone().max_resolution(), 4096);
    }

    #[test]
    fn test_setters_clamp_and_ignore_nan() {
        let controls = ProjectionControls::new();
        controls.set_fov(400.0);
        assert_eq!(controls.fov(), 360.0);
        controls.set_fov(f32::NAN);
        assert_eq!(controls.fov(), 360.0);

        controls.set_size_percentage(-5.0);
        assert_eq!(controls.size_percentage(), 0.0);

        controls.set_pitch(0.5);
        controls.set_pitch(f32::INFINITY);
        assert_eq!(controls.pitch(), 0.5);
    }

    #[test]
    fn test_resize_request_is_taken_once() {
        let controls = ProjectionControls::new();
        controls.request_resize(2048);
        controls.request_resize(513);
        assert_eq!(controls.take_pending_resize(), Some(512));
        assert_eq!(controls.take_pending_resize(), None);
    }

    #[test]
    fn test_clones_share_state_across_threads() {
        let controls = ProjectionControls::new();
        let writer = controls.clone();
        std::thread::spawn(move || {
            writer.set_yaw(1.25);
            writer.set_view(ViewSelection::Standard);
        })
        .join()
        .unwrap();

        assert_eq!(controls.yaw(), 1.25);
        assert_eq!(controls.view(), ViewSelection::Standard);
    }
}
