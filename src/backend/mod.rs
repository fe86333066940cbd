//! Offscreen rendering backends.
//!
//! The pipeline drives a backend through [`RenderBackend`]: one
//! [`FrameSetup`] (camera, two directional lights, clear color, square
//! resolution) plus the pass's draw calls in, one [`RawRenderBuffer`] out.
//! Backends may keep render targets alive between calls and must free them
//! in [`RenderBackend::release`].

pub mod software;

pub use software::SoftwareRasterizer;

use palette::Srgb;

use crate::config::{RenderConfig, RenderSettings};
use crate::error::Result;
use crate::icon::{Background, RawRenderBuffer};
use crate::math::{Mat4, Point3, Vec3};
use crate::renderer::DrawCall;

/// Perspective camera looking at a fixed target.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// World position of the eye.
    pub position: Vec3,
    /// World point the camera looks at.
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Near clip distance.
    pub near: f32,
    /// Far clip distance.
    pub far: f32,
}

impl Camera {
    /// The icon rig camera: ten units back, one up, looking at the origin.
    pub fn icon_rig(fov: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 1.0, -10.0),
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov,
            near: 0.3,
            far: 1000.0,
        }
    }

    /// World to clip space for a target of the given aspect ratio.
    ///
    /// Scenes are authored Y-up and left-handed: world +X is on screen right
    /// when looking down +Z. The right-handed view is mirrored in X to match.
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let view = Mat4::look_at_rh(&Point3::from(self.position), &Point3::from(self.target), &self.up);
        let projection = Mat4::new_perspective(aspect, self.fov.to_radians(), self.near, self.far);
        let mirror_x = Mat4::new_nonuniform_scaling(&Vec3::new(-1.0, 1.0, 1.0));
        mirror_x * projection * view
    }
}

/// A light with parallel rays.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in.
    pub direction: Vec3,
    pub color: Srgb<f32>,
    /// Multiplier applied to `color`.
    pub intensity: f32,
}

/// Fixed state of one offscreen render.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSetup {
    /// Side length of the square target.
    pub resolution: u32,
    /// Color the target is cleared to before drawing.
    pub background: Background,
    /// Camera shared by every draw of the frame.
    pub camera: Camera,
    /// Key and fill lights, in config order.
    pub lights: [DirectionalLight; 2],
    /// Constant ambient term standing in for bounced light.
    pub ambient: f32,
}

impl FrameSetup {
    /// Builds the frame for one pass from the settings and a config.
    pub fn for_pass(settings: &RenderSettings, config: &RenderConfig, background: Background, supersample: bool) -> Self {
        let light = |l: &crate::config::LightSettings| DirectionalLight {
            direction: l.direction(),
            color: l.color,
            intensity: l.intensity,
        };
        Self {
            resolution: settings.working_resolution(config, supersample),
            background,
            camera: Camera::icon_rig(settings.fov),
            lights: [light(config.light1()), light(config.light2())],
            ambient: settings.ambient_bounce,
        }
    }

    /// The same frame cleared to a different background.
    pub fn with_background(&self, background: Background) -> Self {
        Self {
            background,
            ..self.clone()
        }
    }
}

/// Renders draw calls into an offscreen buffer.
pub trait RenderBackend {
    /// Renders one frame. The returned buffer is owned by the caller.
    fn render(&mut self, frame: &FrameSetup, draws: &[DrawCall]) -> Result<RawRenderBuffer>;

    /// Frees any render targets held between calls.
    fn release(&mut self);
}
