//! Per-icon render configuration and the pipeline-wide render settings.
//!
//! A [`RenderConfig`] is serialized to camelCase JSON so it can live in a
//! configuration store next to the generated icons:
//!
//! ```json
//! {
//!   "position": [0.0, 0.0, 0.0],
//!   "rotation": [0.0, 45.0, 0.0],
//!   "scale": [1.0, 1.0, 1.0],
//!   "light1": { "color": { "red": 1.0, "green": 1.0, "blue": 1.0 }, "intensity": 1.5, "rotation": [10.0, 95.0, 30.0] },
//!   "light2": { "color": { "red": 1.0, "green": 1.0, "blue": 1.0 }, "intensity": 1.5, "rotation": [30.0, -13.0, 30.0] },
//!   "padding": 0.1,
//!   "offset": [0.0, 0.0],
//!   "size": { "width": 256, "height": 256 },
//!   "pose": { "clipIndex": 0, "frameIndex": 12 },
//!   "ssaa": 2,
//!   "includeFactionMask": true
//! }
//! ```

use palette::Srgb;
use serde::{Deserialize, Deserializer, Serialize};

use crate::icon::SizePx;
use crate::material::MaterialSubstitutionTable;
use crate::math::{Mat4, Vec2, Vec3, euler_degrees, trs};
use crate::renderer::IconRenderer;

// ============================================================================
// Light settings
// ============================================================================

/// One directional light of the icon rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightSettings {
    pub color: Srgb<f32>,
    pub intensity: f32,
    /// Orientation as Euler angles in degrees.
    pub rotation: Vec3,
}

impl LightSettings {
    pub fn new(color: Srgb<f32>, intensity: f32, rotation: Vec3) -> Self {
        Self {
            color,
            intensity,
            rotation,
        }
    }

    /// Direction the light travels in, as a unit vector.
    pub fn direction(&self) -> Vec3 {
        (euler_degrees(&self.rotation) * Vec3::z()).normalize()
    }
}

// ============================================================================
// Pose selector
// ============================================================================

/// Animation clip and frame to sample before flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseSelector {
    pub clip_index: i32,
    pub frame_index: i32,
}

impl PoseSelector {
    pub fn new(clip_index: i32, frame_index: i32) -> Self {
        Self {
            clip_index,
            frame_index,
        }
    }
}

// ============================================================================
// RenderConfig
// ============================================================================

/// Immutable-per-call parameters for rendering one icon.
///
/// Setters mark the config as needing an update so cached renders made
/// with the previous values are not reused. The flag is not serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    position: Vec3,
    rotation: Vec3,
    scale: Vec3,
    light1: LightSettings,
    light2: LightSettings,
    #[serde(deserialize_with = "non_negative")]
    padding: f32,
    offset: Vec2,
    size: SizePx,
    #[serde(skip_serializing_if = "Option::is_none")]
    pose: Option<PoseSelector>,
    #[serde(deserialize_with = "at_least_one")]
    ssaa: u32,
    include_faction_mask: bool,
    #[serde(skip)]
    needs_update: bool,
}

// Deserialization applies the same clamps as the setters.
fn non_negative<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let value = f32::deserialize(deserializer)?;
    Ok(if value.is_nan() { 0.0 } else { value.max(0.0) })
}

fn at_least_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(u32::deserialize(deserializer)?.max(1))
}

impl Default for RenderConfig {
    fn default() -> Self {
        let white = Srgb::new(1.0, 1.0, 1.0);
        Self {
            position: Vec3::zeros(),
            rotation: Vec3::zeros(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            light1: LightSettings::new(white, 1.5, Vec3::new(10.0, 95.0, 30.0)),
            light2: LightSettings::new(white, 1.5, Vec3::new(30.0, -13.0, 30.0)),
            padding: 0.0,
            offset: Vec2::zeros(),
            size: SizePx::new(256, 256),
            pose: None,
            ssaa: 1,
            include_faction_mask: true,
            needs_update: true,
        }
    }
}

/// Equality ignores the dirty flag.
impl PartialEq for RenderConfig {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.rotation == other.rotation
            && self.scale == other.scale
            && self.light1 == other.light1
            && self.light2 == other.light2
            && self.padding == other.padding
            && self.offset == other.offset
            && self.size == other.size
            && self.pose == other.pose
            && self.ssaa == other.ssaa
            && self.include_faction_mask == other.include_faction_mask
    }
}

impl RenderConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Euler rotation in degrees.
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn light1(&self) -> &LightSettings {
        &self.light1
    }

    pub fn light2(&self) -> &LightSettings {
        &self.light2
    }

    /// Padding as a fraction of the subject size.
    pub fn padding(&self) -> f32 {
        self.padding
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    /// Output canvas size.
    pub fn size(&self) -> SizePx {
        self.size
    }

    pub fn pose(&self) -> Option<PoseSelector> {
        self.pose
    }

    /// Supersampling factor, never below 1.
    pub fn ssaa(&self) -> u32 {
        self.ssaa.max(1)
    }

    pub fn include_faction_mask(&self) -> bool {
        self.include_faction_mask
    }

    /// Returns true if cached renders of this config must not be reused.
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Marks the config as dirty.
    pub fn mark_dirty(&mut self) {
        self.needs_update = true;
    }

    /// Clears the dirty flag after the owner has refreshed its renders.
    pub fn mark_updated(&mut self) {
        self.needs_update = false;
    }

    /// Placement matrix applied on top of the root-relative transform.
    pub fn placement(&self) -> Mat4 {
        trs(&self.position, &euler_degrees(&self.rotation), &self.scale)
    }

    pub fn set_placement(&mut self, position: Vec3, rotation: Vec3, scale: Vec3) {
        self.position = position;
        self.rotation = rotation;
        self.scale = scale;
        self.mark_dirty();
    }

    pub fn set_lights(&mut self, light1: LightSettings, light2: LightSettings) {
        self.light1 = light1;
        self.light2 = light2;
        self.mark_dirty();
    }

    /// Sets the padding fraction, clamped to be non-negative.
    pub fn set_padding(&mut self, padding: f32) {
        self.padding = padding.max(0.0);
        self.mark_dirty();
    }

    pub fn set_offset(&mut self, offset: Vec2) {
        self.offset = offset;
        self.mark_dirty();
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = SizePx::new(width, height);
        self.mark_dirty();
    }

    pub fn set_pose(&mut self, pose: Option<PoseSelector>) {
        self.pose = pose;
        self.mark_dirty();
    }

    /// Sets the supersampling factor, clamped to at least 1.
    pub fn set_ssaa(&mut self, ssaa: u32) {
        self.ssaa = ssaa.max(1);
        self.mark_dirty();
    }

    pub fn set_include_faction_mask(&mut self, include: bool) {
        self.include_faction_mask = include;
        self.mark_dirty();
    }

    /// Serializes the config to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the config to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a config from JSON. The result is marked dirty.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_str(json)?;
        config.needs_update = true;
        Ok(config)
    }
}

// ============================================================================
// RenderSettings
// ============================================================================

/// Default vertical field of view in degrees.
pub const DEFAULT_FOV: f32 = 30.0;

/// Default side length of the square working buffer before supersampling.
pub const DEFAULT_BASE_RESOLUTION: u32 = 1024;

/// Constant ambient contribution standing in for bounced light.
pub const DEFAULT_AMBIENT_BOUNCE: f32 = 0.1;

/// Pipeline-wide settings, passed explicitly into every render call.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Vertical camera field of view in degrees.
    pub fov: f32,
    /// Side length of the square working buffer at SSAA 1.
    pub base_resolution: u32,
    /// Ambient light level added to every lit pixel.
    pub ambient_bounce: f32,
    /// Renderer variants, run in order.
    pub renderers: Vec<IconRenderer>,
    /// Source to replacement material table.
    pub substitutions: MaterialSubstitutionTable,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            fov: DEFAULT_FOV,
            base_resolution: DEFAULT_BASE_RESOLUTION,
            ambient_bounce: DEFAULT_AMBIENT_BOUNCE,
            renderers: vec![IconRenderer::animator(Vec::new())],
            substitutions: MaterialSubstitutionTable::default(),
        }
    }
}

impl RenderSettings {
    /// Working resolution for a pass.
    pub fn working_resolution(&self, config: &RenderConfig, supersample: bool) -> u32 {
        let factor = if supersample { config.ssaa() } else { 1 };
        self.base_resolution.saturating_mul(factor)
    }
}

// ============================================================================
// Tests
// ============================================================================
