//! prefab-icon-renderer: offscreen icon generation for 3D prefabs
//!
//! This crate turns a hierarchy of meshes into a square RGBA icon. The
//! subject is rendered twice, over black and over white, and the pair is
//! composited into a transparent image that is cropped and padded around
//! the subject. An optional second pass renders the faction mask with
//! substituted materials.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use palette::Srgb;
//! use prefab_icon_renderer::{
//!     Component, IconPipeline, Material, Mesh, MeshRenderer, NoOverrides,
//!     RenderConfig, RenderSettings, Scene, Subject, Transform, Vec3,
//! };
//!
//! let mut scene = Scene::new();
//! let root = scene.add_root("crate", Transform::identity());
//! let body = scene.add_child(root, "body", Transform::identity());
//! let mesh = Arc::new(Mesh::cuboid("body", Vec3::new(0.5, 0.5, 0.5)));
//! let wood = Material::new(1, "wood", Srgb::new(0.7, 0.45, 0.2)).shared();
//! scene.set_component(body, Component::Mesh(MeshRenderer::new(mesh, vec![Some(wood)])));
//!
//! // A small working buffer keeps the software backend quick.
//! let settings = RenderSettings { base_resolution: 64, ..RenderSettings::default() };
//! let mut pipeline = IconPipeline::new(settings);
//!
//! let mut config = RenderConfig::default();
//! config.set_size(32, 32);
//! config.set_padding(0.1);
//!
//! let mut subject = Subject::new("crate", &mut scene, root);
//! let icons = pipeline.render(&mut subject, &config, false, &NoOverrides).unwrap();
//! assert_eq!(icons.icon.data.dimensions(), (32, 32));
//! assert!(icons.mask.is_some());
//! ```
//!
//! # Configuration
//!
//! Per-object settings live in a [`ConfigStore`] and serialize to JSON:
//!
//! ```
//! use prefab_icon_renderer::{ConfigStore, IconEntry, RenderConfig};
//!
//! let mut store = ConfigStore::new("Icons")
//!     .with_config("default", RenderConfig::default())
//!     .with_default_config("default");
//! store.add_entry(IconEntry::new("Barracks"));
//!
//! let json = store.to_json().unwrap();
//! let restored = ConfigStore::from_json(&json).unwrap();
//! assert!(restored.config_for("Barracks").is_ok());
//! ```

mod backend;
mod composite;
mod config;
mod error;
mod flatten;
mod icon;
mod material;
mod math;
mod pipeline;
mod renderer;
mod scene;
mod store;

pub use backend::{Camera, DirectionalLight, FrameSetup, RenderBackend, SoftwareRasterizer};
pub use composite::{
    FitTransform, autocrop, composite, composite_into, fit_transform, recover_pixel, sample_bilinear,
    scan_foreground,
};
pub use config::{
    DEFAULT_AMBIENT_BOUNCE, DEFAULT_BASE_RESOLUTION, DEFAULT_FOV, LightSettings, PoseSelector, RenderConfig,
    RenderSettings,
};
pub use error::{IconError, Result};
pub use flatten::{Flattened, Flattener, GeometryKind, NodeDiagnostic, RenderableNode, SkipReason};
pub use icon::{Background, BoundingBox, FinalIcon, IconPair, RawRenderBuffer, SizePx};
pub use material::{
    Material, MaterialId, MaterialMapper, MaterialOverrideMap, MaterialSubstitution, MaterialSubstitutionTable,
    NoOverrides, UniformOverride, resolve,
};
pub use math::{Mat4, Quat, Transform, Vec2, Vec3};
pub use pipeline::{IconPipeline, Subject, select_config};
pub use renderer::{ContributeContext, DrawCall, DrawList, IconRenderer};
pub use scene::animation::{DEFAULT_FRAME_RATE, apply_pose, clamp_clip_index, sample_time};
pub use scene::{
    AnimationClip, Animator, BakeError, BoneWeight, ClipInfo, Component, Keyframe, Mesh, MeshRenderer, Node,
    NodeId, PoseProvider, Scene, SkinnedMesh, SkinnedMeshRenderer, Track, Vertex,
};
pub use store::{ConfigStore, IconEntry};
