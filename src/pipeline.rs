//! Icon assembly: two offscreen renders per pass, composited into an icon.
//!
//! One call to [`IconPipeline::render`] runs the icon pass and, when the
//! config asks for it, the faction mask pass. Each pass goes through the
//! same fixed sequence:
//!
//! 1. **Flatten** the subject hierarchy with every configured renderer variant
//! 2. **Resolve** materials (overrides, then substitutions for the pass)
//! 3. **Render black** at the working resolution
//! 4. **Render white** with the identical draw list and frame
//! 5. **Autocrop and recover alpha** from the pair
//! 6. **Blit** onto the canvas-sized target
//! 7. **Read back** the target into a [`FinalIcon`]
//!
//! Any backend failure aborts the call; no partial icons are returned.

use std::collections::HashMap;

use image::RgbaImage;
use log::{debug, info};

use crate::backend::{FrameSetup, RenderBackend, SoftwareRasterizer};
use crate::composite::{SCAN_STRIDE, autocrop, composite_into, fit_transform};
use crate::config::{RenderConfig, RenderSettings};
use crate::error::{IconError, Result};
use crate::flatten::Flattener;
use crate::icon::{Background, FinalIcon, IconPair};
use crate::material::{MaterialMapper, MaterialOverrideMap};
use crate::renderer::{ContributeContext, DrawList};
use crate::scene::{NodeId, PoseProvider, Scene};
use crate::store::ConfigStore;

// ============================================================================
// Subject
// ============================================================================

/// The object being rendered: a root node in a scene, keyed by name.
pub struct Subject<'a> {
    /// Key used for config lookup and the preview cache.
    pub object: &'a str,
    pub scene: &'a mut Scene,
    pub root: NodeId,
    pub poses: Option<&'a dyn PoseProvider>,
}

impl<'a> Subject<'a> {
    pub fn new(object: &'a str, scene: &'a mut Scene, root: NodeId) -> Self {
        Self {
            object,
            scene,
            root,
            poses: None,
        }
    }

    /// Attaches the pose provider used by animator renderers.
    pub fn with_poses(mut self, poses: &'a dyn PoseProvider) -> Self {
        self.poses = Some(poses);
        self
    }
}

/// Picks the explicit config, else the default, else fails.
pub fn select_config<'c>(
    object: &str,
    config: Option<&'c RenderConfig>,
    default: Option<&'c RenderConfig>,
) -> Result<&'c RenderConfig> {
    config.or(default).ok_or_else(|| IconError::ConfigurationMissing {
        object: object.to_string(),
    })
}

// ============================================================================
// IconPipeline
// ============================================================================

#[derive(Debug, Clone)]
struct PreviewEntry {
    config: RenderConfig,
    supersample: bool,
    icons: IconPair,
}

/// Renders icons for subjects, reusing backend targets between calls.
///
/// At most one render may be in flight per pipeline; every method takes
/// `&mut self`.
pub struct IconPipeline<B: RenderBackend = SoftwareRasterizer> {
    settings: RenderSettings,
    backend: B,
    flattener: Flattener,
    canvas: Option<RgbaImage>,
    canvas_allocations: usize,
    previews: HashMap<String, PreviewEntry>,
}

impl IconPipeline<SoftwareRasterizer> {
    /// Creates a pipeline on the software backend.
    pub fn new(settings: RenderSettings) -> Self {
        Self::with_backend(settings, SoftwareRasterizer::new())
    }
}

impl<B: RenderBackend> IconPipeline<B> {
    pub fn with_backend(settings: RenderSettings, backend: B) -> Self {
        Self {
            settings,
            backend,
            flattener: Flattener::new(),
            canvas: None,
            canvas_allocations: 0,
            previews: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Mutable settings. Cached previews are dropped since they may be stale.
    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        self.previews.clear();
        &mut self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn flattener(&self) -> &Flattener {
        &self.flattener
    }

    /// How many times the canvas target was (re)allocated.
    pub fn canvas_allocations(&self) -> usize {
        self.canvas_allocations
    }

    /// Renders the icon, plus the faction mask if the config includes it.
    ///
    /// `supersample` multiplies the working resolution by the config's SSAA
    /// factor. The material map is computed once and shared by both passes.
    pub fn render(
        &mut self,
        subject: &mut Subject<'_>,
        config: &RenderConfig,
        supersample: bool,
        mapper: &dyn MaterialMapper,
    ) -> Result<IconPair> {
        let canvas = config.size();
        if canvas.is_empty() {
            return Err(IconError::InvalidResolution {
                width: canvas.width,
                height: canvas.height,
            });
        }

        let overrides = mapper.material_map(&*subject.scene, subject.root);
        let icon = self.render_pass(subject, config, supersample, &overrides, false)?;
        let mask = if config.include_faction_mask() {
            Some(self.render_pass(subject, config, supersample, &overrides, true)?)
        } else {
            None
        };
        info!(
            "rendered `{}` at {}x{}{}",
            subject.object,
            canvas.width,
            canvas.height,
            if mask.is_some() { " with faction mask" } else { "" }
        );
        Ok(IconPair { icon, mask })
    }

    /// Renders with the store's config for the subject, or its default.
    pub fn render_from_store(
        &mut self,
        subject: &mut Subject<'_>,
        store: &ConfigStore,
        supersample: bool,
        mapper: &dyn MaterialMapper,
    ) -> Result<IconPair> {
        let config = store.config_for(subject.object)?;
        self.render(subject, config, supersample, mapper)
    }

    /// Like [`render`](Self::render), but reuses the previous result for the
    /// same object when the config is unchanged and not marked for update.
    pub fn render_cached(
        &mut self,
        subject: &mut Subject<'_>,
        config: &RenderConfig,
        supersample: bool,
        mapper: &dyn MaterialMapper,
    ) -> Result<IconPair> {
        if let Some(entry) = self.previews.get(subject.object)
            && !config.needs_update()
            && entry.supersample == supersample
            && entry.config == *config
        {
            debug!("preview cache hit for `{}`", subject.object);
            return Ok(entry.icons.clone());
        }

        let icons = self.render(subject, config, supersample, mapper)?;
        self.previews.insert(
            subject.object.to_string(),
            PreviewEntry {
                config: config.clone(),
                supersample,
                icons: icons.clone(),
            },
        );
        Ok(icons)
    }

    /// Number of objects with a cached preview.
    pub fn cached_previews(&self) -> usize {
        self.previews.len()
    }

    /// Drops one object's cached preview.
    pub fn drop_cached(&mut self, object: &str) {
        self.previews.remove(object);
    }

    /// Drops all cached previews and baked meshes.
    pub fn clear_cache(&mut self) {
        self.previews.clear();
        self.flattener.invalidate_bakes();
    }

    /// Releases backend targets and every cache. The pipeline stays usable.
    pub fn shutdown(&mut self) {
        self.clear_cache();
        self.backend.release();
        self.canvas = None;
        debug!("icon pipeline released its render targets");
    }

    fn render_pass(
        &mut self,
        subject: &mut Subject<'_>,
        config: &RenderConfig,
        supersample: bool,
        overrides: &MaterialOverrideMap,
        faction_mask: bool,
    ) -> Result<FinalIcon> {
        let Self {
            settings,
            backend,
            flattener,
            canvas,
            canvas_allocations,
            ..
        } = self;
        let pass = if faction_mask { "mask" } else { "icon" };

        // Flatten and resolve once so both renders draw the same list.
        let mut draws = DrawList::default();
        let mut ctx = ContributeContext {
            scene: &mut *subject.scene,
            root: subject.root,
            config,
            poses: subject.poses,
            overrides,
            substitutions: &settings.substitutions,
            faction_mask,
            flattener,
        };
        for renderer in &settings.renderers {
            renderer.contribute(&mut ctx, &mut draws);
        }
        debug!(
            "`{}` {pass} pass: {} draw calls, {} nodes skipped, {} submeshes without material",
            subject.object,
            draws.calls.len(),
            draws.diagnostics.len(),
            draws.skipped_submeshes
        );

        let frame = FrameSetup::for_pass(settings, config, Background::Black, supersample);
        let black = backend.render(&frame, &draws.calls)?;
        let white = backend.render(&frame.with_background(Background::White), &draws.calls)?;

        let bounds = autocrop(&black.image, SCAN_STRIDE);
        let fit = fit_transform(&bounds, black.width(), config.padding(), config.offset());
        debug!("`{}` {pass} pass: bounds {bounds:?}, fit {fit:?}", subject.object);

        let size = config.size();
        if canvas
            .as_ref()
            .is_some_and(|c| c.dimensions() != (size.width, size.height))
        {
            *canvas = None;
        }
        let target = canvas.get_or_insert_with(|| {
            *canvas_allocations += 1;
            RgbaImage::new(size.width, size.height)
        });
        composite_into(&black, &white, &fit, target)?;

        Ok(FinalIcon::new(target.clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================
