//! Materials, per-object override maps, and the substitution table.
//!
//! Resolution of a submesh's material happens in three steps:
//!
//! ```text
//! source list[min(i, len - 1)] ──┐
//!                                ├─► base material ──► substitution table ──► drawn material
//! override map[renderable] ──────┘    (override wins)   (plain or faction mask)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use palette::Srgb;

use crate::scene::{NodeId, Scene};

// ============================================================================
// Material
// ============================================================================

/// Stable identity of a material, independent of its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// A flat-lit surface description.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    /// Diffuse albedo.
    pub base_color: Srgb<f32>,
    /// Color added regardless of lighting.
    pub emission: Srgb<f32>,
}

impl Material {
    pub fn new(id: u32, name: impl Into<String>, base_color: Srgb<f32>) -> Self {
        Self {
            id: MaterialId(id),
            name: name.into(),
            base_color,
            emission: Srgb::new(0.0, 0.0, 0.0),
        }
    }

    /// Returns a copy with the given emission color.
    pub fn with_emission(mut self, emission: Srgb<f32>) -> Self {
        self.emission = emission;
        self
    }

    /// Wraps the material in an `Arc` for sharing between renderables.
    pub fn shared(self) -> Arc<Material> {
        Arc::new(self)
    }
}

// ============================================================================
// Override map
// ============================================================================

/// Per-renderable material overrides, keyed by node identity.
///
/// Two renderables sharing one mesh can map to different materials.
pub type MaterialOverrideMap = HashMap<NodeId, Arc<Material>>;

/// Supplies override maps for a top-level object, e.g. faction-colored variants.
pub trait MaterialMapper {
    fn material_map(&self, scene: &Scene, root: NodeId) -> MaterialOverrideMap;
}

/// A mapper that never overrides anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverrides;

impl MaterialMapper for NoOverrides {
    fn material_map(&self, _scene: &Scene, _root: NodeId) -> MaterialOverrideMap {
        MaterialOverrideMap::new()
    }
}

/// A mapper that overrides every renderable under the root with one material.
#[derive(Debug, Clone)]
pub struct UniformOverride(pub Arc<Material>);

impl MaterialMapper for UniformOverride {
    fn material_map(&self, scene: &Scene, root: NodeId) -> MaterialOverrideMap {
        scene
            .descendants(root)
            .filter(|&id| scene.node(id).is_some_and(|n| n.component.is_some()))
            .map(|id| (id, Arc::clone(&self.0)))
            .collect()
    }
}

// ============================================================================
// Substitution table
// ============================================================================

/// One row of the substitution table.
#[derive(Debug, Clone)]
pub struct MaterialSubstitution {
    pub source: MaterialId,
    pub replacement: Arc<Material>,
    pub faction_mask: Arc<Material>,
}

/// Ordered source to replacement mapping. First match wins.
#[derive(Debug, Clone, Default)]
pub struct MaterialSubstitutionTable {
    entries: Vec<MaterialSubstitution>,
}

impl MaterialSubstitutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row. Earlier rows for the same source keep priority.
    pub fn with_entry(
        mut self,
        source: &Material,
        replacement: Arc<Material>,
        faction_mask: Arc<Material>,
    ) -> Self {
        self.push(source, replacement, faction_mask);
        self
    }

    pub fn push(&mut self, source: &Material, replacement: Arc<Material>, faction_mask: Arc<Material>) {
        self.entries.push(MaterialSubstitution {
            source: source.id,
            replacement,
            faction_mask,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the first row for a source material.
    pub fn lookup(&self, source: MaterialId) -> Option<&MaterialSubstitution> {
        self.entries.iter().find(|e| e.source == source)
    }

    /// Material to draw in place of `base`.
    ///
    /// Unmapped materials come back unchanged for both passes, so they
    /// appear literally in the faction mask.
    pub fn substitute(&self, base: &Arc<Material>, faction_mask: bool) -> Arc<Material> {
        match self.lookup(base.id) {
            Some(row) if faction_mask => Arc::clone(&row.faction_mask),
            Some(row) => Arc::clone(&row.replacement),
            None => Arc::clone(base),
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves the drawn material of every submesh of one renderable.
///
/// Returns one entry per submesh (at least one). `None` means the submesh
/// has no base material and must not be drawn.
pub fn resolve(
    renderable: NodeId,
    source_materials: &[Option<Arc<Material>>],
    submesh_count: usize,
    overrides: &MaterialOverrideMap,
    table: &MaterialSubstitutionTable,
    faction_mask: bool,
) -> Vec<Option<Arc<Material>>> {
    let override_material = overrides.get(&renderable);
    (0..submesh_count.max(1))
        .map(|i| {
            let base = match override_material {
                Some(m) => Some(m),
                None => source_materials
                    .get(i.min(source_materials.len().saturating_sub(1)))
                    .and_then(Option::as_ref),
            }?;
            Some(table.substitute(base, faction_mask))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
