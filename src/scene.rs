/// Scene-side data model: render passes, object categories, the external
/// scene-graph records, and the per-frame object/base-object lists the
/// orchestrator builds from them.
use std::sync::Arc;

use glam::{Affine3A, Vec2, Vec3};

use crate::assets::{Aabb, MaterialHandle, MeshPart, MeshVertex, ModelData, NO_MODEL};
use crate::tilemask::TileMask;

/// The three per-frame passes. The pass flag also selects the Z/blend
/// policy: terrain and solid geometry claim depth, the effects pass blends
/// against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPass {
    Terrain,
    Solid,
    WaterAndEffects,
}

impl RenderPass {
    /// Does this pass draw objects of the given category?
    pub fn accepts(self, category: ObjectCategory) -> bool {
        match self {
            RenderPass::Terrain => category.contains(ObjectCategory::TERRAIN),
            RenderPass::Solid => category.contains(ObjectCategory::SOLID),
            RenderPass::WaterAndEffects => {
                category.intersects(
                    ObjectCategory::WATER | ObjectCategory::EFFECT | ObjectCategory::DECAL,
                )
            }
        }
    }
}

/// Category flags of a render object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectCategory(pub u8);

impl ObjectCategory {
    pub const TERRAIN: ObjectCategory = ObjectCategory(1 << 0);
    pub const SOLID: ObjectCategory = ObjectCategory(1 << 1);
    pub const WATER: ObjectCategory = ObjectCategory(1 << 2);
    pub const EFFECT: ObjectCategory = ObjectCategory(1 << 3);
    pub const DECAL: ObjectCategory = ObjectCategory(1 << 4);
    pub const ALPHA_BLEND: ObjectCategory = ObjectCategory(1 << 5);

    #[inline]
    pub fn contains(self, other: ObjectCategory) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: ObjectCategory) -> bool {
        self.0 & other.0 != 0
    }

    /// Draw-order-sensitive categories: the scheduler never reorders these
    /// relative to earlier queued work.
    #[inline]
    pub fn strict_order(self) -> bool {
        self.intersects(Self::WATER | Self::EFFECT | Self::DECAL)
    }
}

impl std::ops::BitOr for ObjectCategory {
    type Output = ObjectCategory;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        ObjectCategory(self.0 | rhs.0)
    }
}

/// Geometry reference of one scene record.
#[derive(Clone)]
pub enum SceneShape {
    /// Placed reference resolved through the mesh provider + model cache.
    Model { path: Arc<str>, bounds: Aabb },
    /// Pre-built mesh (terrain patches arrive this way; their generation is
    /// an external collaborator).
    Inline { mesh: Arc<ModelData> },
    /// Water cell: a square surface of the given edge length, shaded by the
    /// referenced water material.
    WaterCell { size: f32, material: MaterialHandle },
    /// Decal: no geometry of its own; the material is projected through the
    /// local box onto whatever the opaque passes already rendered.
    Decal { material: MaterialHandle, bounds: Aabb },
}

/// One typed record from the external scene-graph walker.
#[derive(Clone)]
pub struct SceneEntry {
    pub shape: SceneShape,
    pub transform: Affine3A,
    pub category: ObjectCategory,
    /// Referenced-form identity; deduplicates base objects and seeds the
    /// decal sub-atlas hash.
    pub form_id: u32,
}

/// External scene-graph walker.
pub trait SceneSource: Sync {
    fn entries(&self) -> &[SceneEntry];
}

impl SceneSource for Vec<SceneEntry> {
    fn entries(&self) -> &[SceneEntry] {
        self
    }
}

impl SceneSource for [SceneEntry] {
    fn entries(&self) -> &[SceneEntry] {
        self
    }
}

/// Where a base object's content comes from at draw time.
#[derive(Clone)]
pub enum BaseSource {
    /// Loaded through the rotating model cache.
    Model { path: Arc<str> },
    /// Carried inline (terrain patches, synthesized water quads); no cache
    /// slot involved.
    Inline { mesh: Arc<ModelData> },
    /// Projected decal; only a material, no mesh.
    Decal { material: MaterialHandle },
}

/// Deduplicated per-referenced-form descriptor. Many render objects share
/// one base object; model-cache slot assignment lives here.
#[derive(Clone)]
pub struct BaseObject {
    pub source: BaseSource,
    pub bounds: Aabb,
    /// Sequential model id, or [`NO_MODEL`] for inline/water sources.
    pub model_id: u32,
    pub generation: u32,
}

impl BaseObject {
    pub fn needs_model_load(&self) -> bool {
        self.model_id != NO_MODEL
    }
}

/// One scene instance scheduled for rendering.
#[derive(Clone)]
pub struct RenderObject {
    /// Index into the frame's base-object table.
    pub base: u32,
    pub transform: Affine3A,
    pub category: ObjectCategory,
    /// Quantized screen-space minimum depth; primary draw-order key inside
    /// a model generation.
    pub sort_key: i32,
    /// Immutable once computed.
    pub mask: TileMask,
    pub form_id: u32,
}

/// Scale used to quantize camera-space depth into the integer sort key.
pub const DEPTH_KEY_SCALE: f32 = 64.0;

/// Quantize a camera-space depth to the sort key domain.
#[inline]
pub fn depth_sort_key(depth: f32) -> i32 {
    (depth * DEPTH_KEY_SCALE).min(i32::MAX as f32) as i32
}

/// Build the synthesized mesh for a water cell: one quad in the local XZ
/// plane with UVs tiling once per world unit.
pub fn water_cell_mesh(size: f32, material: MaterialHandle) -> ModelData {
    let h = size * 0.5;
    let n = Vec3::Y;
    let vertices = vec![
        MeshVertex::flat(Vec3::new(-h, 0.0, -h), n, Vec2::new(0.0, 0.0)),
        MeshVertex::flat(Vec3::new(h, 0.0, -h), n, Vec2::new(size, 0.0)),
        MeshVertex::flat(Vec3::new(h, 0.0, h), n, Vec2::new(size, size)),
        MeshVertex::flat(Vec3::new(-h, 0.0, h), n, Vec2::new(0.0, size)),
    ];
    ModelData {
        parts: vec![MeshPart {
            material,
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
        }],
        // Give the surface a sliver of height so projected bounds are never
        // degenerate edge-on.
        bounds: Aabb::new(Vec3::new(-h, -0.05, -h), Vec3::new(h, 0.05, h)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_category_mapping() {
        assert!(RenderPass::Terrain.accepts(ObjectCategory::TERRAIN));
        assert!(!RenderPass::Terrain.accepts(ObjectCategory::SOLID));
        assert!(RenderPass::Solid.accepts(ObjectCategory::SOLID | ObjectCategory::ALPHA_BLEND));
        assert!(RenderPass::WaterAndEffects.accepts(ObjectCategory::WATER));
        assert!(RenderPass::WaterAndEffects.accepts(ObjectCategory::DECAL));
        assert!(!RenderPass::WaterAndEffects.accepts(ObjectCategory::SOLID));
    }

    #[test]
    fn strict_order_categories() {
        assert!(ObjectCategory::WATER.strict_order());
        assert!(ObjectCategory::EFFECT.strict_order());
        assert!(ObjectCategory::DECAL.strict_order());
        assert!(!ObjectCategory::SOLID.strict_order());
        assert!(!(ObjectCategory::SOLID | ObjectCategory::ALPHA_BLEND).strict_order());
    }

    #[test]
    fn depth_key_orders_by_distance() {
        assert!(depth_sort_key(1.0) < depth_sort_key(10.0));
        assert!(depth_sort_key(10.0) < depth_sort_key(10.1));
        // Saturates instead of wrapping for far geometry.
        assert!(depth_sort_key(f32::MAX) == i32::MAX);
    }

    #[test]
    fn water_mesh_is_one_quad() {
        let mesh = water_cell_mesh(128.0, MaterialHandle(7));
        assert_eq!(mesh.parts.len(), 1);
        assert_eq!(mesh.parts[0].indices.len(), 6);
        assert!(!mesh.bounds.is_degenerate());
    }
}
