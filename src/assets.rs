/// Collaborator interfaces and asset-side data types.
///
/// The core does not parse archives, records or texture files itself; meshes,
/// materials and decoded textures come in through the traits below. What the
/// core does own is the fixed-size rotating model cache whose slots are
/// handed out by the scheduler's generation rule.
use std::cell::UnsafeCell;
use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::color::BlendMode;
use crate::error::AssetError;
use crate::texture::MipChain;

/// Axis-aligned bounding box in model-local space.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// True when the box encloses no volume (also covers never-extended
    /// accumulator boxes).
    pub fn is_degenerate(&self) -> bool {
        !(self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z)
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// One mesh vertex as delivered by the mesh provider.
#[derive(Debug, Clone, Copy)]
pub struct MeshVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub uv: Vec2,
    /// Vertex color, RGBA bytes.
    pub color: [u8; 4],
}

impl MeshVertex {
    /// Flat vertex with default tangent frame and white color.
    pub fn flat(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        // Any orthonormal frame works when there is no normal map.
        let tangent = normal.cross(Vec3::Y).normalize_or(Vec3::X);
        Self {
            position,
            normal,
            tangent,
            bitangent: normal.cross(tangent),
            uv,
            color: [255; 4],
        }
    }
}

/// Triangle list sharing one material binding.
#[derive(Clone)]
pub struct MeshPart {
    pub material: MaterialHandle,
    pub vertices: Vec<MeshVertex>,
    /// Triangle list, three indices per triangle.
    pub indices: Vec<u32>,
}

/// A loaded model: one or more parts, each with its material reference.
#[derive(Clone)]
pub struct ModelData {
    pub parts: Vec<MeshPart>,
    pub bounds: Aabb,
}

impl ModelData {
    /// Compute bounds from part vertices.
    pub fn from_parts(parts: Vec<MeshPart>) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for part in &parts {
            for v in &part.vertices {
                min = min.min(v.position);
                max = max.max(v.position);
            }
        }
        Self {
            parts,
            bounds: Aabb::new(min, max),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.parts.iter().map(|p| p.indices.len() / 3).sum()
    }
}

/// Opaque material reference resolved by the material provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u32);

/// Material behavior flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialFlags(pub u32);

impl MaterialFlags {
    pub const TWO_SIDED: MaterialFlags = MaterialFlags(1 << 0);
    pub const ALPHA_BLEND: MaterialFlags = MaterialFlags(1 << 1);
    pub const ALPHA_TEST: MaterialFlags = MaterialFlags(1 << 2);
    pub const WATER: MaterialFlags = MaterialFlags(1 << 3);
    pub const EFFECT: MaterialFlags = MaterialFlags(1 << 4);
    pub const DECAL: MaterialFlags = MaterialFlags(1 << 5);
    pub const GLOW: MaterialFlags = MaterialFlags(1 << 6);

    #[inline]
    pub fn contains(self, other: MaterialFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for MaterialFlags {
    type Output = MaterialFlags;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        MaterialFlags(self.0 | rhs.0)
    }
}

/// Texture slot assignments inside [`MaterialDef::textures`].
pub const SLOT_ALBEDO: usize = 0;
pub const SLOT_NORMAL: usize = 1;
pub const SLOT_SMOOTHNESS: usize = 2;
pub const SLOT_METALNESS: usize = 3;
pub const SLOT_AO: usize = 4;
pub const SLOT_EMISSIVE: usize = 5;
pub const SLOT_ENV: usize = 6;
pub const SLOT_OPACITY: usize = 7;
/// Slot table size; the material database defines up to this many paths.
pub const MAX_TEXTURE_SLOTS: usize = 20;

/// Water shading parameters.
#[derive(Debug, Clone, Copy)]
pub struct WaterParams {
    /// Per-channel absorption coefficient (1 / world unit).
    pub absorption: Vec3,
    /// Color the water column converges to at full absorption.
    pub deep_color: Vec3,
    /// Environment-reflection strength at grazing angles.
    pub reflectivity: f32,
}

impl Default for WaterParams {
    fn default() -> Self {
        Self {
            absorption: Vec3::new(0.30, 0.12, 0.08),
            deep_color: Vec3::new(0.01, 0.05, 0.06),
            reflectivity: 0.8,
        }
    }
}

/// Effect-material parameters (view-angle falloff opacity).
#[derive(Debug, Clone, Copy)]
pub struct EffectParams {
    /// Exponent of the falloff curve.
    pub falloff: f32,
    /// If set, opacity peaks facing the camera instead of at grazing angles.
    pub invert: bool,
    pub base_opacity: f32,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            falloff: 2.0,
            invert: false,
            base_opacity: 1.0,
        }
    }
}

/// Decal projection parameters.
#[derive(Debug, Clone, Copy)]
pub struct DecalParams {
    /// Sub-atlas grid; (1, 1) means the whole texture.
    pub atlas_cols: u8,
    pub atlas_rows: u8,
    /// Pick the sub-atlas cell pseudo-randomly (hashed from the placed
    /// form id, so the choice is stable across frames and threads).
    pub randomize: bool,
    /// Reject surfaces whose normal faces away from the projection
    /// direction by more than this cosine.
    pub normal_cutoff: f32,
}

impl Default for DecalParams {
    fn default() -> Self {
        Self {
            atlas_cols: 1,
            atlas_rows: 1,
            randomize: false,
            normal_cutoff: 0.0,
        }
    }
}

/// Resolved material: texture-slot paths plus numeric shading parameters.
#[derive(Clone)]
pub struct MaterialDef {
    pub flags: MaterialFlags,
    pub blend: BlendMode,
    /// Alpha-test threshold, 0 disables.
    pub alpha_threshold: u8,
    pub textures: [Option<Arc<str>>; MAX_TEXTURE_SLOTS],
    pub uv_scale: Vec2,
    pub uv_offset: Vec2,
    /// Fallback scalars for materials without smoothness/metalness maps.
    pub smoothness: f32,
    pub metalness: f32,
    pub env_strength: f32,
    pub water: WaterParams,
    pub effect: EffectParams,
    pub decal: DecalParams,
}

impl Default for MaterialDef {
    fn default() -> Self {
        Self {
            flags: MaterialFlags::default(),
            blend: crate::color::BLEND_STANDARD,
            alpha_threshold: 0,
            textures: std::array::from_fn(|_| None),
            uv_scale: Vec2::ONE,
            uv_offset: Vec2::ZERO,
            smoothness: 0.3,
            metalness: 0.0,
            env_strength: 1.0,
            water: WaterParams::default(),
            effect: EffectParams::default(),
            decal: DecalParams::default(),
        }
    }
}

/// Mesh provider collaborator (NIF-style model files live behind this).
pub trait MeshProvider: Send + Sync {
    fn load_model(&self, path: &str) -> Result<Arc<ModelData>, AssetError>;
}

/// Material database collaborator.
pub trait MaterialProvider: Send + Sync {
    fn resolve(&self, handle: MaterialHandle) -> Option<Arc<MaterialDef>>;
}

/// Texture decoder collaborator: source path + mip bias to a sampleable
/// chain. `mip_bias` asks the decoder to drop that many of its finest
/// levels before handing the chain over.
pub trait TextureDecoder: Send + Sync {
    fn decode(&self, path: &str, mip_bias: u32) -> Result<MipChain, AssetError>;
}

/// Model id meaning "no cached model" (inline terrain/water geometry).
pub const NO_MODEL: u32 = u32::MAX;

/// Mesh plus per-part resolved materials, as stored in a model-cache slot.
pub struct LoadedModel {
    pub model_id: u32,
    pub data: Arc<ModelData>,
    /// One entry per part; `None` where the material did not resolve.
    pub materials: Vec<Option<Arc<MaterialDef>>>,
}

struct ModelSlot(UnsafeCell<Option<LoadedModel>>);

/// Fixed-size rotating cache of loaded models.
///
/// A model id `m` lives in slot `m & (batch_count - 1)` and belongs to
/// generation `m >> log2(batch_count)`; when a new generation's model is
/// stored the previous occupant is simply overwritten.
///
/// Slots carry no lock. Exclusivity is scheduler-enforced: the render queue
/// never lets a load item run while any in-flight or near-head item touches
/// the same slot, and renders of a generation are finished or in flight
/// before the next generation's loads are issued. Both sides of that
/// contract are in `queue.rs` / `renderer.rs`.
pub struct ModelCache {
    slots: Box<[ModelSlot]>,
    mask: u32,
    shift: u32,
}

// Safety: concurrent access to distinct slots is data-race free by layout;
// access to the *same* slot is serialized by the scheduler's generation rule
// (a loader writes only while no renderer reads, and vice versa).
unsafe impl Sync for ModelCache {}
unsafe impl Send for ModelCache {}

impl ModelCache {
    /// `batch_count` must be a power of two.
    pub fn new(batch_count: usize) -> Self {
        assert!(batch_count.is_power_of_two() && batch_count > 0);
        let slots = (0..batch_count)
            .map(|_| ModelSlot(UnsafeCell::new(None)))
            .collect();
        Self {
            slots,
            mask: batch_count as u32 - 1,
            shift: batch_count.trailing_zeros(),
        }
    }

    #[inline]
    pub fn batch_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn slot_of(&self, model_id: u32) -> u16 {
        (model_id & self.mask) as u16
    }

    #[inline]
    pub fn generation_of(&self, model_id: u32) -> u32 {
        model_id >> self.shift
    }

    /// Store a loaded model into its slot, overwriting whatever generation
    /// held it before.
    ///
    /// # Safety
    /// Caller must hold the scheduler's exclusive claim on the slot (be the
    /// worker executing the slot's load item).
    pub unsafe fn store(&self, model: LoadedModel) {
        let slot = &self.slots[self.slot_of(model.model_id) as usize];
        *slot.0.get() = Some(model);
    }

    /// Read the slot for `model_id`; `None` when the slot is empty or holds
    /// a different generation's model.
    ///
    /// # Safety
    /// Caller must be a render worker whose item the scheduler admitted,
    /// which guarantees no concurrent store to this slot.
    pub unsafe fn get(&self, model_id: u32) -> Option<&LoadedModel> {
        let slot = &self.slots[self.slot_of(model_id) as usize];
        (*slot.0.get())
            .as_ref()
            .filter(|m| m.model_id == model_id)
    }

    /// Drop all cached models (between frames; requires unique access).
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot.0.get_mut() = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_and_generation_mapping() {
        let cache = ModelCache::new(256);
        assert_eq!(cache.slot_of(0), 0);
        assert_eq!(cache.slot_of(255), 255);
        assert_eq!(cache.slot_of(256), 0);
        assert_eq!(cache.generation_of(255), 0);
        assert_eq!(cache.generation_of(256), 1);
        assert_eq!(cache.generation_of(1024), 4);
    }

    #[test]
    fn store_get_and_generation_rotation() {
        let cache = ModelCache::new(4);
        let model = |id: u32| LoadedModel {
            model_id: id,
            data: Arc::new(ModelData::from_parts(Vec::new())),
            materials: Vec::new(),
        };
        unsafe {
            cache.store(model(1));
            assert!(cache.get(1).is_some());
            // Model 5 maps to the same slot; storing it rotates 1 out.
            cache.store(model(5));
            assert!(cache.get(1).is_none(), "rotated-out generation must miss");
            assert!(cache.get(5).is_some());
        }
    }

    #[test]
    fn degenerate_bounds_detected() {
        let empty = ModelData::from_parts(Vec::new());
        assert!(empty.bounds.is_degenerate());
        let solid = ModelData::from_parts(vec![MeshPart {
            material: MaterialHandle(0),
            vertices: vec![MeshVertex::flat(Vec3::ZERO, Vec3::Y, Vec2::ZERO)],
            indices: Vec::new(),
        }]);
        assert!(!solid.bounds.is_degenerate());
    }
}
