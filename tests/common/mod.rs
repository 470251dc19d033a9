/// Shared fixtures for the pipeline tests: in-memory mesh/material
/// providers, a procedural texture decoder, and a small world with every
/// object category in it.
use std::collections::HashMap;
use std::sync::Arc;

use glam::{Affine3A, Quat, Vec2, Vec3};
use noise::{NoiseFn, Perlin};

use worldraster::assets::{
    DecalParams, MaterialDef, MaterialFlags, MaterialHandle, MeshPart, MeshVertex, ModelData,
    WaterParams, SLOT_ALBEDO, SLOT_NORMAL,
};
use worldraster::color::{BLEND_ADDITIVE, BLEND_STANDARD};
use worldraster::scene::{ObjectCategory, SceneEntry, SceneShape};
use worldraster::texture::{AddressMode, MipChain, MipLevel};
use worldraster::{Aabb, AssetError, Camera, MaterialProvider, MeshProvider, TextureDecoder};

pub const GRASS: MaterialHandle = MaterialHandle(1);
pub const ROCK: MaterialHandle = MaterialHandle(2);
pub const WATER: MaterialHandle = MaterialHandle(3);
pub const GLOW: MaterialHandle = MaterialHandle(4);
pub const SPLAT: MaterialHandle = MaterialHandle(5);
pub const BROKEN_TEX: MaterialHandle = MaterialHandle(6);

pub struct FakeMeshes {
    pub models: HashMap<String, Arc<ModelData>>,
}

impl MeshProvider for FakeMeshes {
    fn load_model(&self, path: &str) -> Result<Arc<ModelData>, AssetError> {
        if path.ends_with("poison.nif") {
            panic!("mesh parser choked on {path}");
        }
        self.models
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::ModelNotFound(path.to_string()))
    }
}

pub struct FakeMaterials {
    pub map: HashMap<u32, Arc<MaterialDef>>,
}

impl MaterialProvider for FakeMaterials {
    fn resolve(&self, handle: MaterialHandle) -> Option<Arc<MaterialDef>> {
        self.map.get(&handle.0).cloned()
    }
}

/// Path-seeded procedural decoder: each texture gets a deterministic
/// four-level chain (1x1 up to 8x8), coarsest-first.
pub struct ProcDecoder;

impl TextureDecoder for ProcDecoder {
    fn decode(&self, path: &str, _mip_bias: u32) -> Result<MipChain, AssetError> {
        if path.contains("missing") {
            return Err(AssetError::TextureDecode {
                path: path.into(),
                reason: "not in archive".into(),
            });
        }
        let seed = path.bytes().fold(0u32, |h, b| {
            h.wrapping_mul(31).wrapping_add(b as u32)
        });
        let levels = (0..4u32)
            .map(|level| {
                let size = 1u32 << level;
                let texels = (0..size * size)
                    .map(|i| {
                        let v = seed.wrapping_mul(0x9E3779B9).wrapping_add(i * 37 + level * 101);
                        0xFF000000 | (v & 0x00FF_FFFF)
                    })
                    .collect();
                MipLevel {
                    width: size,
                    height: size,
                    texels,
                }
            })
            .collect();
        Ok(MipChain::new(levels, AddressMode::Wrap, AddressMode::Wrap))
    }
}

fn material(flags: MaterialFlags, textures: &[(usize, &str)]) -> Arc<MaterialDef> {
    let mut def = MaterialDef {
        flags,
        ..MaterialDef::default()
    };
    for &(slot, path) in textures {
        def.textures[slot] = Some(Arc::from(path));
    }
    Arc::new(def)
}

pub fn test_materials() -> Arc<FakeMaterials> {
    let mut map: HashMap<u32, Arc<MaterialDef>> = HashMap::new();
    map.insert(
        GRASS.0,
        material(MaterialFlags::default(), &[(SLOT_ALBEDO, "land/grass.dds")]),
    );
    map.insert(
        ROCK.0,
        material(
            MaterialFlags::default(),
            &[(SLOT_ALBEDO, "rocks/granite.dds"), (SLOT_NORMAL, "rocks/granite_n.dds")],
        ),
    );
    let mut water = MaterialDef {
        flags: MaterialFlags::WATER | MaterialFlags::TWO_SIDED,
        water: WaterParams::default(),
        ..MaterialDef::default()
    };
    water.blend = BLEND_STANDARD;
    map.insert(WATER.0, Arc::new(water));
    let mut glow = MaterialDef {
        flags: MaterialFlags::EFFECT | MaterialFlags::ALPHA_BLEND | MaterialFlags::TWO_SIDED,
        ..MaterialDef::default()
    };
    glow.blend = BLEND_ADDITIVE;
    glow.textures[SLOT_ALBEDO] = Some(Arc::from("fx/glow.dds"));
    map.insert(GLOW.0, Arc::new(glow));
    let mut splat = MaterialDef {
        flags: MaterialFlags::DECAL,
        decal: DecalParams {
            atlas_cols: 2,
            atlas_rows: 2,
            randomize: true,
            normal_cutoff: 0.0,
        },
        ..MaterialDef::default()
    };
    splat.textures[SLOT_ALBEDO] = Some(Arc::from("decals/splat.dds"));
    map.insert(SPLAT.0, Arc::new(splat));
    map.insert(
        BROKEN_TEX.0,
        material(MaterialFlags::default(), &[(SLOT_ALBEDO, "missing/void.dds")]),
    );
    Arc::new(FakeMaterials { map })
}

/// Axis-aligned unit cube centered at the origin, one part per material.
pub fn cube_model(mat: MaterialHandle) -> Arc<ModelData> {
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::Z, Vec3::NEG_X),
        (Vec3::Z, Vec3::Y, Vec3::NEG_X),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, up, right) in faces {
        let base = vertices.len() as u32;
        let center = normal * 0.5;
        for (du, dv, u, v) in [
            (-0.5, -0.5, 0.0, 1.0),
            (0.5, -0.5, 1.0, 1.0),
            (0.5, 0.5, 1.0, 0.0),
            (-0.5, 0.5, 0.0, 0.0),
        ] {
            vertices.push(MeshVertex::flat(
                center + right * du + up * dv,
                normal,
                Vec2::new(u, v),
            ));
        }
        // Outward-facing winding.
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    Arc::new(ModelData::from_parts(vec![MeshPart {
        material: mat,
        vertices,
        indices,
    }]))
}

/// Terrain patch from a Perlin heightfield, `n x n` quads over `extent`
/// world units.
pub fn terrain_model(mat: MaterialHandle, n: usize, extent: f32, seed: u32) -> Arc<ModelData> {
    let perlin = Perlin::new(seed);
    let verts_per_side = n + 1;
    let step = extent / n as f32;
    let mut vertices = Vec::with_capacity(verts_per_side * verts_per_side);
    for gz in 0..verts_per_side {
        for gx in 0..verts_per_side {
            let x = gx as f32 * step;
            let z = gz as f32 * step;
            let h = perlin.get([x as f64 * 0.11, z as f64 * 0.11]) as f32 * 2.5;
            vertices.push(MeshVertex::flat(
                Vec3::new(x, h, z),
                Vec3::Y,
                Vec2::new(x * 0.25, z * 0.25),
            ));
        }
    }
    // Rebuild normals from the heightfield so lighting varies.
    for gz in 0..verts_per_side {
        for gx in 0..verts_per_side {
            let at = |x: usize, z: usize| vertices[z * verts_per_side + x].position.y;
            let xm = at(gx.saturating_sub(1), gz);
            let xp = at((gx + 1).min(n), gz);
            let zm = at(gx, gz.saturating_sub(1));
            let zp = at(gx, (gz + 1).min(n));
            let v = &mut vertices[gz * verts_per_side + gx];
            let normal = Vec3::new(xm - xp, 2.0 * step, zm - zp).normalize();
            *v = MeshVertex::flat(v.position, normal, v.uv);
        }
    }
    let mut indices = Vec::with_capacity(n * n * 6);
    for gz in 0..n {
        for gx in 0..n {
            let a = (gz * verts_per_side + gx) as u32;
            let b = a + 1;
            let c = a + verts_per_side as u32;
            let d = c + 1;
            indices.extend_from_slice(&[a, c, b, b, c, d]);
        }
    }
    Arc::new(ModelData::from_parts(vec![MeshPart {
        material: mat,
        vertices,
        indices,
    }]))
}

/// Single vertical quad for effect billboards.
pub fn quad_model(mat: MaterialHandle, size: f32) -> Arc<ModelData> {
    let h = size * 0.5;
    let n = Vec3::Z;
    let vertices = vec![
        MeshVertex::flat(Vec3::new(-h, -h, 0.0), n, Vec2::new(0.0, 1.0)),
        MeshVertex::flat(Vec3::new(h, -h, 0.0), n, Vec2::new(1.0, 1.0)),
        MeshVertex::flat(Vec3::new(h, h, 0.0), n, Vec2::new(1.0, 0.0)),
        MeshVertex::flat(Vec3::new(-h, h, 0.0), n, Vec2::new(0.0, 0.0)),
    ];
    Arc::new(ModelData::from_parts(vec![MeshPart {
        material: mat,
        vertices,
        indices: vec![0, 1, 2, 0, 2, 3],
    }]))
}

pub fn test_meshes() -> Arc<FakeMeshes> {
    let mut models = HashMap::new();
    models.insert("models/cube.nif".to_string(), cube_model(GRASS));
    models.insert("models/rock.nif".to_string(), cube_model(ROCK));
    models.insert("models/brokentex.nif".to_string(), cube_model(BROKEN_TEX));
    Arc::new(FakeMeshes { models })
}

pub fn test_camera(width: usize, height: usize) -> Camera {
    Camera::perspective(
        Vec3::new(20.0, 14.0, 26.0),
        Vec3::new(8.0, 0.0, 8.0),
        Vec3::Y,
        60f32.to_radians(),
        0.25,
        400.0,
        width,
        height,
    )
}

fn place(x: f32, y: f32, z: f32, scale: f32, yaw: f32) -> Affine3A {
    Affine3A::from_scale_rotation_translation(
        Vec3::splat(scale),
        Quat::from_rotation_y(yaw),
        Vec3::new(x, y, z),
    )
}

/// A scene with every category: a terrain patch, a ring of cubes, one rock,
/// a water cell, a glow billboard and a splat decal on the ground.
pub fn test_scene() -> Vec<SceneEntry> {
    let mut scene = Vec::new();
    scene.push(SceneEntry {
        shape: SceneShape::Inline {
            mesh: terrain_model(GRASS, 16, 16.0, 7),
        },
        transform: Affine3A::IDENTITY,
        category: ObjectCategory::TERRAIN,
        form_id: 0x0001_0000,
    });

    let cube_bounds = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
    for i in 0..6u32 {
        let angle = i as f32 * std::f32::consts::TAU / 6.0;
        let (x, z) = (8.0 + angle.cos() * 5.0, 8.0 + angle.sin() * 5.0);
        scene.push(SceneEntry {
            shape: SceneShape::Model {
                path: Arc::from("models/cube.nif"),
                bounds: cube_bounds,
            },
            transform: place(x, 1.0, z, 1.6, angle),
            category: ObjectCategory::SOLID,
            form_id: 0x0002_0000 + i,
        });
    }
    scene.push(SceneEntry {
        shape: SceneShape::Model {
            path: Arc::from("models/rock.nif"),
            bounds: cube_bounds,
        },
        transform: place(8.0, 1.2, 8.0, 2.2, 0.4),
        category: ObjectCategory::SOLID,
        form_id: 0x0003_0000,
    });

    scene.push(SceneEntry {
        shape: SceneShape::WaterCell {
            size: 10.0,
            material: WATER,
        },
        transform: place(4.0, 0.6, 4.0, 1.0, 0.0),
        category: ObjectCategory::WATER,
        form_id: 0x0004_0000,
    });
    scene.push(SceneEntry {
        shape: SceneShape::Inline {
            mesh: quad_model(GLOW, 3.0),
        },
        transform: place(11.0, 2.0, 11.0, 1.0, 0.8),
        category: ObjectCategory::EFFECT | ObjectCategory::ALPHA_BLEND,
        form_id: 0x0005_0000,
    });
    // Ground splat: rotate the projection box so its local +Z points down
    // at the terrain.
    scene.push(SceneEntry {
        shape: SceneShape::Decal {
            material: SPLAT,
            bounds: Aabb::new(Vec3::new(-2.0, -2.0, -2.0), Vec3::new(2.0, 2.0, 2.0)),
        },
        transform: Affine3A::from_rotation_translation(
            Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
            Vec3::new(10.0, 0.5, 6.0),
        ),
        category: ObjectCategory::DECAL,
        form_id: 0x0006_0000,
    });
    scene
}
