/// Per-triangle shader selection and the opaque shading paths.
///
/// The shader for a draw call is resolved once per mesh part (texture
/// lookups, quality clamping), then the scan converter dispatches on the
/// closed [`SurfaceShader`] variant set once per triangle, so shading runs
/// monomorphized inside the fill loop, with no indirect call per pixel.
use std::sync::Arc;

use glam::{Vec3, Vec4};

use crate::assets::{
    MaterialDef, MaterialFlags, SLOT_ALBEDO, SLOT_AO, SLOT_EMISSIVE, SLOT_ENV, SLOT_METALNESS,
    SLOT_NORMAL, SLOT_SMOOTHNESS,
};
use crate::texcache::TextureCache;
use crate::texture::MipChain;

use super::effects::{EffectShader, WaterShader};
use super::{Fragment, RasterContext};

/// Global shading quality setting. Material flags pick the shader family;
/// quality caps how much of it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderQuality {
    /// Diffuse texture and vertex lighting only.
    Diffuse,
    /// Adds tangent-space normal mapping, no PBR terms.
    NormalMapped,
    /// Full GGX specular with environment reflection.
    Full,
}

/// Scene-wide lighting inputs.
#[derive(Clone)]
pub struct LightingParams {
    /// Unit vector from surfaces towards the light.
    pub light_dir: Vec3,
    pub light_color: Vec3,
    pub ambient: Vec3,
    /// Prefiltered environment cubemap; coarser mips hold rougher
    /// prefilters. Shared default for materials without their own.
    pub env: Option<Arc<MipChain>>,
}

impl Default for LightingParams {
    fn default() -> Self {
        Self {
            light_dir: Vec3::new(0.4, 1.0, 0.3).normalize(),
            light_color: Vec3::splat(1.0),
            ambient: Vec3::splat(0.35),
            env: None,
        }
    }
}

/// Textures of one mesh part, resolved through the cache. A missing or
/// undecodable slot resolves to `None` and the shader degrades.
pub struct ShaderInputs {
    pub material: Arc<MaterialDef>,
    pub albedo: Option<Arc<MipChain>>,
    pub normal: Option<Arc<MipChain>>,
    pub smoothness: Option<Arc<MipChain>>,
    pub metalness: Option<Arc<MipChain>>,
    pub ao: Option<Arc<MipChain>>,
    pub emissive: Option<Arc<MipChain>>,
    pub env: Option<Arc<MipChain>>,
}

impl ShaderInputs {
    /// Resolve the slots the current quality level can use. Decode failures
    /// degrade the slot (logged), never the draw call.
    pub fn resolve(
        material: Arc<MaterialDef>,
        textures: &TextureCache,
        quality: RenderQuality,
        lighting: &LightingParams,
    ) -> Self {
        let fetch = |slot: usize| -> Option<Arc<MipChain>> {
            let path = material.textures[slot].as_ref()?;
            match textures.get(path, 0) {
                Ok(chain) => Some(chain),
                Err(err) => {
                    log::warn!("texture slot {slot} ({path}) unavailable: {err}");
                    None
                }
            }
        };

        let want_normal = quality >= RenderQuality::NormalMapped;
        let want_pbr = quality >= RenderQuality::Full;
        Self {
            albedo: fetch(SLOT_ALBEDO),
            normal: if want_normal { fetch(SLOT_NORMAL) } else { None },
            smoothness: if want_pbr { fetch(SLOT_SMOOTHNESS) } else { None },
            metalness: if want_pbr { fetch(SLOT_METALNESS) } else { None },
            ao: if want_pbr { fetch(SLOT_AO) } else { None },
            emissive: if material.flags.contains(MaterialFlags::GLOW) {
                fetch(SLOT_EMISSIVE)
            } else {
                None
            },
            env: if want_pbr {
                fetch(SLOT_ENV).or_else(|| lighting.env.clone())
            } else {
                None
            },
            material,
        }
    }

    /// Base texel count of the mip-selection reference texture.
    pub fn mip_reference_texels(&self) -> f32 {
        self.albedo
            .as_ref()
            .map(|t| t.base_texel_count())
            .unwrap_or(1.0)
    }
}

/// The closed set of per-pixel shading routines. Selected once per draw
/// call from material flags and the quality setting.
pub enum SurfaceShader {
    /// Untextured fallback (missing albedo or degraded material).
    Flat { color: Vec4 },
    Diffuse(OpaqueShader),
    NormalMapped(OpaqueShader),
    Pbr(OpaqueShader),
    Water(WaterShader),
    Effect(EffectShader),
}

/// What a shader produced for one fragment.
pub enum ShadeOutput {
    /// Final packed color; the fill loop writes it as-is.
    Opaque(u32),
    /// Straight RGBA to run through the material blend mode.
    Blend(Vec4),
    /// Alpha-tested away; leave the pixel untouched.
    Skip,
}

/// Shared state of the diffuse / normal-mapped / PBR paths.
pub struct OpaqueShader {
    pub inputs: ShaderInputs,
}

impl OpaqueShader {
    #[inline]
    fn albedo_at(&self, frag: &Fragment) -> Vec4 {
        let base = match &self.inputs.albedo {
            Some(tex) => tex.sample(frag.uv.x, frag.uv.y, frag.mip),
            None => Vec4::ONE,
        };
        base * frag.color
    }

    /// Tangent-space normal perturbation; identity when no map resolved.
    #[inline]
    fn surface_normal(&self, frag: &Fragment) -> Vec3 {
        match &self.inputs.normal {
            Some(map) => {
                let s = map.sample(frag.uv.x, frag.uv.y, frag.mip);
                let t = Vec3::new(s.x * 2.0 - 1.0, s.y * 2.0 - 1.0, s.z * 2.0 - 1.0);
                (frag.tangent * t.x + frag.bitangent * t.y + frag.normal * t.z).normalize_or(frag.normal)
            }
            None => frag.normal,
        }
    }

    /// Diffuse-only path: Lambert plus ambient.
    #[inline]
    pub fn shade_diffuse(&self, frag: &Fragment, ctx: &RasterContext) -> ShadeOutput {
        let albedo = self.albedo_at(frag);
        self.finish(frag, ctx, albedo, frag.normal)
    }

    /// Diffuse plus normal map, no PBR terms.
    #[inline]
    pub fn shade_normal_mapped(&self, frag: &Fragment, ctx: &RasterContext) -> ShadeOutput {
        let albedo = self.albedo_at(frag);
        let n = self.surface_normal(frag);
        self.finish(frag, ctx, albedo, n)
    }

    /// Full PBR: GGX microfacet specular, Schlick Fresnel, prefiltered
    /// environment reflection.
    pub fn shade_pbr(&self, frag: &Fragment, ctx: &RasterContext) -> ShadeOutput {
        let albedo = self.albedo_at(frag);
        let n = self.surface_normal(frag);
        let m = &self.inputs.material;

        let channel = |tex: &Option<Arc<MipChain>>, fallback: f32| -> f32 {
            tex.as_ref()
                .map(|t| t.sample(frag.uv.x, frag.uv.y, frag.mip).x)
                .unwrap_or(fallback)
        };
        let smoothness = channel(&self.inputs.smoothness, m.smoothness);
        let metalness = channel(&self.inputs.metalness, m.metalness);
        let ao = channel(&self.inputs.ao, 1.0);
        let roughness = (1.0 - smoothness).clamp(0.04, 1.0);

        let l = ctx.lighting.light_dir;
        let v = (ctx.camera.eye() - frag.world).normalize_or(Vec3::Z);
        let h = (l + v).normalize_or(n);

        let n_dot_l = n.dot(l).max(0.0);
        let n_dot_v = n.dot(v).max(1e-4);
        let n_dot_h = n.dot(h).max(0.0);
        let v_dot_h = v.dot(h).max(0.0);

        let base = albedo.truncate();
        let f0 = Vec3::splat(0.04).lerp(base, metalness);

        // GGX normal distribution.
        let a2 = (roughness * roughness).max(1e-4);
        let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
        let d = a2 / (std::f32::consts::PI * denom * denom);

        // Schlick-GGX geometry term (k = a/2).
        let k = a2 * 0.5;
        let g = (n_dot_l / (n_dot_l * (1.0 - k) + k)) * (n_dot_v / (n_dot_v * (1.0 - k) + k));

        let fresnel = schlick_fresnel(f0, v_dot_h);
        let specular = fresnel * (d * g / (4.0 * n_dot_l.max(1e-4) * n_dot_v));

        let diffuse = base * (1.0 - metalness) * (Vec3::ONE - fresnel);
        let direct = (diffuse + specular) * ctx.lighting.light_color * n_dot_l;
        let ambient = ctx.lighting.ambient * base * ao;

        // Prefiltered environment reflection: chains store coarsest-first,
        // so rough surfaces read the low levels.
        let env = match &self.inputs.env {
            Some(env) => {
                let r = reflect(-v, n);
                let level = (1.0 - roughness) * env.max_level() as f32;
                let f = schlick_fresnel(f0, n_dot_v);
                env.sample_cube(r, level).truncate() * f * m.env_strength * ao
            }
            None => Vec3::ZERO,
        };

        let mut rgb = ambient + direct + env;
        if let Some(glow) = &self.inputs.emissive {
            rgb += glow.sample(frag.uv.x, frag.uv.y, frag.mip).truncate();
        }
        self.output(rgb.extend(albedo.w))
    }

    /// Common tail of the non-PBR paths.
    #[inline]
    fn finish(&self, frag: &Fragment, ctx: &RasterContext, albedo: Vec4, normal: Vec3) -> ShadeOutput {
        let lambert = normal.dot(ctx.lighting.light_dir).max(0.0);
        let mut rgb =
            albedo.truncate() * (ctx.lighting.ambient + ctx.lighting.light_color * lambert);
        if let Some(glow) = &self.inputs.emissive {
            rgb += glow.sample(frag.uv.x, frag.uv.y, frag.mip).truncate();
        }
        self.output(rgb.extend(albedo.w))
    }

    /// Alpha-test, then route to direct write or blending.
    #[inline]
    fn output(&self, color: Vec4) -> ShadeOutput {
        let m = &self.inputs.material;
        if m.alpha_threshold > 0 && color.w * 255.0 < m.alpha_threshold as f32 {
            return ShadeOutput::Skip;
        }
        if m.flags.contains(MaterialFlags::ALPHA_BLEND) {
            ShadeOutput::Blend(color)
        } else {
            ShadeOutput::Opaque(crate::color::pack_rgba(
                color.truncate().clamp(Vec3::ZERO, Vec3::ONE).extend(1.0),
            ))
        }
    }
}

impl SurfaceShader {
    /// Pick the shading routine for one mesh part. Water and effect flags
    /// override the opaque family; the quality setting caps the rest.
    pub fn select(inputs: ShaderInputs, quality: RenderQuality) -> Self {
        let flags = inputs.material.flags;
        if flags.contains(MaterialFlags::WATER) {
            return SurfaceShader::Water(WaterShader::new(inputs));
        }
        if flags.contains(MaterialFlags::EFFECT) {
            return SurfaceShader::Effect(EffectShader::new(inputs));
        }
        if inputs.albedo.is_none() {
            // Missing albedo: untextured degrade, keep vertex lighting.
            return SurfaceShader::Flat {
                color: Vec4::new(0.5, 0.5, 0.5, 1.0),
            };
        }
        let shader = OpaqueShader { inputs };
        match quality {
            RenderQuality::Diffuse => SurfaceShader::Diffuse(shader),
            RenderQuality::NormalMapped => SurfaceShader::NormalMapped(shader),
            RenderQuality::Full => SurfaceShader::Pbr(shader),
        }
    }

    /// Blend mode of the underlying material (standard for flat degrades).
    pub fn blend(&self) -> crate::color::BlendMode {
        match self {
            SurfaceShader::Flat { .. } => crate::color::BLEND_STANDARD,
            SurfaceShader::Diffuse(s) | SurfaceShader::NormalMapped(s) | SurfaceShader::Pbr(s) => {
                s.inputs.material.blend
            }
            SurfaceShader::Water(s) => s.inputs.material.blend,
            SurfaceShader::Effect(s) => s.inputs.material.blend,
        }
    }
}

#[inline]
pub(crate) fn schlick_fresnel(f0: Vec3, cos_theta: f32) -> Vec3 {
    let t = (1.0 - cos_theta).clamp(0.0, 1.0);
    let t5 = t * t * t * t * t;
    f0 + (Vec3::ONE - f0) * t5
}

#[inline]
pub(crate) fn reflect(incident: Vec3, normal: Vec3) -> Vec3 {
    incident - normal * (2.0 * incident.dot(normal))
}
