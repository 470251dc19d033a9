/// Water, effect-material and decal shading.
///
/// These are the order-sensitive paths of the water/effects pass: water
/// derives transmittance from the screen-space depth delta between its
/// surface and the opaque geometry behind it, effects fade by view angle,
/// and decals project onto already-rendered surfaces through the depth and
/// packed-normal planes instead of rasterizing their own geometry.
use glam::{Vec2, Vec3, Vec4};

use crate::assets::{DecalParams, MaterialDef};
use crate::camera::ScreenRect;
use crate::color::{pack_rgba, unpack_rgba};
use crate::count_call;
use crate::perf::FRAME_COUNTERS;
use crate::tilemask::BOUNDS_PAD_PX;

use super::shader::{schlick_fresnel, reflect, ShadeOutput, ShaderInputs};
use super::{Fragment, RasterContext};

/// Far-plane stand-in for the depth delta when water has nothing behind it.
const OPEN_WATER_DEPTH: f32 = 1.0e4;

/// Screen-space depth-delta water.
pub struct WaterShader {
    pub inputs: ShaderInputs,
}

impl WaterShader {
    pub fn new(inputs: ShaderInputs) -> Self {
        Self { inputs }
    }

    /// Water reads the destination pixel directly: the color behind the
    /// surface is attenuated per-channel by the water column's absorption,
    /// then environment reflection is layered on by Fresnel weight. The
    /// result is final, no blend-mode pass follows.
    pub fn shade(
        &self,
        frag: &Fragment,
        ctx: &RasterContext,
        dst_color: u32,
        scene_depth: f32,
    ) -> ShadeOutput {
        let w = &self.inputs.material.water;

        let column = if scene_depth.is_finite() {
            (scene_depth - frag.depth).max(0.0)
        } else {
            OPEN_WATER_DEPTH
        };
        let transmit = Vec3::new(
            (-w.absorption.x * column).exp(),
            (-w.absorption.y * column).exp(),
            (-w.absorption.z * column).exp(),
        );
        let behind = unpack_rgba(dst_color).truncate();
        let body = behind * transmit + w.deep_color * (Vec3::ONE - transmit);

        let view = (ctx.camera.eye() - frag.world).normalize_or(Vec3::Y);
        let cos = view.dot(frag.normal).max(0.0);
        let fresnel = schlick_fresnel(Vec3::splat(0.02), cos).x * w.reflectivity;

        let reflection = match &self.inputs.env {
            Some(env) => {
                let r = reflect(-view, frag.normal);
                env.sample_cube(r, 0.0).truncate()
            }
            // No environment map: reflect the ambient sky term.
            None => ctx.lighting.ambient + ctx.lighting.light_color * 0.25,
        };

        let rgb = body.lerp(reflection, fresnel.clamp(0.0, 1.0));
        ShadeOutput::Opaque(pack_rgba(rgb.extend(1.0)))
    }
}

/// View-angle falloff effect material.
pub struct EffectShader {
    pub inputs: ShaderInputs,
}

impl EffectShader {
    pub fn new(inputs: ShaderInputs) -> Self {
        Self { inputs }
    }

    /// Effects are unlit; opacity follows the view-angle falloff curve and
    /// the material's blend mode (additive, soft, ...) finishes the pixel.
    pub fn shade(&self, frag: &Fragment, ctx: &RasterContext) -> ShadeOutput {
        let m = &self.inputs.material;
        let p = &m.effect;

        let base = match &self.inputs.albedo {
            Some(tex) => tex.sample(frag.uv.x, frag.uv.y, frag.mip),
            None => Vec4::ONE,
        } * frag.color;

        let view = (ctx.camera.eye() - frag.world).normalize_or(Vec3::Y);
        let facing = view.dot(frag.normal).abs().clamp(0.0, 1.0);
        let falloff = if p.invert { facing } else { 1.0 - facing };
        let alpha = base.w * p.base_opacity * falloff.powf(p.falloff.max(1e-3));

        if m.alpha_threshold > 0 && alpha * 255.0 < m.alpha_threshold as f32 {
            return ShadeOutput::Skip;
        }
        ShadeOutput::Blend(base.truncate().extend(alpha))
    }
}

/// Stable sub-atlas cell choice for a decal instance. The hash only depends
/// on the placed form id, so the pick survives re-renders and thread count
/// changes.
fn decal_atlas_cell(params: &DecalParams, form_id: u32) -> (u32, u32) {
    let cells = params.atlas_cols as u32 * params.atlas_rows as u32;
    if cells <= 1 || !params.randomize {
        return (0, 0);
    }
    // SplitMix-style integer scramble.
    let mut h = form_id.wrapping_mul(0x9E37_79B9) ^ 0x5bf0_3635;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    let pick = h % cells;
    (pick % params.atlas_cols as u32, pick / params.atlas_cols as u32)
}

/// Rasterize a decal by projecting the existing frame content into its
/// local bounding box.
///
/// For every pixel of the decal's (padded) screen rect: reconstruct the
/// world position from the depth plane, map it into the box's unit space,
/// reject pixels outside the box or on surfaces facing away from the
/// projection axis (via the packed-normal plane), then sample and blend.
pub fn draw_decal(
    ctx: &RasterContext,
    rect: &ScreenRect,
    to_local: &glam::Affine3A,
    local_size: Vec3,
    local_min: Vec3,
    project_dir: Vec3,
    inputs: &ShaderInputs,
    form_id: u32,
) -> u64 {
    let material: &MaterialDef = &inputs.material;
    let params = &material.decal;
    let albedo = match &inputs.albedo {
        Some(tex) => tex,
        None => return 0, // nothing to stamp
    };

    let (fb_w, fb_h) = (ctx.frame.width(), ctx.frame.height());
    let x0 = ((rect.min.x - BOUNDS_PAD_PX).floor().max(0.0)) as usize;
    let y0 = ((rect.min.y - BOUNDS_PAD_PX).floor().max(0.0)) as usize;
    let x1 = ((rect.max.x + BOUNDS_PAD_PX).ceil()).min(fb_w as f32 - 1.0) as usize;
    let y1 = ((rect.max.y + BOUNDS_PAD_PX).ceil()).min(fb_h as f32 - 1.0) as usize;
    if x0 > x1 || y0 > y1 {
        return 0;
    }

    // One mip level for the whole stamp, from its screen footprint.
    let screen_area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f32;
    let mip = super::mip_level_for(screen_area, albedo.base_texel_count(), albedo.max_level());

    let (cell_x, cell_y) = decal_atlas_cell(params, form_id);
    let cell_scale = Vec2::new(
        1.0 / params.atlas_cols.max(1) as f32,
        1.0 / params.atlas_rows.max(1) as f32,
    );
    let cell_base = Vec2::new(cell_x as f32, cell_y as f32) * cell_scale;

    let inv_size = Vec3::new(
        1.0 / local_size.x.max(1e-6),
        1.0 / local_size.y.max(1e-6),
        1.0 / local_size.z.max(1e-6),
    );

    let mut written = 0u64;
    for py in y0..=y1 {
        for px in x0..=x1 {
            count_call!(FRAME_COUNTERS.pixels_tested);

            // Safety: the decal's tile mask covers this rect; the queue
            // guarantees exclusive ownership of those tiles.
            let depth = match unsafe { ctx.frame.depth_at(px, py) } {
                Some(d) if d.is_finite() => d,
                _ => continue, // sky: nothing to project onto
            };

            let world = ctx
                .camera
                .position_at_depth(px as f32 + 0.5, py as f32 + 0.5, depth);
            let local = to_local.transform_point3(world);
            let t = (local - local_min) * inv_size;
            if t.x < 0.0 || t.x > 1.0 || t.y < 0.0 || t.y > 1.0 || t.z < 0.0 || t.z > 1.0 {
                continue;
            }

            // Back-facing rejection against the auxiliary normal plane.
            if let Some(normal) = unsafe { ctx.frame.normal_at(px, py) } {
                if normal.dot(-project_dir) <= params.normal_cutoff {
                    continue;
                }
            }

            let uv = cell_base + Vec2::new(t.x, 1.0 - t.y) * cell_scale;
            let sample = albedo.sample(uv.x, uv.y, mip);
            if material.alpha_threshold > 0
                && sample.w * 255.0 < material.alpha_threshold as f32
            {
                continue;
            }

            let idx = py * fb_w + px;
            unsafe {
                let dst = ctx.frame.color_at(idx);
                ctx.frame
                    .write_color(idx, material.blend.apply_packed(sample, dst));
            }
            written += 1;
            count_call!(FRAME_COUNTERS.pixels_shaded);
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atlas_cell_is_stable_and_in_range() {
        let params = DecalParams {
            atlas_cols: 4,
            atlas_rows: 2,
            randomize: true,
            normal_cutoff: 0.0,
        };
        for form_id in [0u32, 1, 7, 0xDEAD_BEEF, u32::MAX] {
            let a = decal_atlas_cell(&params, form_id);
            let b = decal_atlas_cell(&params, form_id);
            assert_eq!(a, b, "cell pick must be deterministic");
            assert!(a.0 < 4 && a.1 < 2);
        }
    }

    #[test]
    fn atlas_cell_without_randomize_is_origin() {
        let params = DecalParams {
            atlas_cols: 4,
            atlas_rows: 4,
            randomize: false,
            normal_cutoff: 0.0,
        };
        assert_eq!(decal_atlas_cell(&params, 1234), (0, 0));
    }
}
