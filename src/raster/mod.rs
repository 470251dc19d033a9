/// Software triangle rasterization and per-pixel shading.
///
/// Per draw call the mesh part's vertices are transformed once into clip
/// space, triangles are depth-sorted (front-to-back for opaque geometry,
/// back-to-front for blended), then scan-converted with incremental
/// double-precision edge functions: barycentric weights come from two adds
/// per pixel, never a division. Triangles crossing the near plane are
/// clipped with attribute interpolation; triangles below a small screen-area
/// threshold degrade to line drawing so thin geometry does not vanish.
pub mod effects;
pub mod shader;

use std::sync::Arc;

use glam::{Affine3A, Mat3, Vec2, Vec3, Vec4};

use crate::assets::{MaterialDef, MaterialFlags, MeshPart};
use crate::camera::{Camera, NEAR_W_EPS};
use crate::count_call;
use crate::framebuffer::FrameView;
use crate::perf::FRAME_COUNTERS;
use crate::scene::RenderPass;
use crate::texcache::TextureCache;

pub use shader::{LightingParams, RenderQuality, ShaderInputs, SurfaceShader};

use shader::ShadeOutput;

/// Triangles with less screen area than this (px^2) are drawn as lines.
pub const THIN_TRIANGLE_AREA: f64 = 0.18;

/// Snap distance for the fractional mip level: within 1/16 of an integer
/// level the exact level is used, suppressing shimmer from trilinear drift.
pub const MIP_SNAP: f32 = 1.0 / 16.0;

/// Shared, read-only state a worker needs to rasterize one object.
pub struct RasterContext<'a> {
    pub frame: FrameView,
    pub camera: &'a Camera,
    pub textures: &'a TextureCache,
    pub lighting: &'a LightingParams,
    pub quality: RenderQuality,
    pub pass: RenderPass,
    /// Write packed normals for the decal pass (opaque passes only).
    pub write_normals: bool,
}

/// Interpolated per-pixel attributes handed to the shaders.
pub struct Fragment {
    pub world: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub uv: Vec2,
    /// Vertex color, RGBA in [0, 1].
    pub color: Vec4,
    /// Mip level selected for the triangle this fragment belongs to.
    pub mip: f32,
    /// Camera-space depth.
    pub depth: f32,
    pub px: usize,
    pub py: usize,
}

/// Per-vertex state after the one-time transform of a draw call.
#[derive(Clone, Copy)]
struct ClipVertex {
    clip: Vec4,
    world: Vec3,
    normal: Vec3,
    tangent: Vec3,
    bitangent: Vec3,
    uv: Vec2,
    color: Vec4,
}

impl ClipVertex {
    /// Linear interpolation in clip space (exact for near-plane clipping).
    fn lerp(&self, other: &ClipVertex, t: f32) -> ClipVertex {
        ClipVertex {
            clip: self.clip.lerp(other.clip, t),
            world: self.world.lerp(other.world, t),
            normal: self.normal.lerp(other.normal, t),
            tangent: self.tangent.lerp(other.tangent, t),
            bitangent: self.bitangent.lerp(other.bitangent, t),
            uv: self.uv.lerp(other.uv, t),
            color: self.color.lerp(other.color, t),
        }
    }
}

/// Screen-space vertex with perspective-premultiplied attributes.
#[derive(Clone, Copy)]
struct ProjVertex {
    pos: Vec2,
    inv_w: f32,
    uv_w: Vec2,
    normal_w: Vec3,
    tangent_w: Vec3,
    bitangent_w: Vec3,
    color_w: Vec4,
    world_w: Vec3,
}

impl ProjVertex {
    fn from_clip(v: &ClipVertex, camera: &Camera) -> ProjVertex {
        let inv_w = 1.0 / v.clip.w;
        let ndc = Vec2::new(v.clip.x, v.clip.y) * inv_w;
        ProjVertex {
            pos: camera.ndc_to_screen(ndc),
            inv_w,
            uv_w: v.uv * inv_w,
            normal_w: v.normal * inv_w,
            tangent_w: v.tangent * inv_w,
            bitangent_w: v.bitangent * inv_w,
            color_w: v.color * inv_w,
            world_w: v.world * inv_w,
        }
    }
}

/// How fragments interact with the depth plane.
#[derive(Clone, Copy, PartialEq, Eq)]
enum DepthMode {
    /// Strictly-closer test, and the depth plane is claimed on a shaded hit.
    Claim,
    /// Test only: blended fragments match against opaque depth but never
    /// own it.
    Match,
}

/// Compute the per-triangle mip level from the ratio of screen-space pixel
/// area to UV-space area in base-level texels, as a base-4 logarithm: a
/// triangle covering `4^k` pixels per base texel selects level `k` (mip
/// chains store coarsest-first, so level `k` has `4^k` times the base
/// texel count, one texel per pixel at the selected level). Near-integer
/// levels snap within [`MIP_SNAP`].
pub fn mip_level_for(screen_area: f32, base_texel_area: f32, max_level: usize) -> f32 {
    if screen_area <= 0.0 || base_texel_area <= 0.0 {
        return max_level as f32;
    }
    let mut level = 0.5 * (screen_area / base_texel_area).log2();
    let nearest = level.round();
    if (level - nearest).abs() <= MIP_SNAP {
        level = nearest;
    }
    level.clamp(0.0, max_level as f32)
}

/// Per-worker rasterizer. Scratch buffers persist across draw calls so the
/// hot path stays allocation-free.
pub struct Rasterizer {
    clip_verts: Vec<ClipVertex>,
    tri_order: Vec<(f32, u32)>,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer {
    pub fn new() -> Self {
        Self {
            clip_verts: Vec::new(),
            tri_order: Vec::new(),
        }
    }

    /// Draw every part of a model. `materials` runs parallel to
    /// `parts`; unresolved entries degrade to the flat shader.
    pub fn draw_model(
        &mut self,
        ctx: &RasterContext,
        transform: &Affine3A,
        parts: &[MeshPart],
        materials: &[Option<Arc<MaterialDef>>],
    ) {
        for (part, material) in parts.iter().zip(materials) {
            self.draw_part(ctx, transform, part, material.clone());
        }
    }

    fn draw_part(
        &mut self,
        ctx: &RasterContext,
        transform: &Affine3A,
        part: &MeshPart,
        material: Option<Arc<MaterialDef>>,
    ) {
        if part.indices.len() < 3 || part.vertices.is_empty() {
            return;
        }

        let material = material.unwrap_or_else(|| Arc::new(MaterialDef::default()));
        let inputs = ShaderInputs::resolve(material.clone(), ctx.textures, ctx.quality, ctx.lighting);
        let mip_ref_texels = inputs.mip_reference_texels();
        let shader = SurfaceShader::select(inputs, ctx.quality);
        let blend = shader.blend();
        let two_sided = material.flags.contains(MaterialFlags::TWO_SIDED)
            || material.flags.contains(MaterialFlags::WATER);
        let blended = material.flags.contains(MaterialFlags::ALPHA_BLEND)
            || ctx.pass == RenderPass::WaterAndEffects;
        let depth_mode = if blended { DepthMode::Match } else { DepthMode::Claim };

        // Transform every vertex once per draw call.
        let normal_mat = Mat3::from(transform.matrix3).inverse().transpose();
        self.clip_verts.clear();
        self.clip_verts.reserve(part.vertices.len());
        for v in &part.vertices {
            let world = transform.transform_point3(v.position);
            self.clip_verts.push(ClipVertex {
                clip: *ctx.camera.view_proj() * world.extend(1.0),
                world,
                normal: (normal_mat * v.normal).normalize_or_zero(),
                tangent: transform.transform_vector3(v.tangent).normalize_or_zero(),
                bitangent: transform.transform_vector3(v.bitangent).normalize_or_zero(),
                uv: v.uv * material.uv_scale + material.uv_offset,
                color: Vec4::new(
                    v.color[0] as f32,
                    v.color[1] as f32,
                    v.color[2] as f32,
                    v.color[3] as f32,
                ) / 255.0,
            });
        }

        // Depth-sort the draw call's triangles: front-to-back for opaque
        // geometry (early Z rejection), back-to-front for blended.
        self.tri_order.clear();
        for (tri, idx) in part.indices.chunks_exact(3).enumerate() {
            let key = self.clip_verts[idx[0] as usize]
                .clip
                .w
                .min(self.clip_verts[idx[1] as usize].clip.w)
                .min(self.clip_verts[idx[2] as usize].clip.w);
            self.tri_order.push((key, tri as u32));
        }
        if blended {
            self.tri_order
                .sort_unstable_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        } else {
            self.tri_order
                .sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        }

        let tri_order = std::mem::take(&mut self.tri_order);
        for &(_, tri) in &tri_order {
            let base = tri as usize * 3;
            let v0 = self.clip_verts[part.indices[base] as usize];
            let v1 = self.clip_verts[part.indices[base + 1] as usize];
            let v2 = self.clip_verts[part.indices[base + 2] as usize];
            self.raster_triangle(
                ctx,
                [v0, v1, v2],
                &shader,
                blend,
                depth_mode,
                two_sided,
                mip_ref_texels,
            );
        }
        self.tri_order = tri_order;
    }

    #[allow(clippy::too_many_arguments)]
    fn raster_triangle(
        &mut self,
        ctx: &RasterContext,
        tri: [ClipVertex; 3],
        shader: &SurfaceShader,
        blend: crate::color::BlendMode,
        depth_mode: DepthMode,
        two_sided: bool,
        mip_ref_texels: f32,
    ) {
        count_call!(FRAME_COUNTERS.triangles_submitted);

        let behind = tri.iter().filter(|v| v.clip.w < NEAR_W_EPS).count();
        if behind == 3 {
            return; // not visible, by definition not an error
        }

        if behind == 0 {
            self.raster_projected(ctx, &tri, shader, blend, depth_mode, two_sided, mip_ref_texels);
            return;
        }

        // Clip against w = NEAR_W_EPS, then fan the resulting polygon.
        let mut poly = [tri[0]; 4];
        let mut n = 0usize;
        for i in 0..3 {
            let a = &tri[i];
            let b = &tri[(i + 1) % 3];
            let a_in = a.clip.w >= NEAR_W_EPS;
            let b_in = b.clip.w >= NEAR_W_EPS;
            if a_in {
                poly[n] = *a;
                n += 1;
            }
            if a_in != b_in {
                let t = (NEAR_W_EPS - a.clip.w) / (b.clip.w - a.clip.w);
                poly[n] = a.lerp(b, t);
                n += 1;
            }
        }
        for i in 1..n.saturating_sub(1) {
            self.raster_projected(
                ctx,
                &[poly[0], poly[i], poly[i + 1]],
                shader,
                blend,
                depth_mode,
                two_sided,
                mip_ref_texels,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn raster_projected(
        &mut self,
        ctx: &RasterContext,
        tri: &[ClipVertex; 3],
        shader: &SurfaceShader,
        blend: crate::color::BlendMode,
        depth_mode: DepthMode,
        two_sided: bool,
        mip_ref_texels: f32,
    ) {
        let mut v = [
            ProjVertex::from_clip(&tri[0], ctx.camera),
            ProjVertex::from_clip(&tri[1], ctx.camera),
            ProjVertex::from_clip(&tri[2], ctx.camera),
        ];

        // Early bounding-box rejection against the viewport.
        let (fb_w, fb_h) = (ctx.frame.width(), ctx.frame.height());
        let min_x = v[0].pos.x.min(v[1].pos.x).min(v[2].pos.x);
        let max_x = v[0].pos.x.max(v[1].pos.x).max(v[2].pos.x);
        let min_y = v[0].pos.y.min(v[1].pos.y).min(v[2].pos.y);
        let max_y = v[0].pos.y.max(v[1].pos.y).max(v[2].pos.y);
        if max_x < 0.0 || max_y < 0.0 || min_x >= fb_w as f32 || min_y >= fb_h as f32 {
            return;
        }

        let area2 = edge_function(v[0].pos, v[1].pos, v[2].pos);
        if area2.abs() < THIN_TRIANGLE_AREA * 2.0 {
            // Degrade to a line between the two most separated vertices.
            count_call!(FRAME_COUNTERS.triangles_as_lines);
            let d01 = v[0].pos.distance_squared(v[1].pos);
            let d02 = v[0].pos.distance_squared(v[2].pos);
            let d12 = v[1].pos.distance_squared(v[2].pos);
            let (a, b) = if d01 >= d02 && d01 >= d12 {
                (v[0], v[1])
            } else if d02 >= d12 {
                (v[0], v[2])
            } else {
                (v[1], v[2])
            };
            let mip = mip_level_for(1.0, mip_ref_texels, shader_max_level(shader));
            self.fill_line(ctx, a, b, mip, shader, blend, depth_mode);
            return;
        }

        // Front faces project with negative signed area (y-down screen);
        // normalize the winding so the fill's inside test is uniform.
        let area2 = if area2 < 0.0 {
            v.swap(1, 2);
            -area2
        } else if two_sided {
            area2
        } else {
            count_call!(FRAME_COUNTERS.triangles_culled);
            return;
        };

        // Mip level, once per triangle, from the pixel/texel area ratio.
        let uv0 = v[0].uv_w / v[0].inv_w;
        let uv1 = v[1].uv_w / v[1].inv_w;
        let uv2 = v[2].uv_w / v[2].inv_w;
        let uv_area2 = ((uv1 - uv0).perp_dot(uv2 - uv0)).abs();
        let mip = mip_level_for(
            (area2 * 0.5) as f32,
            uv_area2 * 0.5 * mip_ref_texels,
            shader_max_level(shader),
        );

        self.fill_triangle(ctx, &v, area2, mip, shader, blend, depth_mode);
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_triangle(
        &mut self,
        ctx: &RasterContext,
        v: &[ProjVertex; 3],
        area2: f64,
        mip: f32,
        shader: &SurfaceShader,
        blend: crate::color::BlendMode,
        depth_mode: DepthMode,
    ) {
        let (fb_w, fb_h) = (ctx.frame.width(), ctx.frame.height());
        let min_x = (v[0].pos.x.min(v[1].pos.x).min(v[2].pos.x).floor().max(0.0)) as i32;
        let max_x = (v[0].pos.x.max(v[1].pos.x).max(v[2].pos.x).ceil()).min(fb_w as f32 - 1.0) as i32;
        let min_y = (v[0].pos.y.min(v[1].pos.y).min(v[2].pos.y).floor().max(0.0)) as i32;
        let max_y = (v[0].pos.y.max(v[1].pos.y).max(v[2].pos.y).ceil()).min(fb_h as f32 - 1.0) as i32;
        if min_x > max_x || min_y > max_y {
            return;
        }

        let inv_area = 1.0 / area2;

        // Incremental edge functions: one add per pixel step in x, one per
        // row step in y, all in f64 to keep long thin triangles watertight.
        let e0 = EdgeStepper::new(v[1].pos, v[2].pos, min_x, min_y);
        let e1 = EdgeStepper::new(v[2].pos, v[0].pos, min_x, min_y);
        let e2 = EdgeStepper::new(v[0].pos, v[1].pos, min_x, min_y);
        let (mut w0_row, mut w1_row, mut w2_row) = (e0.row0, e1.row0, e2.row0);

        for py in min_y..=max_y {
            let (mut w0, mut w1, mut w2) = (w0_row, w1_row, w2_row);
            for px in min_x..=max_x {
                if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                    count_call!(FRAME_COUNTERS.pixels_tested);
                    let b0 = (w0 * inv_area) as f32;
                    let b1 = (w1 * inv_area) as f32;
                    let b2 = (w2 * inv_area) as f32;
                    self.emit_fragment(
                        ctx, v, b0, b1, b2, px as usize, py as usize, mip, shader, blend,
                        depth_mode,
                    );
                }
                w0 += e0.dx;
                w1 += e1.dx;
                w2 += e2.dx;
            }
            w0_row += e0.dy;
            w1_row += e1.dy;
            w2_row += e2.dy;
        }
    }

    /// Line fallback for sub-threshold triangles: DDA between two projected
    /// vertices, linear attribute interpolation, same shading tail.
    #[allow(clippy::too_many_arguments)]
    fn fill_line(
        &mut self,
        ctx: &RasterContext,
        a: ProjVertex,
        b: ProjVertex,
        mip: f32,
        shader: &SurfaceShader,
        blend: crate::color::BlendMode,
        depth_mode: DepthMode,
    ) {
        let delta = b.pos - a.pos;
        let steps = delta.x.abs().max(delta.y.abs()).ceil().max(1.0) as i32;
        let (fb_w, fb_h) = (ctx.frame.width() as f32, ctx.frame.height() as f32);

        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let pos = a.pos + delta * t;
            if pos.x < 0.0 || pos.y < 0.0 || pos.x >= fb_w || pos.y >= fb_h {
                continue;
            }
            count_call!(FRAME_COUNTERS.pixels_tested);
            let lerped = ProjVertex {
                pos,
                inv_w: a.inv_w + (b.inv_w - a.inv_w) * t,
                uv_w: a.uv_w.lerp(b.uv_w, t),
                normal_w: a.normal_w.lerp(b.normal_w, t),
                tangent_w: a.tangent_w.lerp(b.tangent_w, t),
                bitangent_w: a.bitangent_w.lerp(b.bitangent_w, t),
                color_w: a.color_w.lerp(b.color_w, t),
                world_w: a.world_w.lerp(b.world_w, t),
            };
            let tri = [lerped, lerped, lerped];
            self.emit_fragment(
                ctx,
                &tri,
                1.0,
                0.0,
                0.0,
                pos.x as usize,
                pos.y as usize,
                mip,
                shader,
                blend,
                depth_mode,
            );
        }
    }

    /// Shared per-pixel tail: depth test, attribute reconstruction, shader
    /// dispatch and the write policy of the current depth mode.
    #[allow(clippy::too_many_arguments)]
    #[inline]
    fn emit_fragment(
        &self,
        ctx: &RasterContext,
        v: &[ProjVertex; 3],
        b0: f32,
        b1: f32,
        b2: f32,
        px: usize,
        py: usize,
        mip: f32,
        shader: &SurfaceShader,
        blend: crate::color::BlendMode,
        depth_mode: DepthMode,
    ) {
        let inv_w = b0 * v[0].inv_w + b1 * v[1].inv_w + b2 * v[2].inv_w;
        if inv_w <= 0.0 {
            return;
        }
        let depth = 1.0 / inv_w;

        // Safety: this object's tile mask covers (px, py); the queue
        // guarantees no other worker touches those tiles concurrently.
        unsafe {
            let Some(idx) = ctx.frame.test_depth(px, py, depth) else {
                return;
            };
            let scene_depth = ctx.frame.depth_at(px, py).unwrap_or(f32::INFINITY);
            let dst = ctx.frame.color_at(idx);

            let frag = Fragment {
                world: (v[0].world_w * b0 + v[1].world_w * b1 + v[2].world_w * b2) * depth,
                normal: ((v[0].normal_w * b0 + v[1].normal_w * b1 + v[2].normal_w * b2) * depth)
                    .normalize_or_zero(),
                tangent: (v[0].tangent_w * b0 + v[1].tangent_w * b1 + v[2].tangent_w * b2) * depth,
                bitangent: (v[0].bitangent_w * b0 + v[1].bitangent_w * b1 + v[2].bitangent_w * b2)
                    * depth,
                uv: (v[0].uv_w * b0 + v[1].uv_w * b1 + v[2].uv_w * b2) * depth,
                color: (v[0].color_w * b0 + v[1].color_w * b1 + v[2].color_w * b2) * depth,
                mip,
                depth,
                px,
                py,
            };

            let out = match shader {
                SurfaceShader::Flat { color } => {
                    let lambert = frag.normal.dot(ctx.lighting.light_dir).max(0.0);
                    let rgb = color.truncate()
                        * (ctx.lighting.ambient + ctx.lighting.light_color * lambert);
                    ShadeOutput::Opaque(crate::color::pack_rgba(rgb.extend(1.0)))
                }
                SurfaceShader::Diffuse(s) => s.shade_diffuse(&frag, ctx),
                SurfaceShader::NormalMapped(s) => s.shade_normal_mapped(&frag, ctx),
                SurfaceShader::Pbr(s) => s.shade_pbr(&frag, ctx),
                SurfaceShader::Water(s) => s.shade(&frag, ctx, dst, scene_depth),
                SurfaceShader::Effect(s) => s.shade(&frag, ctx),
            };

            let written = match out {
                ShadeOutput::Skip => false,
                ShadeOutput::Opaque(color) => {
                    ctx.frame.write_color(idx, color);
                    true
                }
                ShadeOutput::Blend(src) => {
                    ctx.frame.write_color(idx, blend.apply_packed(src, dst));
                    true
                }
            };
            if written {
                count_call!(FRAME_COUNTERS.pixels_shaded);
                if depth_mode == DepthMode::Claim {
                    ctx.frame.write_depth(idx, depth);
                    if ctx.write_normals {
                        ctx.frame.write_normal(idx, frag.normal);
                    }
                }
            }
        }
    }
}

/// Incremental f64 edge function evaluated at pixel centers.
struct EdgeStepper {
    row0: f64,
    dx: f64,
    dy: f64,
}

impl EdgeStepper {
    fn new(a: Vec2, b: Vec2, min_x: i32, min_y: i32) -> Self {
        let start = Vec2::new(min_x as f32 + 0.5, min_y as f32 + 0.5);
        Self {
            row0: edge_function_at(a, b, start),
            dx: (b.y - a.y) as f64,
            dy: -((b.x - a.x) as f64),
        }
    }
}

#[inline]
fn edge_function_at(a: Vec2, b: Vec2, p: Vec2) -> f64 {
    (b.y as f64 - a.y as f64) * (p.x as f64 - a.x as f64)
        - (b.x as f64 - a.x as f64) * (p.y as f64 - a.y as f64)
}

/// Twice the signed area of triangle (a, b, c) in screen space.
#[inline]
fn edge_function(a: Vec2, b: Vec2, c: Vec2) -> f64 {
    edge_function_at(a, b, c)
}

fn shader_max_level(shader: &SurfaceShader) -> usize {
    match shader {
        SurfaceShader::Flat { .. } => 0,
        SurfaceShader::Diffuse(s) | SurfaceShader::NormalMapped(s) | SurfaceShader::Pbr(s) => s
            .inputs
            .albedo
            .as_ref()
            .map(|t| t.max_level())
            .unwrap_or(0),
        SurfaceShader::Water(s) => s.inputs.albedo.as_ref().map(|t| t.max_level()).unwrap_or(0),
        SurfaceShader::Effect(s) => s.inputs.albedo.as_ref().map(|t| t.max_level()).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_level_matches_power_of_four_ratio() {
        // Pixel area exactly 4^k times the texel area selects level k.
        for k in 0..6 {
            let texel_area = 37.5f32;
            let screen_area = texel_area * 4f32.powi(k);
            let level = mip_level_for(screen_area, texel_area, 8);
            assert!(
                (level - k as f32).abs() < 1e-4,
                "4^{k} ratio picked level {level}"
            );
        }
    }

    #[test]
    fn mip_level_snaps_near_integers() {
        // A ratio slightly off 4^2 still snaps to exactly 2.
        let texel_area = 10.0f32;
        let screen_area = texel_area * 4f32.powi(2) * 1.04;
        let level = mip_level_for(screen_area, texel_area, 8);
        assert_eq!(level, 2.0);

        // Far enough away it stays fractional.
        let screen_area = texel_area * 4f32.powi(2) * 1.9;
        let level = mip_level_for(screen_area, texel_area, 8);
        assert!(level > 2.2 && level < 2.8, "got {level}");
    }

    #[test]
    fn mip_level_clamps_to_chain() {
        assert_eq!(mip_level_for(1.0, 4096.0, 5), 0.0);
        assert_eq!(mip_level_for(4096.0, 1.0, 3), 3.0);
        // Degenerate UV area falls back to the finest level.
        assert_eq!(mip_level_for(100.0, 0.0, 4), 4.0);
    }

    #[test]
    fn edge_function_sign_and_magnitude() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(4.0, 0.0);
        let c = Vec2::new(0.0, 3.0);
        // y-down screen: this winding is "clockwise on screen".
        let area2 = edge_function(a, b, c);
        assert_eq!(area2, 12.0);
        let flipped = edge_function(a, c, b);
        assert_eq!(flipped, -12.0);
    }

    #[test]
    fn edge_stepper_matches_direct_evaluation() {
        let a = Vec2::new(3.0, 7.0);
        let b = Vec2::new(90.5, 41.25);
        let e = EdgeStepper::new(a, b, 10, 20);
        let mut w = e.row0;
        for step in 1..=5 {
            w += e.dx;
            let direct = edge_function_at(a, b, Vec2::new(10.0 + step as f32 + 0.5, 20.5));
            assert!((w - direct).abs() < 1e-9);
        }
        let mut w = e.row0;
        for step in 1..=5 {
            w += e.dy;
            let direct = edge_function_at(a, b, Vec2::new(10.5, 20.0 + step as f32 + 0.5));
            assert!((w - direct).abs() < 1e-9);
        }
    }
}
