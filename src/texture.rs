/// Decoded, sampleable textures.
///
/// A [`MipChain`] stores its levels coarsest-first: level 0 is the smallest
/// mip and each following level doubles the resolution per axis, so level `k`
/// holds `4^k` times the texels of the base. The rasterizer picks the level
/// whose texel density best matches a triangle's screen coverage (one texel
/// per pixel at the ideal level), which makes the selection rule a base-4
/// logarithm of the pixel/texel area ratio.
use glam::{Vec3, Vec4};

use crate::color::unpack_rgba;

/// Texture addressing outside [0, 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Wrap,
    Clamp,
    Mirror,
}

/// One mip level, ARGB32 row-major.
#[derive(Clone)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<u32>,
}

impl MipLevel {
    #[inline]
    fn texel(&self, x: i32, y: i32, au: AddressMode, av: AddressMode) -> u32 {
        let x = address(x, self.width as i32, au);
        let y = address(y, self.height as i32, av);
        self.texels[y as usize * self.width as usize + x as usize]
    }
}

/// Flat texture or cubemap layout. Cube levels stack the six faces
/// vertically (+X, -X, +Y, -Y, +Z, -Z), so `height == 6 * width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Flat,
    Cube,
}

/// Decoded mip chain produced by the texture decoder collaborator.
pub struct MipChain {
    levels: Vec<MipLevel>,
    address_u: AddressMode,
    address_v: AddressMode,
    kind: TextureKind,
}

impl MipChain {
    /// Build a chain from coarsest-first levels. Empty chains and levels
    /// with no texels are rejected by debug assertion; the decoder
    /// collaborator owns input validation.
    pub fn new(levels: Vec<MipLevel>, address_u: AddressMode, address_v: AddressMode) -> Self {
        debug_assert!(!levels.is_empty());
        debug_assert!(levels
            .windows(2)
            .all(|w| w[0].width <= w[1].width && w[0].height <= w[1].height));
        Self {
            levels,
            address_u,
            address_v,
            kind: TextureKind::Flat,
        }
    }

    /// Build a cubemap chain; each level must stack six square faces.
    pub fn new_cube(levels: Vec<MipLevel>, address: AddressMode) -> Self {
        debug_assert!(levels.iter().all(|l| l.height == l.width * 6));
        Self {
            levels,
            address_u: address,
            address_v: address,
            kind: TextureKind::Cube,
        }
    }

    /// Single-texel chain of a constant color. Used as the degrade path for
    /// objects whose texture failed to resolve.
    pub fn solid(color: u32) -> Self {
        Self::new(
            vec![MipLevel {
                width: 1,
                height: 1,
                texels: vec![color],
            }],
            AddressMode::Wrap,
            AddressMode::Wrap,
        )
    }

    #[inline]
    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    /// Highest (finest) level index.
    #[inline]
    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Base-level texel count, the denominator of the mip selection ratio.
    #[inline]
    pub fn base_texel_count(&self) -> f32 {
        let base = &self.levels[0];
        (base.width * base.height) as f32
    }

    /// Payload size for cache accounting.
    pub fn bytes(&self) -> usize {
        self.levels.iter().map(|l| l.texels.len() * 4).sum()
    }

    /// Bilinear sample of one level at (u, v) in [0, 1] texture space.
    pub fn sample_level(&self, u: f32, v: f32, level: usize) -> Vec4 {
        let level = &self.levels[level.min(self.max_level())];
        let x = u * level.width as f32 - 0.5;
        let y = v * level.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i32, y0 as i32);

        let t00 = unpack_rgba(level.texel(x0, y0, self.address_u, self.address_v));
        let t10 = unpack_rgba(level.texel(x0 + 1, y0, self.address_u, self.address_v));
        let t01 = unpack_rgba(level.texel(x0, y0 + 1, self.address_u, self.address_v));
        let t11 = unpack_rgba(level.texel(x0 + 1, y0 + 1, self.address_u, self.address_v));

        let top = t00.lerp(t10, fx);
        let bottom = t01.lerp(t11, fx);
        top.lerp(bottom, fy)
    }

    /// Sample at a fractional mip level: bilinear within a level, blending
    /// two adjacent levels when the fraction is significant. The rasterizer
    /// snaps near-integer levels before calling, so most triangles hit the
    /// single-level path.
    pub fn sample(&self, u: f32, v: f32, level: f32) -> Vec4 {
        let level = level.clamp(0.0, self.max_level() as f32);
        let lo = level.floor();
        let frac = level - lo;
        let lo = lo as usize;
        if frac < f32::EPSILON || lo == self.max_level() {
            return self.sample_level(u, v, lo);
        }
        let a = self.sample_level(u, v, lo);
        let b = self.sample_level(u, v, lo + 1);
        a.lerp(b, frac)
    }

    /// Sample a cubemap by direction. `level` selects the prefiltered mip
    /// (coarser levels hold rougher prefilters).
    pub fn sample_cube(&self, dir: Vec3, level: f32) -> Vec4 {
        debug_assert_eq!(self.kind, TextureKind::Cube);
        let (face, u, v) = cube_face_uv(dir);

        let level = level.clamp(0.0, self.max_level() as f32);
        let lo = level.floor() as usize;
        let frac = level - lo as f32;
        let a = self.sample_cube_level(face, u, v, lo);
        if frac < f32::EPSILON || lo == self.max_level() {
            return a;
        }
        let b = self.sample_cube_level(face, u, v, lo + 1);
        a.lerp(b, frac)
    }

    fn sample_cube_level(&self, face: usize, u: f32, v: f32, level: usize) -> Vec4 {
        let level = &self.levels[level.min(self.max_level())];
        let size = level.width as i32;
        // Clamp within the face so filtering never bleeds across faces.
        let x = (u * size as f32 - 0.5).round().clamp(0.0, (size - 1) as f32) as i32;
        let y = (v * size as f32 - 0.5).round().clamp(0.0, (size - 1) as f32) as i32;
        let y = y + face as i32 * size;
        unpack_rgba(level.texels[y as usize * size as usize + x as usize])
    }
}

/// Resolve an addressing mode: map texel index `i` into [0, n).
#[inline]
fn address(i: i32, n: i32, mode: AddressMode) -> i32 {
    match mode {
        AddressMode::Wrap => i.rem_euclid(n),
        AddressMode::Clamp => i.clamp(0, n - 1),
        AddressMode::Mirror => {
            let period = 2 * n;
            let m = i.rem_euclid(period);
            if m < n {
                m
            } else {
                period - 1 - m
            }
        }
    }
}

/// Select the cube face and in-face UV for a direction.
fn cube_face_uv(dir: Vec3) -> (usize, f32, f32) {
    let ax = dir.x.abs();
    let ay = dir.y.abs();
    let az = dir.z.abs();
    // Face order matches the stacked layout: +X, -X, +Y, -Y, +Z, -Z.
    let (face, ma, sc, tc) = if ax >= ay && ax >= az {
        if dir.x > 0.0 {
            (0, ax, -dir.z, -dir.y)
        } else {
            (1, ax, dir.z, -dir.y)
        }
    } else if ay >= az {
        if dir.y > 0.0 {
            (2, ay, dir.x, dir.z)
        } else {
            (3, ay, dir.x, -dir.z)
        }
    } else if dir.z > 0.0 {
        (4, az, dir.x, -dir.y)
    } else {
        (5, az, -dir.x, -dir.y)
    };
    let inv = 0.5 / ma.max(1e-20);
    (face, sc * inv + 0.5, tc * inv + 0.5)
}
