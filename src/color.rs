/// Color packing and alpha-blend evaluation.
/// All framebuffer pixels are ARGB32; shading math runs in f32 RGBA vectors
/// in [0, 1] and is packed with saturation on write.
use glam::{Vec3, Vec4};

/// Pack 8-bit channels into ARGB32.
#[inline]
pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// Pack opaque RGB into ARGB32.
#[inline]
pub const fn rgb(r: u8, g: u8, b: u8) -> u32 {
    argb(0xFF, r, g, b)
}

/// Saturating float-to-byte conversion. Input is a [0, 1] channel value;
/// out-of-range inputs (including NaN) clamp rather than wrap.
#[inline]
pub fn unit_to_u8(x: f32) -> u8 {
    let v = x * 255.0 + 0.5;
    if v >= 255.0 {
        255
    } else if v > 0.0 {
        v as u8
    } else {
        0
    }
}

/// Pack an RGBA vector in [0, 1] into ARGB32 with per-channel saturation.
#[inline]
pub fn pack_rgba(c: Vec4) -> u32 {
    argb(
        unit_to_u8(c.w),
        unit_to_u8(c.x),
        unit_to_u8(c.y),
        unit_to_u8(c.z),
    )
}

/// Unpack ARGB32 into an RGBA vector in [0, 1].
#[inline]
pub fn unpack_rgba(c: u32) -> Vec4 {
    const INV: f32 = 1.0 / 255.0;
    Vec4::new(
        ((c >> 16) & 0xFF) as f32 * INV,
        ((c >> 8) & 0xFF) as f32 * INV,
        (c & 0xFF) as f32 * INV,
        ((c >> 24) & 0xFF) as f32 * INV,
    )
}

/// Pack a unit normal into the auxiliary normal plane: signed 8-bit x/y/z in
/// the low 24 bits with bias 128, high byte 0x01 to mark "geometry present".
/// An all-zero word means the pixel holds no geometry.
#[inline]
pub fn pack_normal(n: Vec3) -> u32 {
    let x = (n.x * 127.0 + 128.0).clamp(0.0, 255.0) as u32;
    let y = (n.y * 127.0 + 128.0).clamp(0.0, 255.0) as u32;
    let z = (n.z * 127.0 + 128.0).clamp(0.0, 255.0) as u32;
    0x0100_0000 | (x << 16) | (y << 8) | z
}

/// Unpack a normal written by [`pack_normal`]. Returns `None` for pixels that
/// never received geometry.
#[inline]
pub fn unpack_normal(word: u32) -> Option<Vec3> {
    if word == 0 {
        return None;
    }
    const INV: f32 = 1.0 / 127.0;
    let x = (((word >> 16) & 0xFF) as f32 - 128.0) * INV;
    let y = (((word >> 8) & 0xFF) as f32 - 128.0) * INV;
    let z = ((word & 0xFF) as f32 - 128.0) * INV;
    Some(Vec3::new(x, y, z).normalize_or_zero())
}

/// Per-term combine factor of a blend mode. One nibble of the mode byte
/// selects the factor applied to the source term, the other the factor
/// applied to the destination term:
///
/// `out.rgb = src.rgb * F_src(src, dst) + dst.rgb * F_dst(src, dst)`
///
/// summed per channel and saturated. Nibble values beyond the table decode
/// as `One`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstColor,
    InvDstColor,
    DstAlpha,
    InvDstAlpha,
}

impl BlendFactor {
    /// Decode one nibble of a blend mode byte.
    #[inline]
    pub fn from_nibble(n: u8) -> Self {
        match n & 0x0F {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::SrcColor,
            3 => Self::InvSrcColor,
            4 => Self::SrcAlpha,
            5 => Self::InvSrcAlpha,
            6 => Self::DstColor,
            7 => Self::InvDstColor,
            8 => Self::DstAlpha,
            9 => Self::InvDstAlpha,
            _ => Self::One,
        }
    }

    /// Evaluate the factor for the given source/destination RGBA.
    /// Color factors are per-channel; alpha factors broadcast.
    #[inline]
    fn eval(self, src: Vec4, dst: Vec4) -> Vec3 {
        match self {
            Self::Zero => Vec3::ZERO,
            Self::One => Vec3::ONE,
            Self::SrcColor => src.truncate(),
            Self::InvSrcColor => Vec3::ONE - src.truncate(),
            Self::SrcAlpha => Vec3::splat(src.w),
            Self::InvSrcAlpha => Vec3::splat(1.0 - src.w),
            Self::DstColor => dst.truncate(),
            Self::InvDstColor => Vec3::ONE - dst.truncate(),
            Self::DstAlpha => Vec3::splat(dst.w),
            Self::InvDstAlpha => Vec3::splat(1.0 - dst.w),
        }
    }
}

/// Blend mode byte: high nibble selects the source factor, low nibble the
/// destination factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendMode(pub u8);

/// Standard alpha blending: `src*a + dst*(1-a)`.
pub const BLEND_STANDARD: BlendMode = BlendMode(0x45);
/// Additive: `src*a + dst`.
pub const BLEND_ADDITIVE: BlendMode = BlendMode(0x41);
/// Multiplicative: `dst * src`.
pub const BLEND_MULTIPLY: BlendMode = BlendMode(0x02);

/// The sixteen mode bytes the target engine's shader permutations use.
/// Everything the effect/alpha materials encode decodes to one of these.
pub const ENGINE_BLEND_MODES: [BlendMode; 16] = [
    BlendMode(0x45), // standard alpha
    BlendMode(0x41), // additive
    BlendMode(0x11), // pure add
    BlendMode(0x10), // replace
    BlendMode(0x02), // multiply
    BlendMode(0x62), // double multiply
    BlendMode(0x15), // premultiplied alpha
    BlendMode(0x31), // inverse-color add (soft glow)
    BlendMode(0x40), // alpha replace
    BlendMode(0x05), // fade by source alpha
    BlendMode(0x81), // dst-alpha add
    BlendMode(0x49), // alpha over inverse dst alpha
    BlendMode(0x21), // color add
    BlendMode(0x04), // self-modulated alpha
    BlendMode(0x71), // inverse-dst-color add (screen)
    BlendMode(0x00), // zero (occlusion-only)
];

impl BlendMode {
    #[inline]
    pub fn src_factor(self) -> BlendFactor {
        BlendFactor::from_nibble(self.0 >> 4)
    }

    #[inline]
    pub fn dst_factor(self) -> BlendFactor {
        BlendFactor::from_nibble(self.0)
    }

    /// Apply the documented per-term formula on RGBA in [0, 1].
    /// The result alpha keeps the destination alpha (framebuffer coverage is
    /// not tracked per blend).
    #[inline]
    pub fn apply(self, src: Vec4, dst: Vec4) -> Vec4 {
        let fs = self.src_factor().eval(src, dst);
        let fd = self.dst_factor().eval(src, dst);
        let rgb = (src.truncate() * fs + dst.truncate() * fd).clamp(Vec3::ZERO, Vec3::ONE);
        rgb.extend(dst.w)
    }

    /// Blend a shaded source fragment over a packed destination pixel.
    #[inline]
    pub fn apply_packed(self, src: Vec4, dst: u32) -> u32 {
        pack_rgba(self.apply(src, unpack_rgba(dst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_conversion_clamps() {
        assert_eq!(unit_to_u8(0.0), 0);
        assert_eq!(unit_to_u8(1.0), 255);
        assert_eq!(unit_to_u8(-3.0), 0);
        assert_eq!(unit_to_u8(7.5), 255);
        assert_eq!(unit_to_u8(f32::NAN), 0);
        // Mid-range rounds to nearest
        assert_eq!(unit_to_u8(0.5), 128);
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let c = argb(0xFF, 0x12, 0x80, 0xFE);
        assert_eq!(pack_rgba(unpack_rgba(c)), c);
    }

    #[test]
    fn normal_roundtrip_and_empty_sentinel() {
        assert!(unpack_normal(0).is_none());
        let n = Vec3::new(0.0, 1.0, 0.0);
        let back = unpack_normal(pack_normal(n)).unwrap();
        assert!((back - n).length() < 0.02);
        let n = Vec3::new(0.6, -0.64, 0.48).normalize();
        let back = unpack_normal(pack_normal(n)).unwrap();
        assert!((back - n).length() < 0.02);
    }

    /// Reference evaluation of one factor, kept deliberately separate from
    /// the production decode path.
    fn reference_factor(nibble: u8, s: Vec4, d: Vec4) -> Vec3 {
        match nibble {
            0 => Vec3::ZERO,
            1 => Vec3::ONE,
            2 => s.truncate(),
            3 => Vec3::ONE - s.truncate(),
            4 => Vec3::splat(s.w),
            5 => Vec3::splat(1.0 - s.w),
            6 => d.truncate(),
            7 => Vec3::ONE - d.truncate(),
            8 => Vec3::splat(d.w),
            9 => Vec3::splat(1.0 - d.w),
            _ => Vec3::ONE,
        }
    }

    #[test]
    fn engine_blend_modes_match_per_term_formula() {
        let samples = [
            (
                Vec4::new(0.8, 0.2, 0.1, 0.5),
                Vec4::new(0.1, 0.4, 0.9, 1.0),
            ),
            (
                Vec4::new(0.0, 1.0, 0.5, 0.0),
                Vec4::new(1.0, 0.0, 0.25, 0.75),
            ),
            (
                Vec4::new(0.33, 0.66, 0.99, 1.0),
                Vec4::new(0.5, 0.5, 0.5, 0.5),
            ),
        ];

        for &mode in &ENGINE_BLEND_MODES {
            for &(s, d) in &samples {
                let expect = (s.truncate() * reference_factor(mode.0 >> 4, s, d)
                    + d.truncate() * reference_factor(mode.0 & 0xF, s, d))
                .clamp(Vec3::ZERO, Vec3::ONE);
                let got = mode.apply(s, d);
                assert!(
                    (got.truncate() - expect).length() < 1e-6,
                    "mode {:#04x}: got {:?}, expected {:?}",
                    mode.0,
                    got,
                    expect
                );
                assert_eq!(got.w, d.w, "blend must preserve destination alpha");
            }
        }
    }

    #[test]
    fn standard_alpha_is_lerp() {
        let s = Vec4::new(1.0, 0.0, 0.0, 0.25);
        let d = Vec4::new(0.0, 1.0, 0.0, 1.0);
        let out = BLEND_STANDARD.apply(s, d);
        assert!((out.x - 0.25).abs() < 1e-6);
        assert!((out.y - 0.75).abs() < 1e-6);
    }

    #[test]
    fn all_sixteen_modes_are_distinct() {
        for (i, a) in ENGINE_BLEND_MODES.iter().enumerate() {
            for b in &ENGINE_BLEND_MODES[i + 1..] {
                assert_ne!(a.0, b.0);
            }
        }
    }
}
