/// View transform: world space -> clip -> screen, plus the inverse mapping
/// the decal pass needs to reconstruct world positions from the depth plane.
use glam::{Affine3A, Mat4, Vec2, Vec3, Vec4};

use crate::assets::Aabb;

/// Clip-space w below this is treated as "behind the camera".
pub const NEAR_W_EPS: f32 = 1e-3;

/// Projected screen-space bounds of a transformed 3-D box.
#[derive(Debug, Clone, Copy)]
pub struct ScreenRect {
    pub min: Vec2,
    pub max: Vec2,
    /// Minimum camera-space depth over the visible corners.
    pub near: f32,
}

#[derive(Clone, Copy)]
pub struct Camera {
    view_proj: Mat4,
    inv_view_proj: Mat4,
    eye: Vec3,
    forward: Vec3,
    width: usize,
    height: usize,
}

impl Camera {
    /// Standard perspective camera looking from `eye` towards `target`.
    pub fn perspective(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        near: f32,
        far: f32,
        width: usize,
        height: usize,
    ) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        let view = Mat4::look_at_rh(eye, target, up);
        let proj = Mat4::perspective_rh(fov_y, aspect, near, far);
        let view_proj = proj * view;
        Self {
            view_proj,
            inv_view_proj: view_proj.inverse(),
            eye,
            forward: (target - eye).normalize(),
            width,
            height,
        }
    }

    /// Camera from a prebuilt view-projection matrix. `eye` and `forward`
    /// must describe the same view the matrix encodes; they drive the
    /// depth-plane reconstruction used by decals.
    pub fn from_matrix(view_proj: Mat4, eye: Vec3, forward: Vec3, width: usize, height: usize) -> Self {
        Self {
            view_proj,
            inv_view_proj: view_proj.inverse(),
            eye,
            forward: forward.normalize(),
            width,
            height,
        }
    }

    #[inline]
    pub fn view_proj(&self) -> &Mat4 {
        &self.view_proj
    }

    #[inline]
    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    #[inline]
    pub fn viewport(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Map NDC xy to pixel coordinates (y down).
    #[inline]
    pub fn ndc_to_screen(&self, ndc: Vec2) -> Vec2 {
        Vec2::new(
            (ndc.x + 1.0) * 0.5 * self.width as f32,
            (1.0 - ndc.y) * 0.5 * self.height as f32,
        )
    }

    /// Project a world-space point. Returns screen position and camera-space
    /// depth, or `None` behind the near plane.
    #[inline]
    pub fn project(&self, world: Vec3) -> Option<(Vec2, f32)> {
        let clip = self.view_proj * world.extend(1.0);
        if clip.w < NEAR_W_EPS {
            return None;
        }
        let ndc = clip / clip.w;
        Some((self.ndc_to_screen(Vec2::new(ndc.x, ndc.y)), clip.w))
    }

    /// Project the corners of a local-space box and return the screen-space
    /// rect they cover. Corners behind the near plane conservatively expand
    /// the rect to the full viewport. Returns `None` only when the whole box
    /// is behind the camera; off-screen rects are left to the tile-mask
    /// cull, which maps them to the empty mask.
    pub fn project_aabb(&self, aabb: &Aabb, transform: &Affine3A) -> Option<ScreenRect> {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        let mut near = f32::INFINITY;
        let mut any_behind = false;
        let mut any_visible = false;

        for corner in aabb.corners() {
            let world = transform.transform_point3(corner);
            let clip = self.view_proj * world.extend(1.0);
            if clip.w < NEAR_W_EPS {
                any_behind = true;
                continue;
            }
            any_visible = true;
            near = near.min(clip.w);
            let ndc = clip / clip.w;
            let s = self.ndc_to_screen(Vec2::new(ndc.x, ndc.y));
            min = min.min(s);
            max = max.max(s);
        }

        if !any_visible {
            return None;
        }
        if any_behind {
            // Geometry crosses the near plane; the projected footprint is
            // unbounded, so claim the whole viewport.
            min = Vec2::ZERO;
            max = Vec2::new(self.width as f32, self.height as f32);
            near = near.min(NEAR_W_EPS);
        }
        Some(ScreenRect { min, max, near })
    }

    /// Reconstruct the world-space position seen at pixel `(px, py)` with
    /// linear camera-space depth `depth` (as stored in the depth plane).
    pub fn position_at_depth(&self, px: f32, py: f32, depth: f32) -> Vec3 {
        let ndc = Vec2::new(
            px / self.width as f32 * 2.0 - 1.0,
            1.0 - py / self.height as f32 * 2.0,
        );
        let h = self.inv_view_proj * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        let far_point = h.truncate() / h.w;
        let dir = far_point - self.eye;
        // Scale the ray so one unit along it advances one unit of view depth.
        let t = depth / dir.dot(self.forward);
        self.eye + dir * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> Camera {
        Camera::perspective(
            Vec3::new(0.0, 5.0, 20.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::Y,
            60f32.to_radians(),
            0.1,
            500.0,
            640,
            360,
        )
    }

    #[test]
    fn project_center_lands_mid_screen() {
        let cam = test_camera();
        let (screen, depth) = cam.project(Vec3::ZERO).unwrap();
        assert!((screen.x - 320.0).abs() < 1.0);
        assert!((screen.y - 180.0).abs() < 1.0);
        assert!(depth > 0.0);
    }

    #[test]
    fn behind_camera_is_not_visible() {
        let cam = test_camera();
        assert!(cam.project(Vec3::new(0.0, 5.0, 40.0)).is_none());
    }

    #[test]
    fn aabb_fully_behind_is_none() {
        let cam = test_camera();
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let t = Affine3A::from_translation(Vec3::new(0.0, 5.0, 60.0));
        assert!(cam.project_aabb(&aabb, &t).is_none());
    }

    #[test]
    fn aabb_crossing_near_plane_claims_viewport() {
        let cam = test_camera();
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        // Box straddling the eye position.
        let t = Affine3A::from_translation(Vec3::new(0.0, 5.0, 20.0));
        let rect = cam.project_aabb(&aabb, &t).unwrap();
        assert_eq!(rect.min, Vec2::ZERO);
        assert_eq!(rect.max, Vec2::new(640.0, 360.0));
    }

    #[test]
    fn depth_reconstruction_roundtrip() {
        let cam = test_camera();
        for p in [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(3.0, 1.0, -5.0),
            Vec3::new(-4.0, 2.5, 6.0),
        ] {
            let (screen, depth) = cam.project(p).unwrap();
            let back = cam.position_at_depth(screen.x, screen.y, depth);
            assert!(
                (back - p).length() < 1e-2,
                "reconstructed {back:?} for original {p:?}"
            );
        }
    }
}
