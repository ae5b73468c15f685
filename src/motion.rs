//! Screen-space motion estimation by reprojection into the previous frame.

use crate::geometry::Surface;
use glam::{UVec2, Vec2};
use shared_structs::Camera;

/// Fixed scale applied before the snorm8x2 motion channels are written.
pub const MOTION_SCALE: f32 = 0.02;

/// Sub-pixel displacement of the hit point between the previous and current
/// frame, in pixels. The half-pixel term centers sampling; a static surface
/// under a static camera yields exactly zero.
pub fn estimate(surface: &Surface, prev_camera: &Camera, pixel: UVec2) -> Vec2 {
    let prev_world = surface
        .entry
        .prev_object_to_world
        .transform_point(surface.position_object);
    let prev_screen = prev_camera.project(prev_world);

    prev_screen - pixel.as_f32() - Vec2::splat(0.5)
}
