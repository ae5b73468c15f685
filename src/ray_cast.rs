//! Primary ray construction.

use crate::accel::{AccelerationStructure, Intersection};
use glam::{UVec2, Vec3};
use shared_structs::Camera;

#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub t_min: f32,
    pub t_max: f32,
}

/// Builds the view ray through `pixel` and traces it to completion.
///
/// The ray is bounded to `[0, camera.depth]` and only opaque surfaces are
/// considered; a miss is a normal terminal outcome.
pub fn cast_primary_ray(
    accel: &dyn AccelerationStructure,
    camera: &Camera,
    pixel: UVec2,
) -> Intersection {
    let ray = Ray {
        origin: camera.position,
        direction: camera.ray_direction(pixel),
        t_min: 0.0,
        t_max: camera.depth,
    };

    accel.nearest_hit(&ray)
}
