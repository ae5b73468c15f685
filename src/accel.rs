//! The acceleration structure seam, plus a reference software tracer so the
//! kernel can run without a GPU.

use crate::ray_cast::Ray;
use crate::SceneBindings;
use glam::{Vec2, Vec3};
use shared_structs::{Transform, NO_INDEX_BUFFER};

/// Result of a single nearest-hit query.
pub enum Intersection {
    Miss,
    Triangle(TriangleHit),
}

#[derive(Copy, Clone, Debug)]
pub struct TriangleHit {
    pub instance_custom_index: u32,
    pub geometry_index: u32,
    pub primitive_index: u32,
    /// Barycentric (u, v); interpolation weights are `(1 - u - v, u, v)`.
    pub barycentrics: Vec2,
    /// Ray parametric distance.
    pub t: f32,
    /// The instance's object-to-world transform as supplied by the trace
    /// itself, independent of anything cached in the HitEntry table.
    pub object_to_world: Transform,
}

/// A spatial index over opaque scene geometry.
///
/// One call is one complete synchronous traversal: nearest-hit semantics, no
/// any-hit callbacks, no retries. Non-opaque geometry never participates.
/// Deterministic for an identical structure and ray.
pub trait AccelerationStructure: Sync {
    fn nearest_hit(&self, ray: &Ray) -> Intersection;
}

/// Instance descriptor for [`SoftwareTlas::build`].
#[derive(Copy, Clone, Debug)]
pub struct TlasInstance {
    pub transform: Transform,
    /// First HitEntry of this instance's contiguous run; sub-geometry `g`
    /// lives at `instance_custom_index + g`.
    pub instance_custom_index: u32,
    pub geometry_count: u32,
}

struct BuiltInstance {
    transform: Transform,
    instance_custom_index: u32,
    /// World-space triangles, per sub-geometry, in primitive order.
    geometries: Vec<Vec<[Vec3; 3]>>,
}

/// Linear-scan reference tracer.
///
/// Stands in for the hardware structure on the CPU. Traversal quality is not
/// a goal; correctness of the returned hit record is.
pub struct SoftwareTlas {
    instances: Vec<BuiltInstance>,
}

impl SoftwareTlas {
    pub fn build(bindings: &SceneBindings, instances: &[TlasInstance]) -> Self {
        let instances = instances
            .iter()
            .map(|instance| {
                let geometries = (0..instance.geometry_count)
                    .map(|geometry_index| {
                        let entry = &bindings.hit_entries
                            [(instance.instance_custom_index + geometry_index) as usize];
                        let vertices = &bindings.vertex_buffers[entry.vertex_buffer as usize];

                        let world_position = |index: u32| {
                            let object = entry
                                .geometry_to_object
                                .transform_point(vertices[index as usize].position);
                            instance.transform.transform_point(object)
                        };

                        let triangle_count = if entry.index_buffer == NO_INDEX_BUFFER {
                            vertices.len() as u32 / 3
                        } else {
                            bindings.index_buffers[entry.index_buffer as usize].len() as u32 / 3
                        };

                        (0..triangle_count)
                            .map(|primitive| {
                                let vertex = |corner: u32| {
                                    let index = primitive * 3 + corner;
                                    if entry.index_buffer == NO_INDEX_BUFFER {
                                        world_position(index)
                                    } else {
                                        world_position(
                                            bindings.index_buffers[entry.index_buffer as usize]
                                                [index as usize],
                                        )
                                    }
                                };
                                [vertex(0), vertex(1), vertex(2)]
                            })
                            .collect()
                    })
                    .collect();

                BuiltInstance {
                    transform: instance.transform,
                    instance_custom_index: instance.instance_custom_index,
                    geometries,
                }
            })
            .collect();

        Self { instances }
    }
}

impl AccelerationStructure for SoftwareTlas {
    fn nearest_hit(&self, ray: &Ray) -> Intersection {
        let mut nearest = Intersection::Miss;
        let mut nearest_t = ray.t_max;

        for instance in &self.instances {
            for (geometry_index, triangles) in instance.geometries.iter().enumerate() {
                for (primitive_index, triangle) in triangles.iter().enumerate() {
                    if let Some((t, barycentrics)) = intersect_triangle(ray, triangle) {
                        if t <= nearest_t {
                            nearest_t = t;
                            nearest = Intersection::Triangle(TriangleHit {
                                instance_custom_index: instance.instance_custom_index,
                                geometry_index: geometry_index as u32,
                                primitive_index: primitive_index as u32,
                                barycentrics,
                                t,
                                object_to_world: instance.transform,
                            });
                        }
                    }
                }
            }
        }

        nearest
    }
}

// Möller-Trumbore, no backface culling.
fn intersect_triangle(ray: &Ray, triangle: &[Vec3; 3]) -> Option<(f32, Vec2)> {
    let edge_1 = triangle[1] - triangle[0];
    let edge_2 = triangle[2] - triangle[0];

    let p = ray.direction.cross(edge_2);
    let determinant = edge_1.dot(p);
    if determinant.abs() < 1.0e-9 {
        return None;
    }
    let inverse_determinant = 1.0 / determinant;

    let s = ray.origin - triangle[0];
    let u = s.dot(p) * inverse_determinant;
    if u < 0.0 || u > 1.0 {
        return None;
    }

    let q = s.cross(edge_1);
    let v = ray.direction.dot(q) * inverse_determinant;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge_2.dot(q) * inverse_determinant;
    if t < ray.t_min || t > ray.t_max {
        return None;
    }

    Some((t, Vec2::new(u, v)))
}
