//! Resolves a triangle hit into interpolated surface attributes.

use crate::accel::TriangleHit;
use crate::{fetch, SceneBindings};
use glam::{Vec2, Vec3};
use shared_structs::{HitEntry, Vertex, NO_INDEX_BUFFER};
use std::ops::{Add, Mul};

/// Everything the shading assembler needs about the surface under a hit.
/// Directions are in geometry (vertex) space unless named otherwise.
pub struct Surface {
    pub entry: HitEntry,
    pub world_positions: [Vec3; 3],
    /// Raw decoded unit normals of the three vertices.
    pub vertex_normals: [Vec3; 3],
    /// `winding * normalize(cross(e1, e2))` over the world-space edges.
    pub flat_normal: Vec3,
    /// Barycentric-interpolated position after geometry-to-object only;
    /// the motion estimator re-transforms this by last frame's matrix.
    pub position_object: Vec3,
    pub position_world: Vec3,
    pub tex_coords: Vec2,
    /// Interpolated and renormalized. Adequate for small triangles; exact
    /// only in the planar limit.
    pub normal: Vec3,
    pub tangent: Vec3,
    /// `normalize(cross(normal, tangent))` signed by the *first* vertex's
    /// bitangent sign. The flat sign across the triangle is deliberate.
    pub bitangent: Vec3,
}

fn interpolate<T>(a: T, b: T, c: T, weights: Vec3) -> T
where
    T: Mul<f32, Output = T> + Add<Output = T> + Copy,
{
    a * weights.x + b * weights.y + c * weights.z
}

pub fn resolve_triangle(hit: &TriangleHit, bindings: &SceneBindings) -> Surface {
    // Each instance reserves one entry per sub-geometry, starting at its
    // custom index. Out-of-range indices are a host-side contract violation.
    let entry = *fetch(
        &bindings.hit_entries,
        hit.instance_custom_index + hit.geometry_index,
    );

    let first = hit.primitive_index * 3;
    let indices = if entry.index_buffer == NO_INDEX_BUFFER {
        [first, first + 1, first + 2]
    } else {
        let index_buffer = fetch(&bindings.index_buffers, entry.index_buffer);
        [
            *fetch(index_buffer, first),
            *fetch(index_buffer, first + 1),
            *fetch(index_buffer, first + 2),
        ]
    };

    let vertex_buffer = fetch(&bindings.vertex_buffers, entry.vertex_buffer);
    let vertices: [Vertex; 3] = [
        *fetch(vertex_buffer, indices[0]),
        *fetch(vertex_buffer, indices[1]),
        *fetch(vertex_buffer, indices[2]),
    ];

    // Geometry to object by the entry's matrix, then object to world by the
    // transform the trace supplied for this instance.
    let object_position = |vertex: &Vertex| entry.geometry_to_object.transform_point(vertex.position);
    let object_positions = [
        object_position(&vertices[0]),
        object_position(&vertices[1]),
        object_position(&vertices[2]),
    ];
    let world_positions = [
        hit.object_to_world.transform_point(object_positions[0]),
        hit.object_to_world.transform_point(object_positions[1]),
        hit.object_to_world.transform_point(object_positions[2]),
    ];

    let flat_normal = entry.winding
        * (world_positions[1] - world_positions[0])
            .cross(world_positions[2] - world_positions[0])
            .normalize();

    let weights = Vec3::new(
        1.0 - hit.barycentrics.x - hit.barycentrics.y,
        hit.barycentrics.x,
        hit.barycentrics.y,
    );

    let vertex_normals = [
        vertices[0].decoded_normal(),
        vertices[1].decoded_normal(),
        vertices[2].decoded_normal(),
    ];
    let normal = interpolate(vertex_normals[0], vertex_normals[1], vertex_normals[2], weights)
        .normalize();
    let tangent = interpolate(
        vertices[0].decoded_tangent(),
        vertices[1].decoded_tangent(),
        vertices[2].decoded_tangent(),
        weights,
    )
    .normalize();
    let bitangent = normal.cross(tangent).normalize() * vertices[0].bitangent_sign;

    Surface {
        entry,
        world_positions,
        vertex_normals,
        flat_normal,
        position_object: interpolate(
            object_positions[0],
            object_positions[1],
            object_positions[2],
            weights,
        ),
        position_world: interpolate(
            world_positions[0],
            world_positions[1],
            world_positions[2],
            weights,
        ),
        tex_coords: interpolate(
            vertices[0].tex_coords,
            vertices[1].tex_coords,
            vertices[2].tex_coords,
            weights,
        ),
        normal,
        tangent,
        bitangent,
    }
}
