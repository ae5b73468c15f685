//! Builds the world-space shading frame and albedo for a resolved surface.

use crate::geometry::Surface;
use crate::texture::Filter;
use crate::{fetch, SceneBindings};
use glam::{Mat3, Quat, Vec2, Vec3, Vec4};
use shared_structs::{unpack_quat, unpack_unorm, TEXTURE_OVERRIDE_ALBEDO, TEXTURE_OVERRIDE_NORMAL};

pub struct Shading {
    /// Shortest-arc rotation taking canonical +Z to `world_normal`, the
    /// compact frame encoding stored in the G-buffer.
    pub basis: Vec4,
    pub albedo: Vec4,
    /// Raw base color sample, kept around for the debug views.
    pub albedo_texture: Vec4,
    pub base_color_factor: Vec4,
    /// Tangent-space normal before any rotation.
    pub local_normal: Vec3,
    pub world_normal: Vec3,
    /// The per-vertex-interpolated normal rotated into world space.
    pub geometry_normal_world: Vec3,
    pub tangent_world: Vec3,
    pub bitangent_world: Vec3,
}

pub fn assemble(surface: &Surface, bindings: &SceneBindings, texture_flags: u32) -> Shading {
    let entry = &surface.entry;
    let rotation = unpack_quat(entry.geometry_to_world_rotation);
    let tangent_to_geometry = Mat3::from_cols(surface.tangent, surface.bitangent, surface.normal);

    let local_normal = if texture_flags & TEXTURE_OVERRIDE_NORMAL != 0 {
        Vec3::Z
    } else {
        let sample =
            fetch(&bindings.textures, entry.normal_texture).sample(surface.tex_coords, Filter::Linear);
        let n_xy = (Vec2::new(sample.x, sample.y) * 2.0 - Vec2::ONE) * entry.normal_scale;
        // Over-range two-channel input would take sqrt of a negative
        // residual; clamp it to zero instead.
        let n_z = (1.0 - n_xy.dot(n_xy)).max(0.0).sqrt();
        n_xy.extend(n_z)
    };

    let world_normal = (rotation * (tangent_to_geometry * local_normal)).normalize();
    let basis = Vec4::from(Quat::from_rotation_arc(Vec3::Z, world_normal));

    let base_color_factor = unpack_unorm(entry.base_color_factor);
    let albedo_texture = fetch(&bindings.textures, entry.base_color_texture)
        .sample(surface.tex_coords, Filter::Linear);
    let albedo = if texture_flags & TEXTURE_OVERRIDE_ALBEDO != 0 {
        base_color_factor
    } else {
        albedo_texture * base_color_factor
    };

    Shading {
        basis,
        albedo,
        albedo_texture,
        base_color_factor,
        local_normal,
        world_normal,
        geometry_normal_world: (rotation * surface.normal).normalize(),
        tangent_world: (rotation * surface.tangent).normalize(),
        bitangent_world: (rotation * surface.bitangent).normalize(),
    }
}
