//! The single-pixel debug probe, debug line submission, and the auxiliary
//! view-mode colors.

use crate::accel::TriangleHit;
use crate::geometry::Surface;
use crate::shading::Shading;
use glam::{UVec2, Vec2, Vec3, Vec4};
use shared_structs::{
    pack_unorm, unpack_quat, Camera, DebugProbe, DebugViewMode, DRAW_FLAG_GEOMETRY,
    DRAW_FLAG_NORMALS, DRAW_FLAG_SPACE,
};
use std::sync::Mutex;

#[derive(Copy, Clone, Debug)]
pub struct DebugPoint {
    pub position: Vec3,
    /// unorm8x4 color.
    pub color: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct DebugLine {
    pub from: DebugPoint,
    pub to: DebugPoint,
}

/// Shared append-only buffer for world-space debug lines.
///
/// The mutex stands in for the atomic slot allocation the real append
/// primitive provides; submission order across pixels is unspecified and
/// lines past capacity are dropped.
pub struct DebugLineBuffer {
    capacity: usize,
    lines: Mutex<Vec<DebugLine>>,
}

impl DebugLineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn append(&self, line: DebugLine) {
        let mut lines = self.lines.lock().unwrap();
        if lines.len() < self.capacity {
            lines.push(line);
        }
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains the submitted lines, e.g. to hand them to a line renderer.
    pub fn take(&self) -> Vec<DebugLine> {
        std::mem::take(&mut *self.lines.lock().unwrap())
    }
}

pub fn record_probe_hit(probe: &Mutex<DebugProbe>, hit: &TriangleHit, surface: &Surface) {
    *probe.lock().unwrap() = DebugProbe {
        instance_custom_index: hit.instance_custom_index,
        ray_distance: hit.t,
        tex_coords: surface.tex_coords,
        base_color_texture: surface.entry.base_color_texture,
        normal_texture: surface.entry.normal_texture,
        position_world: surface.position_world,
        flat_normal: surface.flat_normal,
    };
}

pub fn reset_probe(probe: &Mutex<DebugProbe>) {
    *probe.lock().unwrap() = DebugProbe::default();
}

fn color(r: f32, g: f32, b: f32) -> u32 {
    pack_unorm(Vec4::new(r, g, b, 1.0))
}

fn line(lines: &DebugLineBuffer, from: Vec3, to: Vec3, color: u32) {
    lines.append(DebugLine {
        from: DebugPoint {
            position: from,
            color,
        },
        to: DebugPoint {
            position: to,
            color,
        },
    });
}

/// Submits the overlay lines enabled by `draw_flags` for the probed hit.
pub fn submit_lines(
    lines: &DebugLineBuffer,
    draw_flags: u32,
    hit: &TriangleHit,
    surface: &Surface,
    shading: &Shading,
) {
    // Sized relative to the hit distance.
    let scale = 0.1 * hit.t;

    if draw_flags & DRAW_FLAG_SPACE != 0 {
        let origin = surface.position_world;
        line(
            lines,
            origin,
            origin + shading.tangent_world * scale,
            color(1.0, 0.0, 0.0),
        );
        line(
            lines,
            origin,
            origin + shading.bitangent_world * scale,
            color(0.0, 1.0, 0.0),
        );
        line(
            lines,
            origin,
            origin + shading.world_normal * scale,
            color(0.0, 0.0, 1.0),
        );
    }

    if draw_flags & DRAW_FLAG_NORMALS != 0 {
        let rotation = unpack_quat(surface.entry.geometry_to_world_rotation);
        for corner in 0..3 {
            line(
                lines,
                surface.world_positions[corner],
                surface.world_positions[corner]
                    + rotation * surface.vertex_normals[corner] * scale,
                color(1.0, 0.0, 1.0),
            );
        }
    }

    if draw_flags & DRAW_FLAG_GEOMETRY != 0 {
        let white = color(1.0, 1.0, 1.0);
        for corner in 0..3 {
            line(
                lines,
                surface.world_positions[corner],
                surface.world_positions[(corner + 1) % 3],
                white,
            );
        }
        let center = (surface.world_positions[0]
            + surface.world_positions[1]
            + surface.world_positions[2])
            / 3.0;
        line(
            lines,
            center,
            center + surface.flat_normal * scale,
            color(1.0, 1.0, 0.0),
        );
    }
}

fn direction_color(direction: Vec3) -> Vec4 {
    (direction * 0.5 + Vec3::splat(0.5)).extend(1.0)
}

/// The value the diagnostic channel shows for a hit pixel.
pub fn view_color(
    mode: DebugViewMode,
    pixel: UVec2,
    camera: &Camera,
    hit: &TriangleHit,
    surface: &Surface,
    shading: &Shading,
    motion: Vec2,
) -> Vec4 {
    match mode {
        DebugViewMode::Final => Vec4::ZERO,
        DebugViewMode::DiffuseAlbedoTexture => shading.albedo_texture,
        DebugViewMode::DiffuseAlbedoFactor => shading.base_color_factor,
        DebugViewMode::NormalTexture => direction_color(shading.local_normal),
        DebugViewMode::NormalScale => {
            let scale = surface.entry.normal_scale;
            Vec4::new(scale, scale, scale, 1.0)
        }
        DebugViewMode::GeometryNormal => direction_color(shading.geometry_normal_world),
        DebugViewMode::ShadingNormal => direction_color(shading.world_normal),
        DebugViewMode::HitConsistency => {
            // Two independent derivations of the hit point, and the current
            // camera's reprojection of it, should all agree. Differences
            // expose transform or precision bugs.
            let along_ray = camera.position + camera.ray_direction(pixel) * hit.t;
            let position_diff = along_ray - surface.position_world;
            let screen = camera.project(surface.position_world);
            let screen_diff = screen - (pixel.as_f32() + Vec2::splat(0.5));
            Vec4::new(position_diff.length(), screen_diff.length(), 0.0, 1.0)
        }
        DebugViewMode::Motion => {
            Vec4::new(motion.x * 0.1 + 0.5, motion.y * 0.1 + 0.5, 0.5, 1.0)
        }
    }
}
