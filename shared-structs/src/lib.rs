//! Types shared between the visibility kernel and the scene-preparation
//! side, plus the fixed-point codec for quantized vertex attributes.
//!
//! Every buffer-resident record here has a fixed byte layout that hosts
//! reproduce exactly, so they're all `bytemuck::Pod` with explicit `repr(C)`.

use bytemuck::{Pod, Zeroable};
use glam::{const_vec4, Mat4, Quat, UVec2, Vec2, Vec3, Vec4};

/// Sentinel for [`HitEntry::index_buffer`]: the geometry has no index buffer
/// and triangle `i` reads vertices `i * 3 .. i * 3 + 3` sequentially.
pub const NO_INDEX_BUFFER: u32 = !0;

fn pack_byte_snorm(value: f32) -> u32 {
    ((value.max(-1.0).min(1.0) * 127.0).round() as i32 as u8) as u32
}

fn unpack_byte_snorm(byte: u32) -> f32 {
    // -128 decodes slightly below -1, clamp it back into range.
    (byte as u8 as i8 as f32 / 127.0).max(-1.0)
}

/// Packs four floats in `[-1, 1]` into 8-bit signed-normalized channels,
/// x in the lowest byte. Out-of-range components are clamped.
pub fn pack_snorm(value: Vec4) -> u32 {
    pack_byte_snorm(value.x)
        | pack_byte_snorm(value.y) << 8
        | pack_byte_snorm(value.z) << 16
        | pack_byte_snorm(value.w) << 24
}

pub fn unpack_snorm(packed: u32) -> Vec4 {
    Vec4::new(
        unpack_byte_snorm(packed),
        unpack_byte_snorm(packed >> 8),
        unpack_byte_snorm(packed >> 16),
        unpack_byte_snorm(packed >> 24),
    )
}

/// Packs four floats in `[0, 1]` into 8-bit unsigned-normalized channels,
/// x in the lowest byte. Out-of-range components are clamped.
pub fn pack_unorm(value: Vec4) -> u32 {
    let byte = |v: f32| (v.max(0.0).min(1.0) * 255.0).round() as u32;
    byte(value.x) | byte(value.y) << 8 | byte(value.z) << 16 | byte(value.w) << 24
}

pub fn unpack_unorm(packed: u32) -> Vec4 {
    Vec4::new(
        (packed & 0xff) as f32,
        (packed >> 8 & 0xff) as f32,
        (packed >> 16 & 0xff) as f32,
        (packed >> 24 & 0xff) as f32,
    ) / 255.0
}

pub fn pack_quat(rotation: Quat) -> u32 {
    pack_snorm(Vec4::from(rotation))
}

/// Decodes a quantized rotation. Renormalized because 8 bits per component
/// loses enough precision to visibly skew rotated normals otherwise.
pub fn unpack_quat(packed: u32) -> Quat {
    let v = unpack_snorm(packed);
    Quat::from_xyzw(v.x, v.y, v.z, v.w).normalize()
}

/// A 4x3 affine transform stored as three rows, the same layout acceleration
/// structure instances use for their transforms.
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq)]
#[repr(transparent)]
pub struct Transform(pub [Vec4; 3]);

impl Transform {
    pub const IDENTITY: Self = Self([
        const_vec4!([1.0, 0.0, 0.0, 0.0]),
        const_vec4!([0.0, 1.0, 0.0, 0.0]),
        const_vec4!([0.0, 0.0, 1.0, 0.0]),
    ]);

    pub fn from_mat4(matrix: Mat4) -> Self {
        let rows = matrix.transpose();
        Self([rows.x_axis, rows.y_axis, rows.z_axis])
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        let homogeneous = point.extend(1.0);
        Vec3::new(
            self.0[0].dot(homogeneous),
            self.0[1].dot(homogeneous),
            self.0[2].dot(homogeneous),
        )
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        let homogeneous = vector.extend(0.0);
        Vec3::new(
            self.0[0].dot(homogeneous),
            self.0[1].dot(homogeneous),
            self.0[2].dot(homogeneous),
        )
    }
}

/// One mesh vertex. Normal and tangent are quantized to four snorm8 channels
/// each (the fourth channel is unused); decoded vectors have to be
/// renormalized.
#[derive(Copy, Clone, Pod, Zeroable, Debug)]
#[repr(C)]
pub struct Vertex {
    pub position: Vec3,
    pub bitangent_sign: f32,
    pub tex_coords: Vec2,
    pub normal: u32,
    pub tangent: u32,
}

impl Vertex {
    pub fn new(
        position: Vec3,
        normal: Vec3,
        tangent: Vec3,
        bitangent_sign: f32,
        tex_coords: Vec2,
    ) -> Self {
        Self {
            position,
            bitangent_sign,
            tex_coords,
            normal: pack_snorm(normal.extend(0.0)),
            tangent: pack_snorm(tangent.extend(0.0)),
        }
    }

    pub fn decoded_normal(&self) -> Vec3 {
        unpack_snorm(self.normal).truncate().normalize()
    }

    pub fn decoded_tangent(&self) -> Vec3 {
        unpack_snorm(self.tangent).truncate().normalize()
    }
}

/// Per-geometry shading record, one per sub-geometry of every instance.
///
/// The table is addressed as `instance_custom_index + geometry_index`, so
/// each instance reserves a contiguous run of entries. The scene-preparation
/// side owns that contract; the kernel does not re-check it.
#[derive(Copy, Clone, Pod, Zeroable, Debug)]
#[repr(C)]
pub struct HitEntry {
    /// Index into the host's index buffer array, or [`NO_INDEX_BUFFER`].
    pub index_buffer: u32,
    /// Index into the host's vertex buffer array.
    pub vertex_buffer: u32,
    /// ±1. Compensates for instance transforms with an odd number of
    /// negative-scale axes.
    pub winding: f32,
    /// Geometry-to-world rotation, quantized with [`pack_quat`].
    pub geometry_to_world_rotation: u32,
    pub geometry_to_object: Transform,
    /// The *previous* frame's object-to-world transform, for motion vectors.
    pub prev_object_to_world: Transform,
    pub base_color_texture: u32,
    pub normal_texture: u32,
    /// unorm8x4 base color factor, multiplied into the sampled base color.
    pub base_color_factor: u32,
    pub normal_scale: f32,
}

/// Pinhole camera. `ray_direction` and `project` are exact inverses along a
/// pixel-center ray, which is what makes motion vectors of a static scene
/// come out as exactly zero.
#[derive(Copy, Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    /// Far depth; primary rays are bounded to `[0, depth]`.
    pub depth: f32,
    pub orientation: Quat,
    pub fov_y: f32,
    pub target_size: UVec2,
}

impl Camera {
    fn half_plane(&self) -> Vec2 {
        let half_y = (self.fov_y * 0.5).tan();
        let aspect = self.target_size.x as f32 / self.target_size.y as f32;
        Vec2::new(half_y * aspect, half_y)
    }

    pub fn contains(&self, pixel: UVec2) -> bool {
        pixel.x < self.target_size.x && pixel.y < self.target_size.y
    }

    /// World-space view direction through the center of `pixel`.
    pub fn ray_direction(&self, pixel: UVec2) -> Vec3 {
        let half = self.half_plane();
        let ndc =
            (pixel.as_f32() + Vec2::splat(0.5)) / self.target_size.as_f32() * 2.0 - Vec2::ONE;
        let local = Vec3::new(ndc.x * half.x, -ndc.y * half.y, 1.0);
        (self.orientation * local).normalize()
    }

    /// Sub-pixel screen coordinates of a world position. A point on the ray
    /// of pixel `p` projects back to `p + 0.5`. Positions behind the camera
    /// produce meaningless coordinates, not an error.
    pub fn project(&self, world: Vec3) -> Vec2 {
        let half = self.half_plane();
        let local = self.orientation.inverse() * (world - self.position);
        let ndc = Vec2::new(
            local.x / (local.z * half.x),
            -local.y / (local.z * half.y),
        );
        (ndc + Vec2::ONE) * 0.5 * self.target_size.as_f32()
    }
}

/// Which value the auxiliary debug image shows instead of nothing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum DebugViewMode {
    Final = 0,
    DiffuseAlbedoTexture,
    DiffuseAlbedoFactor,
    NormalTexture,
    NormalScale,
    GeometryNormal,
    ShadingNormal,
    HitConsistency,
    Motion,
}

/// Draw the shading tangent frame axes at the probed hit.
pub const DRAW_FLAG_SPACE: u32 = 1 << 0;
/// Draw the hit triangle's edges and its flat-normal arrow.
pub const DRAW_FLAG_GEOMETRY: u32 = 1 << 1;
/// Draw the raw decoded per-vertex normals of the hit triangle.
pub const DRAW_FLAG_NORMALS: u32 = 1 << 2;

/// Ignore the base color texture, use the factor alone.
pub const TEXTURE_OVERRIDE_ALBEDO: u32 = 1 << 0;
/// Force a flat normal map (local normal = +Z).
pub const TEXTURE_OVERRIDE_NORMAL: u32 = 1 << 1;

#[derive(Copy, Clone, Debug)]
pub struct DebugParams {
    pub view_mode: DebugViewMode,
    pub draw_flags: u32,
    pub texture_flags: u32,
    /// Probe pixel; negative coordinates disable the probe.
    pub probe_pixel: [i32; 2],
}

impl DebugParams {
    pub fn is_probe(&self, pixel: UVec2) -> bool {
        self.probe_pixel == [pixel.x as i32, pixel.y as i32]
    }
}

impl Default for DebugParams {
    fn default() -> Self {
        Self {
            view_mode: DebugViewMode::Final,
            draw_flags: 0,
            texture_flags: 0,
            probe_pixel: [-1, -1],
        }
    }
}

/// The single shared probe slot. Overwritten by the probe pixel on hit,
/// reset to defaults on miss; last write in the dispatch wins. The host
/// guarantees at most one in-flight pixel maps to the probe coordinate.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DebugProbe {
    pub instance_custom_index: u32,
    pub ray_distance: f32,
    pub tex_coords: Vec2,
    pub base_color_texture: u32,
    pub normal_texture: u32,
    pub position_world: Vec3,
    pub flat_normal: Vec3,
}
