//! Whole-frame scenarios against the software tracer.

use glam::{Mat4, Quat, UVec2, Vec2, Vec3, Vec4};
use primary_visibility::{
    fill_pixel, render, DebugLineBuffer, FrameInput, GBuffer, SceneBindings, SoftwareTlas,
    Texture, TlasInstance,
};
use shared_structs::{
    pack_quat, pack_unorm, unpack_snorm, unpack_unorm, Camera, DebugParams, DebugProbe,
    DebugViewMode, HitEntry, Transform, Vertex, DRAW_FLAG_GEOMETRY, DRAW_FLAG_NORMALS,
    DRAW_FLAG_SPACE, NO_INDEX_BUFFER, TEXTURE_OVERRIDE_NORMAL,
};
use rand::Rng;
use std::f32::consts::PI;
use std::sync::Mutex;

// Odd target size so the center pixel's ray is exactly on-axis.
const SIZE: u32 = 63;

fn center() -> UVec2 {
    UVec2::new(SIZE / 2, SIZE / 2)
}

/// Camera at the origin looking down -Z.
fn test_camera() -> Camera {
    Camera {
        position: Vec3::ZERO,
        depth: 100.0,
        orientation: Quat::from_rotation_y(PI),
        fov_y: 1.0,
        target_size: UVec2::new(SIZE, SIZE),
    }
}

/// Quad in the local XY plane, normals +Z, tangents +X. Offset so the
/// center ray hits a triangle interior rather than the shared diagonal.
fn quad_positions() -> [Vec3; 4] {
    [
        Vec3::new(-1.5, -1.5, 0.0),
        Vec3::new(2.5, -1.5, 0.0),
        Vec3::new(-1.5, 2.5, 0.0),
        Vec3::new(2.5, 2.5, 0.0),
    ]
}

fn quad_vertex(position: Vec3) -> Vertex {
    Vertex::new(
        position,
        Vec3::Z,
        Vec3::X,
        1.0,
        Vec2::new(position.x * 0.25, position.y * 0.25),
    )
}

// Winding chosen so the flat normal comes out as +Z with winding = 1.
fn quad_indices() -> Vec<u32> {
    vec![0, 1, 2, 2, 1, 3]
}

struct QuadScene {
    winding: f32,
    transform: Mat4,
    indexed: bool,
    base_color_factor: u32,
    base_color_texture: Texture,
    normal_texture: Texture,
    normal_scale: f32,
}

impl Default for QuadScene {
    fn default() -> Self {
        Self {
            winding: 1.0,
            transform: Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)),
            indexed: true,
            base_color_factor: pack_unorm(Vec4::ONE),
            base_color_texture: Texture::solid(Vec4::ONE),
            normal_texture: Texture::solid(Vec4::new(0.5, 0.5, 1.0, 1.0)),
            normal_scale: 1.0,
        }
    }
}

impl QuadScene {
    fn build(self) -> (SceneBindings, SoftwareTlas) {
        let positions = quad_positions();
        let vertices = if self.indexed {
            positions.iter().copied().map(quad_vertex).collect()
        } else {
            quad_indices()
                .into_iter()
                .map(|index| quad_vertex(positions[index as usize]))
                .collect()
        };

        let bindings = SceneBindings {
            hit_entries: vec![HitEntry {
                index_buffer: if self.indexed { 0 } else { NO_INDEX_BUFFER },
                vertex_buffer: 0,
                winding: self.winding,
                geometry_to_world_rotation: pack_quat(quat_of(self.transform)),
                geometry_to_object: Transform::IDENTITY,
                prev_object_to_world: Transform::from_mat4(self.transform),
                base_color_texture: 0,
                normal_texture: 1,
                base_color_factor: self.base_color_factor,
                normal_scale: self.normal_scale,
            }],
            vertex_buffers: vec![vertices],
            index_buffers: vec![quad_indices()],
            textures: vec![self.base_color_texture, self.normal_texture],
        };

        let instances = [TlasInstance {
            transform: Transform::from_mat4(self.transform),
            instance_custom_index: 0,
            geometry_count: 1,
        }];
        let tlas = SoftwareTlas::build(&bindings, &instances);
        (bindings, tlas)
    }
}

fn quat_of(transform: Mat4) -> Quat {
    let (_, rotation, _) = transform.to_scale_rotation_translation();
    rotation
}

fn flat_debug() -> DebugParams {
    DebugParams {
        texture_flags: TEXTURE_OVERRIDE_NORMAL,
        ..Default::default()
    }
}

fn render_scene(
    bindings: &SceneBindings,
    tlas: &SoftwareTlas,
    debug: &DebugParams,
    probe: &Mutex<DebugProbe>,
    lines: &DebugLineBuffer,
    gbuffer: &mut GBuffer,
) {
    let camera = test_camera();
    let frame = FrameInput {
        accel: tlas,
        bindings,
        camera: &camera,
        prev_camera: &camera,
        debug,
        probe,
        lines,
    };
    render(&frame, gbuffer);
}

fn decoded_flat_normal(gbuffer: &GBuffer, pixel: UVec2) -> Vec3 {
    unpack_snorm(gbuffer.flat_normal.get(pixel)).truncate()
}

#[test]
fn out_of_canvas_pixels_produce_no_output() {
    let (bindings, tlas) = QuadScene::default().build();
    let camera = test_camera();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let debug = flat_debug();
    let frame = FrameInput {
        accel: &tlas,
        bindings: &bindings,
        camera: &camera,
        prev_camera: &camera,
        debug: &debug,
        probe: &probe,
        lines: &lines,
    };

    for &(x, y) in &[(SIZE, 0), (0, SIZE), (SIZE, SIZE), (1000, 1000)] {
        assert!(fill_pixel(&frame, UVec2::new(x, y)).is_none());
    }
    assert!(fill_pixel(&frame, center()).is_some());
}

#[test]
fn miss_pixels_write_documented_defaults() {
    let (bindings, _) = QuadScene::default().build();
    let tlas = SoftwareTlas::build(&bindings, &[]);
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);

    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));
    gbuffer.depth.fill(-1.0);
    gbuffer.basis.fill(0xdead_beef);
    gbuffer.flat_normal.fill(0xdead_beef);
    gbuffer.albedo.fill(0);
    gbuffer.motion.fill([5, -5]);

    render_scene(&bindings, &tlas, &flat_debug(), &probe, &lines, &mut gbuffer);

    for &texel in gbuffer.depth.texels() {
        assert_eq!(texel, 0.0);
    }
    for &texel in gbuffer.basis.texels() {
        assert_eq!(texel, 0);
    }
    for &texel in gbuffer.flat_normal.texels() {
        assert_eq!(texel, 0);
    }
    for &texel in gbuffer.albedo.texels() {
        assert_eq!(texel, 0xffff_ffff);
    }
    for &texel in gbuffer.motion.texels() {
        assert_eq!(texel, [0, 0]);
    }
}

#[test]
fn perpendicular_quad_hit_fills_expected_values() {
    let (bindings, tlas) = QuadScene::default().build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));

    render_scene(&bindings, &tlas, &flat_debug(), &probe, &lines, &mut gbuffer);

    // Depth is the ray-to-plane distance.
    assert!((gbuffer.depth.get(center()) - 5.0).abs() < 1.0e-3);

    // Flat normal faces the camera and is unit length.
    let flat = decoded_flat_normal(&gbuffer, center());
    assert!((flat - Vec3::Z).length() < 0.02);

    // With a flat normal map the shading normal equals the flat normal, so
    // the basis quaternion is the identity.
    let basis = unpack_snorm(gbuffer.basis.get(center()));
    assert_eq!(basis, Vec4::new(0.0, 0.0, 0.0, 1.0));

    // White factor on a white texture.
    assert_eq!(gbuffer.albedo.get(center()), 0xffff_ffff);

    // Static scene, static camera.
    assert_eq!(gbuffer.motion.get(center()), [0, 0]);
}

#[test]
fn motion_is_zero_everywhere_for_a_static_scene() {
    let (bindings, tlas) = QuadScene::default().build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));

    render_scene(&bindings, &tlas, &flat_debug(), &probe, &lines, &mut gbuffer);

    let mut hits = 0;
    for y in 0..SIZE {
        for x in 0..SIZE {
            let pixel = UVec2::new(x, y);
            if gbuffer.depth.get(pixel) > 0.0 {
                hits += 1;
                assert_eq!(gbuffer.motion.get(pixel), [0, 0], "pixel {:?}", pixel);
            }
        }
    }
    assert!(hits > 100, "expected the quad to cover the target center");
}

#[test]
fn motion_stays_zero_under_random_static_transforms() {
    let mut rng = rand::thread_rng();
    for _ in 0..8 {
        let rotation = Quat::from_rotation_y(rng.gen_range(-0.4..0.4))
            * Quat::from_rotation_x(rng.gen_range(-0.4..0.4));
        let translation = Vec3::new(
            rng.gen_range(-0.5..0.5),
            rng.gen_range(-0.5..0.5),
            rng.gen_range(-7.0..-4.0),
        );
        let transform = Mat4::from_rotation_translation(rotation, translation);
        let (bindings, tlas) = QuadScene {
            transform,
            ..Default::default()
        }
        .build();
        let probe = Mutex::new(DebugProbe::default());
        let lines = DebugLineBuffer::new(16);
        let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));

        render_scene(&bindings, &tlas, &flat_debug(), &probe, &lines, &mut gbuffer);

        let mut hits = 0;
        for y in 0..SIZE {
            for x in 0..SIZE {
                let pixel = UVec2::new(x, y);
                if gbuffer.depth.get(pixel) > 0.0 {
                    hits += 1;
                    assert_eq!(
                        gbuffer.motion.get(pixel),
                        [0, 0],
                        "pixel {:?}, transform {:?}",
                        pixel,
                        transform
                    );
                }
            }
        }
        assert!(hits > 0, "quad missed the target for {:?}", transform);
    }
}

#[test]
fn basis_encodes_a_camera_averted_shading_normal() {
    // A half-turn instance puts the shading normal opposite the canonical
    // +Z, the worst case for the shortest-arc basis encoding.
    let rotated =
        Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)) * Mat4::from_rotation_y(PI);
    let (bindings, tlas) = QuadScene {
        transform: rotated,
        ..Default::default()
    }
    .build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));

    render_scene(&bindings, &tlas, &flat_debug(), &probe, &lines, &mut gbuffer);

    let flat = decoded_flat_normal(&gbuffer, center());
    assert!((flat + Vec3::Z).length() < 0.02);

    // The stored basis still rotates +Z onto the (near-antipodal) shading
    // normal after quantization.
    let basis = unpack_snorm(gbuffer.basis.get(center()));
    let basis = Quat::from_xyzw(basis.x, basis.y, basis.z, basis.w).normalize();
    let rotated_z = basis * Vec3::Z;
    assert!((rotated_z + Vec3::Z).length() < 0.05, "basis {:?}", basis);
}

#[test]
fn winding_flip_negates_the_flat_normal() {
    let (bindings, tlas) = QuadScene {
        winding: -1.0,
        ..Default::default()
    }
    .build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));

    render_scene(&bindings, &tlas, &flat_debug(), &probe, &lines, &mut gbuffer);
    let flat = decoded_flat_normal(&gbuffer, center());
    assert!((flat + Vec3::Z).length() < 0.02);
}

#[test]
fn half_turn_rotation_negates_the_flat_normal_and_winding_restores_it() {
    let rotated =
        Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)) * Mat4::from_rotation_y(PI);

    let (bindings, tlas) = QuadScene {
        transform: rotated,
        ..Default::default()
    }
    .build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));
    render_scene(&bindings, &tlas, &flat_debug(), &probe, &lines, &mut gbuffer);
    let flat = decoded_flat_normal(&gbuffer, center());
    assert!((flat + Vec3::Z).length() < 0.02);

    let (bindings, tlas) = QuadScene {
        transform: rotated,
        winding: -1.0,
        ..Default::default()
    }
    .build();
    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));
    render_scene(&bindings, &tlas, &flat_debug(), &probe, &lines, &mut gbuffer);
    let flat = decoded_flat_normal(&gbuffer, center());
    assert!((flat - Vec3::Z).length() < 0.02);
}

#[test]
fn mirrored_instance_with_negative_winding_keeps_the_flat_normal() {
    let mirrored =
        Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)) * Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));

    let (bindings, tlas) = QuadScene {
        transform: mirrored,
        winding: -1.0,
        ..Default::default()
    }
    .build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));

    render_scene(&bindings, &tlas, &flat_debug(), &probe, &lines, &mut gbuffer);
    let flat = decoded_flat_normal(&gbuffer, center());
    assert!((flat - Vec3::Z).length() < 0.02);
}

#[test]
fn unindexed_geometry_resolves_sequential_triangles() {
    let (bindings, tlas) = QuadScene {
        indexed: false,
        ..Default::default()
    }
    .build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));

    render_scene(&bindings, &tlas, &flat_debug(), &probe, &lines, &mut gbuffer);
    assert!((gbuffer.depth.get(center()) - 5.0).abs() < 1.0e-3);
    let flat = decoded_flat_normal(&gbuffer, center());
    assert!((flat - Vec3::Z).length() < 0.02);
}

#[test]
fn albedo_factor_view_mode_reproduces_the_packed_factor() {
    let factor = pack_unorm(Vec4::new(0.25, 0.5, 0.75, 1.0));
    let (bindings, tlas) = QuadScene {
        base_color_factor: factor,
        base_color_texture: Texture::solid(Vec4::new(0.5, 0.5, 0.5, 1.0)),
        ..Default::default()
    }
    .build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let debug = DebugParams {
        view_mode: DebugViewMode::DiffuseAlbedoFactor,
        texture_flags: TEXTURE_OVERRIDE_NORMAL,
        ..Default::default()
    };
    let mut gbuffer = GBuffer::with_debug_view(UVec2::new(SIZE, SIZE));

    render_scene(&bindings, &tlas, &debug, &probe, &lines, &mut gbuffer);

    let debug_view = gbuffer.debug_view.as_ref().unwrap();
    // Bit-exact: the factor bypasses texture sampling entirely.
    assert_eq!(debug_view.get(center()), factor);
    // While the main albedo channel still has the texture multiplied in.
    let albedo = unpack_unorm(gbuffer.albedo.get(center()));
    assert!((albedo.x - 0.125).abs() < 0.01);
}

#[test]
fn shading_normal_follows_the_normal_map() {
    // A normal map pushed fully towards +U tilts the shading normal onto
    // the tangent axis, world +X for this quad.
    let (bindings, tlas) = QuadScene {
        normal_texture: Texture::solid(Vec4::new(1.0, 0.5, 0.0, 1.0)),
        ..Default::default()
    }
    .build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let debug = DebugParams {
        view_mode: DebugViewMode::ShadingNormal,
        ..Default::default()
    };
    let mut gbuffer = GBuffer::with_debug_view(UVec2::new(SIZE, SIZE));

    render_scene(&bindings, &tlas, &debug, &probe, &lines, &mut gbuffer);

    let color = unpack_unorm(gbuffer.debug_view.as_ref().unwrap().get(center()));
    let direction = (color.truncate() * 2.0 - Vec3::ONE).normalize();
    assert!((direction - Vec3::X).length() < 0.05);
}

#[test]
fn zero_normal_scale_degenerates_to_the_geometry_normal() {
    let (bindings, tlas) = QuadScene {
        normal_texture: Texture::solid(Vec4::new(1.0, 0.0, 0.0, 1.0)),
        normal_scale: 0.0,
        ..Default::default()
    }
    .build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let debug = DebugParams {
        view_mode: DebugViewMode::ShadingNormal,
        ..Default::default()
    };
    let mut gbuffer = GBuffer::with_debug_view(UVec2::new(SIZE, SIZE));

    render_scene(&bindings, &tlas, &debug, &probe, &lines, &mut gbuffer);

    let color = unpack_unorm(gbuffer.debug_view.as_ref().unwrap().get(center()));
    let direction = (color.truncate() * 2.0 - Vec3::ONE).normalize();
    assert!((direction - Vec3::Z).length() < 0.05);
}

#[test]
fn probe_records_the_hit_and_resets_on_miss() {
    let (bindings, tlas) = QuadScene::default().build();
    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let debug = DebugParams {
        probe_pixel: [center().x as i32, center().y as i32],
        texture_flags: TEXTURE_OVERRIDE_NORMAL,
        ..Default::default()
    };
    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));

    render_scene(&bindings, &tlas, &debug, &probe, &lines, &mut gbuffer);
    {
        let recorded = *probe.lock().unwrap();
        assert_eq!(recorded.instance_custom_index, 0);
        assert!((recorded.ray_distance - 5.0).abs() < 1.0e-3);
        assert!((recorded.position_world - Vec3::new(0.0, 0.0, -5.0)).length() < 1.0e-3);
        assert!((recorded.flat_normal - Vec3::Z).length() < 1.0e-3);
        assert_eq!(recorded.base_color_texture, 0);
        assert_eq!(recorded.normal_texture, 1);
    }

    // The quad does not reach the target corner; the probe resets there.
    let debug = DebugParams {
        probe_pixel: [0, 0],
        texture_flags: TEXTURE_OVERRIDE_NORMAL,
        ..Default::default()
    };
    render_scene(&bindings, &tlas, &debug, &probe, &lines, &mut gbuffer);
    assert_eq!(*probe.lock().unwrap(), DebugProbe::default());
}

#[test]
fn draw_flags_submit_the_expected_line_counts() {
    let (bindings, tlas) = QuadScene::default().build();
    let probe = Mutex::new(DebugProbe::default());
    let mut gbuffer = GBuffer::new(UVec2::new(SIZE, SIZE));

    let cases = [
        (DRAW_FLAG_SPACE, 3),
        (DRAW_FLAG_NORMALS, 3),
        (DRAW_FLAG_GEOMETRY, 4),
        (DRAW_FLAG_SPACE | DRAW_FLAG_NORMALS | DRAW_FLAG_GEOMETRY, 10),
    ];
    for &(draw_flags, expected) in &cases {
        let lines = DebugLineBuffer::new(64);
        let debug = DebugParams {
            probe_pixel: [center().x as i32, center().y as i32],
            draw_flags,
            texture_flags: TEXTURE_OVERRIDE_NORMAL,
            ..Default::default()
        };
        render_scene(&bindings, &tlas, &debug, &probe, &lines, &mut gbuffer);
        assert_eq!(lines.len(), expected, "flags {:#b}", draw_flags);

        // All lines live near the hit; nothing degenerate slipped in.
        for line in lines.take() {
            assert!(line.from.position.is_finite() && line.to.position.is_finite());
            assert!((line.from.position.z + 5.0).abs() < 2.0);
        }
    }
}

#[test]
fn nearest_hit_wins_and_far_depth_bounds_the_ray() {
    // Two camera-facing quads; the closer one must win.
    let near = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
    let far = Mat4::from_translation(Vec3::new(0.0, 0.0, -8.0));

    let entry = |prev: Mat4| HitEntry {
        index_buffer: 0,
        vertex_buffer: 0,
        winding: 1.0,
        geometry_to_world_rotation: pack_quat(Quat::IDENTITY),
        geometry_to_object: Transform::IDENTITY,
        prev_object_to_world: Transform::from_mat4(prev),
        base_color_texture: 0,
        normal_texture: 1,
        base_color_factor: pack_unorm(Vec4::ONE),
        normal_scale: 1.0,
    };

    let bindings = SceneBindings {
        hit_entries: vec![entry(near), entry(far)],
        vertex_buffers: vec![quad_positions().iter().copied().map(quad_vertex).collect()],
        index_buffers: vec![quad_indices()],
        textures: vec![
            Texture::solid(Vec4::ONE),
            Texture::solid(Vec4::new(0.5, 0.5, 1.0, 1.0)),
        ],
    };
    let instances = [
        TlasInstance {
            transform: Transform::from_mat4(near),
            instance_custom_index: 0,
            geometry_count: 1,
        },
        TlasInstance {
            transform: Transform::from_mat4(far),
            instance_custom_index: 1,
            geometry_count: 1,
        },
    ];
    let tlas = SoftwareTlas::build(&bindings, &instances);

    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(16);
    let debug = flat_debug();
    let mut camera = test_camera();
    let frame = FrameInput {
        accel: &tlas,
        bindings: &bindings,
        camera: &camera,
        prev_camera: &camera,
        debug: &debug,
        probe: &probe,
        lines: &lines,
    };
    let output = fill_pixel(&frame, center()).unwrap();
    assert!((output.depth - 5.0).abs() < 1.0e-3);

    // With the far plane closer than both quads, the ray terminates as a
    // miss and the defaults come back.
    camera.depth = 3.0;
    let frame = FrameInput {
        accel: &tlas,
        bindings: &bindings,
        camera: &camera,
        prev_camera: &camera,
        debug: &debug,
        probe: &probe,
        lines: &lines,
    };
    let output = fill_pixel(&frame, center()).unwrap();
    assert_eq!(output.depth, 0.0);
    assert_eq!(output.albedo, Vec4::ONE);
}
