//! Renders one frame of a small procedural scene with the software tracer
//! and writes every G-buffer channel out as a PNG.

use anyhow::Context;
use glam::{Mat3, Mat4, Quat, UVec2, Vec2, Vec3, Vec4};
use primary_visibility::gbuffer::unpack_component_snorm;
use primary_visibility::{
    render, DebugLineBuffer, FrameInput, GBuffer, SceneBindings, SoftwareTlas, Texture,
    TlasInstance,
};
use shared_structs::{
    pack_quat, pack_unorm, unpack_snorm, unpack_unorm, Camera, DebugParams, DebugProbe,
    DebugViewMode, HitEntry, Transform, Vertex, DRAW_FLAG_GEOMETRY, DRAW_FLAG_SPACE,
    NO_INDEX_BUFFER,
};
use std::path::PathBuf;
use std::sync::Mutex;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "render-gbuffer")]
struct Opt {
    #[structopt(long, default_value = "800")]
    width: u32,
    #[structopt(long, default_value = "600")]
    height: u32,
    /// What the auxiliary debug channel shows.
    #[structopt(long, default_value = "shading-normal", parse(try_from_str = parse_view_mode))]
    view_mode: DebugViewMode,
    /// Probe pixel; defaults to the target center.
    #[structopt(long)]
    probe_x: Option<i32>,
    #[structopt(long)]
    probe_y: Option<i32>,
    /// Filename prefix for the output images.
    #[structopt(long, default_value = "gbuffer")]
    output: PathBuf,
}

fn parse_view_mode(value: &str) -> anyhow::Result<DebugViewMode> {
    Ok(match value {
        "final" => DebugViewMode::Final,
        "albedo-texture" => DebugViewMode::DiffuseAlbedoTexture,
        "albedo-factor" => DebugViewMode::DiffuseAlbedoFactor,
        "normal-texture" => DebugViewMode::NormalTexture,
        "normal-scale" => DebugViewMode::NormalScale,
        "geometry-normal" => DebugViewMode::GeometryNormal,
        "shading-normal" => DebugViewMode::ShadingNormal,
        "hit-consistency" => DebugViewMode::HitConsistency,
        "motion" => DebugViewMode::Motion,
        other => anyhow::bail!("unknown view mode: {}", other),
    })
}

fn main() -> anyhow::Result<()> {
    simplelog::SimpleLogger::init(log::LevelFilter::Info, simplelog::Config::default())?;

    let opt = Opt::from_args();
    let size = UVec2::new(opt.width, opt.height);

    let (bindings, instances) = build_scene();
    let tlas = SoftwareTlas::build(&bindings, &instances);

    let camera = Camera {
        position: Vec3::new(3.0, 2.5, -4.0),
        depth: 100.0,
        orientation: look_at(Vec3::new(3.0, 2.5, -4.0), Vec3::new(0.0, 0.5, 0.0)),
        fov_y: 1.0,
        target_size: size,
    };

    let debug = DebugParams {
        view_mode: opt.view_mode,
        draw_flags: DRAW_FLAG_SPACE | DRAW_FLAG_GEOMETRY,
        texture_flags: 0,
        probe_pixel: [
            opt.probe_x.unwrap_or(size.x as i32 / 2),
            opt.probe_y.unwrap_or(size.y as i32 / 2),
        ],
    };

    let probe = Mutex::new(DebugProbe::default());
    let lines = DebugLineBuffer::new(64);

    let frame = FrameInput {
        accel: &tlas,
        bindings: &bindings,
        camera: &camera,
        // The scene is static, so last frame's camera is this frame's.
        prev_camera: &camera,
        debug: &debug,
        probe: &probe,
        lines: &lines,
    };

    let mut gbuffer = GBuffer::with_debug_view(size);
    let start = std::time::Instant::now();
    render(&frame, &mut gbuffer);
    log::info!(
        "rendered {}x{} in {:.1} ms",
        size.x,
        size.y,
        start.elapsed().as_secs_f32() * 1000.0
    );
    log::info!("probe: {:?}", *probe.lock().unwrap());
    log::info!("debug lines submitted: {}", lines.len());

    save_images(&opt.output, &camera, &gbuffer)
}

fn look_at(eye: Vec3, target: Vec3) -> Quat {
    let forward = (target - eye).normalize();
    let right = Vec3::Y.cross(forward).normalize();
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, forward))
}

fn save_images(prefix: &PathBuf, camera: &Camera, gbuffer: &GBuffer) -> anyhow::Result<()> {
    let size = gbuffer.depth.size();

    let save = |suffix: &str, texel: &dyn Fn(UVec2) -> [u8; 4]| -> anyhow::Result<()> {
        let image = image::RgbaImage::from_fn(size.x, size.y, |x, y| {
            image::Rgba(texel(UVec2::new(x, y)))
        });
        let path = format!("{}-{}.png", prefix.display(), suffix);
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path))?;
        log::info!("wrote {}", path);
        Ok(())
    };

    let bytes = |color: Vec4| {
        let packed = pack_unorm(color);
        [
            packed as u8,
            (packed >> 8) as u8,
            (packed >> 16) as u8,
            (packed >> 24) as u8 | 0xff,
        ]
    };

    save("depth", &|pixel| {
        let depth = gbuffer.depth.get(pixel) / camera.depth;
        bytes(Vec4::new(depth, depth, depth, 1.0))
    })?;
    save("albedo", &|pixel| {
        bytes(unpack_unorm(gbuffer.albedo.get(pixel)))
    })?;
    save("flat-normal", &|pixel| {
        let normal = unpack_snorm(gbuffer.flat_normal.get(pixel));
        bytes(normal * 0.5 + Vec4::splat(0.5))
    })?;
    save("basis", &|pixel| {
        let basis = unpack_snorm(gbuffer.basis.get(pixel));
        bytes(basis * 0.5 + Vec4::splat(0.5))
    })?;
    save("motion", &|pixel| {
        let [x, y] = gbuffer.motion.get(pixel);
        bytes(Vec4::new(
            unpack_component_snorm(x) * 0.5 + 0.5,
            unpack_component_snorm(y) * 0.5 + 0.5,
            0.5,
            1.0,
        ))
    })?;
    if let Some(debug_view) = &gbuffer.debug_view {
        save("debug", &|pixel| bytes(unpack_unorm(debug_view.get(pixel))))?;
    }

    Ok(())
}

fn build_scene() -> (SceneBindings, Vec<TlasInstance>) {
    // A checkered floor quad and a rotated cube on top of it.
    let floor_half = 6.0;
    let floor_vertices = vec![
        floor_vertex(-floor_half, -floor_half, 0.0, 0.0),
        floor_vertex(floor_half, -floor_half, 4.0, 0.0),
        floor_vertex(-floor_half, floor_half, 0.0, 4.0),
        floor_vertex(floor_half, floor_half, 4.0, 4.0),
    ];
    let floor_indices = vec![0, 2, 1, 1, 2, 3];

    let cube_rotation = Quat::from_rotation_y(0.6);
    let cube_transform =
        Mat4::from_rotation_translation(cube_rotation, Vec3::new(0.0, 0.75, 0.0));

    let hit_entries = vec![
        HitEntry {
            index_buffer: 0,
            vertex_buffer: 0,
            winding: 1.0,
            geometry_to_world_rotation: pack_quat(Quat::IDENTITY),
            geometry_to_object: Transform::IDENTITY,
            prev_object_to_world: Transform::IDENTITY,
            base_color_texture: 0,
            normal_texture: 1,
            base_color_factor: pack_unorm(Vec4::ONE),
            normal_scale: 1.0,
        },
        HitEntry {
            index_buffer: NO_INDEX_BUFFER,
            vertex_buffer: 1,
            winding: 1.0,
            geometry_to_world_rotation: pack_quat(cube_rotation),
            geometry_to_object: Transform::IDENTITY,
            prev_object_to_world: Transform::from_mat4(cube_transform),
            base_color_texture: 2,
            normal_texture: 1,
            base_color_factor: pack_unorm(Vec4::new(0.8, 0.3, 0.2, 1.0)),
            normal_scale: 1.0,
        },
    ];

    let bindings = SceneBindings {
        hit_entries,
        vertex_buffers: vec![floor_vertices, cube_vertices(0.75)],
        index_buffers: vec![floor_indices],
        textures: vec![
            Texture::checkerboard(
                8,
                Vec4::new(0.9, 0.9, 0.9, 1.0),
                Vec4::new(0.4, 0.4, 0.4, 1.0),
            ),
            // Neutral normal map: (0.5, 0.5) decodes to local +Z.
            Texture::solid(Vec4::new(0.5, 0.5, 1.0, 1.0)),
            Texture::solid(Vec4::ONE),
        ],
    };

    let instances = vec![
        TlasInstance {
            transform: Transform::IDENTITY,
            instance_custom_index: 0,
            geometry_count: 1,
        },
        TlasInstance {
            transform: Transform::from_mat4(cube_transform),
            instance_custom_index: 1,
            geometry_count: 1,
        },
    ];

    (bindings, instances)
}

fn floor_vertex(x: f32, z: f32, u: f32, v: f32) -> Vertex {
    Vertex::new(
        Vec3::new(x, 0.0, z),
        Vec3::Y,
        Vec3::X,
        1.0,
        Vec2::new(u, v),
    )
}

/// Six faces of 6 sequential vertices each, outward winding, no index
/// buffer.
fn cube_vertices(half: f32) -> Vec<Vertex> {
    let faces = [
        (Vec3::X, Vec3::Z),
        (-Vec3::X, Vec3::Z),
        (Vec3::Y, Vec3::X),
        (-Vec3::Y, Vec3::X),
        (Vec3::Z, Vec3::X),
        (-Vec3::Z, Vec3::X),
    ];

    let mut vertices = Vec::with_capacity(36);
    for &(normal, tangent) in &faces {
        let across = tangent.cross(normal);
        let corner = |u: f32, v: f32| {
            Vertex::new(
                (normal + tangent * (u * 2.0 - 1.0) + across * (v * 2.0 - 1.0)) * half,
                normal,
                tangent,
                1.0,
                Vec2::new(u, v),
            )
        };
        let (c00, c01, c10, c11) = (corner(0.0, 0.0), corner(0.0, 1.0), corner(1.0, 0.0), corner(1.0, 1.0));
        vertices.extend_from_slice(&[c00, c01, c10, c10, c01, c11]);
    }
    vertices
}
