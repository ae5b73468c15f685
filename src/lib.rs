//! Primary-visibility pass of a ray-traced deferred renderer.
//!
//! For every output pixel: cast one nearest-hit ray, resolve the surface
//! under the hit, assemble its shading attributes, estimate motion by
//! reprojection, and write the five G-buffer channels. Misses write
//! well-defined defaults. An optional single-pixel probe and debug line
//! overlay ride along without touching the main path.
//!
//! The per-pixel kernel is [`fill_pixel`]; [`render`] dispatches it over a
//! tile grid with one independent worker per tile.

use glam::UVec2;
use rayon::prelude::*;
use shared_structs::{Camera, DebugParams, DebugProbe, DebugViewMode, HitEntry, Vertex};
use std::sync::Mutex;

pub mod accel;
pub mod debug;
pub mod gbuffer;
pub mod geometry;
pub mod motion;
pub mod ray_cast;
pub mod shading;
pub mod texture;

pub use crate::accel::{AccelerationStructure, Intersection, SoftwareTlas, TlasInstance, TriangleHit};
pub use crate::debug::{DebugLine, DebugLineBuffer};
pub use crate::gbuffer::{GBuffer, PixelOutput};
pub use crate::texture::{Filter, Texture};

/// Execution tile edge length for [`render`].
pub const TILE_SIZE: u32 = 8;

/// Per-instance binding arrays the kernel reads, prepared once per frame by
/// the scene side. Indices stored in [`HitEntry`] records must be in range;
/// the kernel does not defend against violations (see [`fetch`]).
pub struct SceneBindings {
    pub hit_entries: Vec<HitEntry>,
    pub vertex_buffers: Vec<Vec<Vertex>>,
    pub index_buffers: Vec<Vec<u32>>,
    pub textures: Vec<Texture>,
}

/// Trusted scene-buffer lookup. The default build keeps the bounds check as
/// a debugging aid; `trusted-indices` builds skip it on the hot path.
#[inline(always)]
pub(crate) fn fetch<T>(slice: &[T], index: u32) -> &T {
    debug_assert!((index as usize) < slice.len());
    #[cfg(feature = "trusted-indices")]
    let value = unsafe { slice.get_unchecked(index as usize) };
    #[cfg(not(feature = "trusted-indices"))]
    let value = &slice[index as usize];
    value
}

/// Everything one frame's dispatch reads and the two shared debug outputs it
/// may write. The probe slot's at-most-one-writer rule holds structurally:
/// only one pixel of the dispatch can match the probe coordinate.
pub struct FrameInput<'a> {
    pub accel: &'a dyn AccelerationStructure,
    pub bindings: &'a SceneBindings,
    pub camera: &'a Camera,
    pub prev_camera: &'a Camera,
    pub debug: &'a DebugParams,
    pub probe: &'a Mutex<DebugProbe>,
    pub lines: &'a DebugLineBuffer,
}

/// The kernel for one pixel. Returns `None` for pixels outside the target
/// resolution, in which case nothing at all is written; that is the normal
/// boundary case of a dispatch grid that is not a multiple of the tile size.
pub fn fill_pixel(frame: &FrameInput, pixel: UVec2) -> Option<PixelOutput> {
    if !frame.camera.contains(pixel) {
        return None;
    }

    let is_probe = frame.debug.is_probe(pixel);

    let hit = match ray_cast::cast_primary_ray(frame.accel, frame.camera, pixel) {
        Intersection::Miss => {
            if is_probe {
                debug::reset_probe(frame.probe);
            }
            return Some(PixelOutput::miss());
        }
        Intersection::Triangle(hit) => hit,
    };

    let surface = geometry::resolve_triangle(&hit, frame.bindings);
    if is_probe {
        debug::record_probe_hit(frame.probe, &hit, &surface);
    }

    let shading = shading::assemble(&surface, frame.bindings, frame.debug.texture_flags);
    let motion = motion::estimate(&surface, frame.prev_camera, pixel);

    if is_probe && frame.debug.draw_flags != 0 {
        debug::submit_lines(frame.lines, frame.debug.draw_flags, &hit, &surface, &shading);
    }

    let debug_view = if frame.debug.view_mode != DebugViewMode::Final {
        debug::view_color(
            frame.debug.view_mode,
            pixel,
            frame.camera,
            &hit,
            &surface,
            &shading,
            motion,
        )
    } else {
        glam::Vec4::ZERO
    };

    Some(PixelOutput {
        depth: hit.t,
        basis: shading.basis,
        flat_normal: surface.flat_normal,
        albedo: shading.albedo,
        motion,
        debug_view,
    })
}

/// Runs one frame: the kernel over every tile of the padded dispatch grid,
/// then the G-buffer writes. Pixels are fully independent; only the probe
/// slot and the line buffer are shared, and both are externally
/// synchronized.
pub fn render(frame: &FrameInput, gbuffer: &mut GBuffer) {
    let size = frame.camera.target_size;
    assert_eq!(gbuffer.depth.size(), size);

    let tiles_x = (size.x + TILE_SIZE - 1) / TILE_SIZE;
    let tiles_y = (size.y + TILE_SIZE - 1) / TILE_SIZE;
    log::debug!(
        "dispatching {}x{} tiles over a {}x{} target",
        tiles_x,
        tiles_y,
        size.x,
        size.y
    );

    let tiles: Vec<UVec2> = (0..tiles_y)
        .flat_map(|y| (0..tiles_x).map(move |x| UVec2::new(x, y)))
        .collect();

    let shards: Vec<Vec<(UVec2, PixelOutput)>> = tiles
        .into_par_iter()
        .map(|tile| {
            let mut outputs = Vec::with_capacity((TILE_SIZE * TILE_SIZE) as usize);
            for y in tile.y * TILE_SIZE..(tile.y + 1) * TILE_SIZE {
                for x in tile.x * TILE_SIZE..(tile.x + 1) * TILE_SIZE {
                    let pixel = UVec2::new(x, y);
                    if let Some(output) = fill_pixel(frame, pixel) {
                        outputs.push((pixel, output));
                    }
                }
            }
            outputs
        })
        .collect();

    for shard in shards {
        for (pixel, output) in shard {
            gbuffer.store(pixel, &output);
        }
    }
}
