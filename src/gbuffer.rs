//! G-buffer image planes and the per-pixel writer.

use crate::motion::MOTION_SCALE;
use glam::{UVec2, Vec2, Vec3, Vec4};
use shared_structs::{pack_snorm, pack_unorm};

/// A single image plane addressed by integer pixel coordinate.
pub struct Image2D<T> {
    size: UVec2,
    texels: Vec<T>,
}

impl<T: Copy> Image2D<T> {
    pub fn new(size: UVec2, fill: T) -> Self {
        Self {
            size,
            texels: vec![fill; (size.x * size.y) as usize],
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn get(&self, pixel: UVec2) -> T {
        self.texels[(pixel.y * self.size.x + pixel.x) as usize]
    }

    pub fn put(&mut self, pixel: UVec2, texel: T) {
        self.texels[(pixel.y * self.size.x + pixel.x) as usize] = texel;
    }

    pub fn fill(&mut self, texel: T) {
        for slot in &mut self.texels {
            *slot = texel;
        }
    }

    pub fn texels(&self) -> &[T] {
        &self.texels
    }
}

fn pack_component_snorm(value: f32) -> i8 {
    (value.max(-1.0).min(1.0) * 127.0).round() as i8
}

pub fn unpack_component_snorm(value: i8) -> f32 {
    (value as f32 / 127.0).max(-1.0)
}

/// The five always-present output channels plus the optional debug view,
/// stored in their wire formats. Fully overwritten every frame.
pub struct GBuffer {
    /// Linear depth, ray distance or 0.
    pub depth: Image2D<f32>,
    /// snorm8x4 shortest-arc basis quaternion.
    pub basis: Image2D<u32>,
    /// snorm8x4 flat geometric normal.
    pub flat_normal: Image2D<u32>,
    /// unorm8x4 albedo.
    pub albedo: Image2D<u32>,
    /// snorm8x2 motion vector, scaled by [`MOTION_SCALE`].
    pub motion: Image2D<[i8; 2]>,
    /// unorm8x4 diagnostic channel; only written when bound.
    pub debug_view: Option<Image2D<u32>>,
}

impl GBuffer {
    pub fn new(size: UVec2) -> Self {
        Self {
            depth: Image2D::new(size, 0.0),
            basis: Image2D::new(size, 0),
            flat_normal: Image2D::new(size, 0),
            albedo: Image2D::new(size, 0),
            motion: Image2D::new(size, [0, 0]),
            debug_view: None,
        }
    }

    pub fn with_debug_view(size: UVec2) -> Self {
        let mut gbuffer = Self::new(size);
        gbuffer.debug_view = Some(Image2D::new(size, 0));
        gbuffer
    }

    /// Writes every channel for one pixel. Each pixel's writes are disjoint
    /// from every other pixel's, so no ordering between pixels is needed.
    pub fn store(&mut self, pixel: UVec2, output: &PixelOutput) {
        self.depth.put(pixel, output.depth);
        self.basis.put(pixel, pack_snorm(output.basis));
        self.flat_normal
            .put(pixel, pack_snorm(output.flat_normal.extend(0.0)));
        self.albedo.put(pixel, pack_unorm(output.albedo));

        let motion = output.motion * MOTION_SCALE;
        self.motion.put(
            pixel,
            [
                pack_component_snorm(motion.x),
                pack_component_snorm(motion.y),
            ],
        );

        if let Some(image) = self.debug_view.as_mut() {
            image.put(pixel, pack_unorm(output.debug_view));
        }
    }
}

/// Unpacked per-pixel result of the kernel, before wire-format encoding.
#[derive(Copy, Clone, Debug)]
pub struct PixelOutput {
    pub depth: f32,
    pub basis: Vec4,
    pub flat_normal: Vec3,
    pub albedo: Vec4,
    /// Raw motion in pixels; the writer applies [`MOTION_SCALE`].
    pub motion: Vec2,
    pub debug_view: Vec4,
}

impl PixelOutput {
    /// The documented defaults written on a ray miss.
    pub fn miss() -> Self {
        Self {
            depth: 0.0,
            basis: Vec4::ZERO,
            flat_normal: Vec3::ZERO,
            albedo: Vec4::ONE,
            motion: Vec2::ZERO,
            debug_view: Vec4::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_snorm_round_trips_and_clamps() {
        for &value in &[-1.0, -0.5, 0.0, 0.25, 1.0] {
            let decoded = unpack_component_snorm(pack_component_snorm(value));
            assert!((decoded - value).abs() <= 0.5 / 127.0);
        }
        // Saturation at both ends, and -128 decodes back to exactly -1.
        assert_eq!(pack_component_snorm(3.0), 127);
        assert_eq!(pack_component_snorm(-3.0), -127);
        assert_eq!(unpack_component_snorm(-128), -1.0);
    }
}
