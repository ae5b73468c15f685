//! CPU textures with the two fixed samplers the kernel is given.
//!
//! Sampling always reads mip level 0. Proper level selection for primary
//! hits is a known limitation of the pass, not something to re-derive here.

use glam::{UVec2, Vec2, Vec4};
use shared_structs::{pack_unorm, unpack_unorm};

/// The two fixed samplers. `Nearest` is reserved; the kernel itself only
/// samples with `Linear`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    Linear,
    Nearest,
}

/// An rgba8-unorm image with repeat addressing.
pub struct Texture {
    size: UVec2,
    texels: Vec<u32>,
}

impl Texture {
    pub fn new(size: UVec2, texels: Vec<u32>) -> Self {
        assert_eq!(texels.len(), (size.x * size.y) as usize);
        Self { size, texels }
    }

    pub fn solid(color: Vec4) -> Self {
        Self::new(UVec2::new(1, 1), vec![pack_unorm(color)])
    }

    pub fn checkerboard(cells: u32, even: Vec4, odd: Vec4) -> Self {
        let size = UVec2::new(cells, cells);
        let texels = (0..cells * cells)
            .map(|i| {
                let (x, y) = (i % cells, i / cells);
                pack_unorm(if (x + y) % 2 == 0 { even } else { odd })
            })
            .collect();
        Self::new(size, texels)
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    fn texel(&self, x: i32, y: i32) -> Vec4 {
        let x = x.rem_euclid(self.size.x as i32) as u32;
        let y = y.rem_euclid(self.size.y as i32) as u32;
        unpack_unorm(self.texels[(y * self.size.x + x) as usize])
    }

    /// Samples at mip level 0.
    pub fn sample(&self, uv: Vec2, filter: Filter) -> Vec4 {
        let scaled = uv * self.size.as_f32();

        match filter {
            Filter::Nearest => self.texel(scaled.x.floor() as i32, scaled.y.floor() as i32),
            Filter::Linear => {
                let base = scaled - Vec2::splat(0.5);
                let x = base.x.floor();
                let y = base.y.floor();
                let fx = base.x - x;
                let fy = base.y - y;
                let (x, y) = (x as i32, y as i32);

                let top = self.texel(x, y) * (1.0 - fx) + self.texel(x + 1, y) * fx;
                let bottom = self.texel(x, y + 1) * (1.0 - fx) + self.texel(x + 1, y + 1) * fx;
                top * (1.0 - fy) + bottom * fy
            }
        }
    }
}
