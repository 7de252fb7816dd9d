//! Color-id picking.
//!
//! Every pickable draw gets a flat color encoding `index + 1` in its RGB
//! bytes; black means "nothing". After the pass one pixel is read back
//! under the cursor and decoded to the index again.

use crate::environment::{ColorFormat, Environment, SingleFramebuffer};
use crate::error::Result;
use glam::{UVec2, Vec2, Vec3, Vec4};

// ========================================================================
// PickId, 24-bit index packed as R = bits 16..24, G = 8..16, B = 0..8
// ========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PickId(u32);

impl PickId {
    pub const NONE: Self = Self(0);
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Id for the `index`-th pickable draw. `None` past the 24-bit range.
    pub fn from_index(index: usize) -> Option<Self> {
        let id = u32::try_from(index).ok()?.checked_add(1)?;
        (id <= Self::MAX).then_some(Self(id))
    }

    pub fn index(self) -> Option<usize> {
        (self.0 != 0).then(|| self.0 as usize - 1)
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn to_rgb(self) -> [u8; 3] {
        int_to_color(self.0)
    }

    /// Normalised color for the flat shader's `color` uniform.
    pub fn to_color(self) -> Vec3 {
        let [r, g, b] = self.to_rgb();
        Vec3::new(r as f32, g as f32, b as f32) / 255.0
    }

    pub fn from_rgba(rgba: [u8; 4]) -> Self {
        Self(((rgba[0] as u32) << 16) | ((rgba[1] as u32) << 8) | rgba[2] as u32)
    }
}

pub fn int_to_color(value: u32) -> [u8; 3] {
    [
        ((value >> 16) & 0xFF) as u8,
        ((value >> 8) & 0xFF) as u8,
        (value & 0xFF) as u8,
    ]
}

// ========================================================================
// ViewportRegion, where a camera image is shown inside the window
// ========================================================================

/// Window-space rectangle (top-left origin, pixels) that displays a
/// camera's image. Requests for picking and gizmo input carry one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRegion {
    pub pos: Vec2,
    pub size: Vec2,
}

impl ViewportRegion {
    pub fn new(pos: Vec2, size: Vec2) -> Self {
        Self { pos, size }
    }

    pub fn full(size: UVec2) -> Self {
        Self {
            pos: Vec2::ZERO,
            size: size.as_vec2(),
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        let rel = point - self.pos;
        rel.x >= 0.0 && rel.y >= 0.0 && rel.x < self.size.x && rel.y < self.size.y
    }

    /// Maps a window point into a `frame`-sized image, bottom-left origin.
    /// `None` when the point is outside the region.
    pub fn to_frame_pixel(&self, point: Vec2, frame: UVec2) -> Option<UVec2> {
        if !self.contains(point) || frame.x == 0 || frame.y == 0 {
            return None;
        }
        let uv = (point - self.pos) / self.size;
        let x = (uv.x * frame.x as f32) as u32;
        let y_top = (uv.y * frame.y as f32) as u32;
        Some(UVec2::new(
            x.min(frame.x - 1),
            frame.y - 1 - y_top.min(frame.y - 1),
        ))
    }

    /// Inverse of [`ViewportRegion::to_frame_pixel`] for top-left frame
    /// coordinates, e.g. the output of `Camera::world_to_screen_point`.
    pub fn from_frame_point(&self, point: Vec2, frame: UVec2) -> Vec2 {
        self.pos + point / frame.max(UVec2::ONE).as_vec2() * self.size
    }
}

// ========================================================================
// PickBuffer, the RGBA8 target the id pass renders into
// ========================================================================

#[derive(Debug, Default)]
pub struct PickBuffer {
    target: SingleFramebuffer,
}

impl PickBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> UVec2 {
        self.target.size
    }

    /// Binds the buffer at `size`, creating or resizing it first, and clears
    /// it to "nothing".
    pub fn begin(&mut self, env: &mut dyn Environment, size: UVec2) -> Result<()> {
        if self.target.is_new() || self.target.size != size {
            env.create_single_framebuffer(size, ColorFormat::Rgba8, &mut self.target)?;
        }
        env.bind_framebuffer(self.target.fbo);
        env.set_viewport(size);
        env.set_depth_test_enabled(true);
        env.clear_buffers(Vec4::ZERO);
        Ok(())
    }

    pub fn read(&self, env: &mut dyn Environment, pixel: UVec2) -> PickId {
        let rgba = env.read_pixel(self.target.fbo, pixel);
        env.bind_framebuffer(0);
        PickId::from_rgba(rgba)
    }

    pub fn free(&mut self, env: &mut dyn Environment) {
        self.target.free(env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_zero_is_not_background() {
        let id = PickId::from_index(0).unwrap();
        assert!(!id.is_none());
        assert_eq!(id.to_rgb(), [0, 0, 1]);
        assert_eq!(PickId::from_rgba([0, 0, 1, 255]).index(), Some(0));
        assert_eq!(PickId::from_rgba([0, 0, 0, 255]).index(), None);
    }

    #[test]
    fn channels_follow_byte_order() {
        assert_eq!(int_to_color(0x12_34_56), [0x12, 0x34, 0x56]);
        let id = PickId::from_index(0x01_02_02).unwrap();
        assert_eq!(id.to_rgb(), [0x01, 0x02, 0x03]);
        assert_eq!(PickId::from_rgba([0x01, 0x02, 0x03, 0]), id);
    }

    #[test]
    fn ids_stop_at_24_bits() {
        assert!(PickId::from_index(PickId::MAX as usize - 1).is_some());
        assert!(PickId::from_index(PickId::MAX as usize).is_none());
    }

    #[test]
    fn color_is_normalized() {
        let c = PickId::from_index(0xFF_FF_FE).unwrap().to_color();
        assert!((c - Vec3::ONE).abs().max_element() < 1e-6);
    }

    #[test]
    fn region_maps_to_bottom_left_pixels() {
        let region = ViewportRegion::new(Vec2::new(100.0, 50.0), Vec2::new(200.0, 100.0));
        let frame = UVec2::new(400, 200);
        assert_eq!(region.to_frame_pixel(Vec2::new(100.0, 50.0), frame), Some(UVec2::new(0, 199)));
        assert_eq!(region.to_frame_pixel(Vec2::new(200.0, 100.0), frame), Some(UVec2::new(200, 99)));
        assert_eq!(region.to_frame_pixel(Vec2::new(99.0, 50.0), frame), None);
        assert_eq!(region.to_frame_pixel(Vec2::new(300.0, 50.0), frame), None);
        let back = region.from_frame_point(Vec2::new(200.0, 100.0), frame);
        assert_eq!(back, Vec2::new(200.0, 100.0));
    }
}
