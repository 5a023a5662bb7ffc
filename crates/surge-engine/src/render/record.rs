//! Packed per-instance records streamed to the device.
//!
//! One record per drawable (array-of-structures), bound as an instance vertex buffer.
//! Field order and locations must match the vertex inputs in `shaders/*.wgsl`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::coords::Rect;

/// Normalized sub-image rectangle, bottom-left origin.
///
/// `scale` is the fraction of the image covered, `origin` the bottom-left corner of
/// the covered area. Shaders sample at `origin + uv_bottom_up * scale`, flipped back
/// to wgpu's top-left texture origin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewRect {
    pub scale: Vec2,
    pub origin: Vec2,
}

impl ViewRect {
    /// The whole image.
    pub const FULL: Self = Self {
        scale: Vec2::ONE,
        origin: Vec2::ZERO,
    };

    /// Converts a top-left pixel rectangle `(u0, v0, w, h)` of a `dims`-sized image.
    ///
    /// The vertical origin flips: pixel rows count from the top, view origins from the
    /// bottom. Returns `None` for a non-positive image size.
    pub fn from_pixels(px: Rect, dims: Vec2) -> Option<Self> {
        if dims.x <= 0.0 || dims.y <= 0.0 {
            return None;
        }
        Some(Self {
            scale: px.size / dims,
            origin: Vec2::new(
                px.origin.x / dims.x,
                1.0 - (px.origin.y + px.size.y) / dims.y,
            ),
        })
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.scale.x, self.scale.y, self.origin.x, self.origin.y]
    }
}

impl Default for ViewRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Model transform placing the unit quad at `pos` (top-left, pixels), `scale` pixels
/// wide/tall, at depth `z`.
pub fn place(pos: Vec2, scale: Vec2, z: f32) -> Mat4 {
    Mat4::from_translation(pos.extend(z)) * Mat4::from_scale(Vec3::new(scale.x, scale.y, 1.0))
}

// ── sprite ────────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct SpriteRecord {
    pub model: [[f32; 4]; 4],
    pub view: [f32; 4],
    pub alpha: f32,
    pub layer: u32,
    pub _pad: [u32; 2],
}

impl SpriteRecord {
    const ATTRS: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
        1 => Float32x4, // model col 0
        2 => Float32x4, // model col 1
        3 => Float32x4, // model col 2
        4 => Float32x4, // model col 3
        5 => Float32x4, // view
        6 => Float32,   // alpha
        7 => Uint32     // texture layer
    ];

    pub fn new(layer: u32, model: Mat4, view: ViewRect, alpha: f32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_array(),
            alpha,
            layer,
            _pad: [0; 2],
        }
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }

    pub fn set_model(&mut self, model: Mat4) {
        self.model = model.to_cols_array_2d();
    }

    pub(crate) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SpriteRecord>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }
}

// ── glyph ─────────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct GlyphRecord {
    pub model: [[f32; 4]; 4],
    pub view: [f32; 4],
}

impl GlyphRecord {
    const ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        1 => Float32x4,
        2 => Float32x4,
        3 => Float32x4,
        4 => Float32x4,
        5 => Float32x4  // atlas view
    ];

    pub fn new(model: Mat4, view: ViewRect) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_array(),
        }
    }

    pub(crate) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GlyphRecord>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    /// Texture coordinate the sprite and text vertex shaders derive from `view` for a
    /// unit-quad corner (`(0, 0)` top-left), read back out of the packed record.
    fn sample_uv(record: &SpriteRecord, quad: Vec2) -> Vec2 {
        let [sx, sy, ox, oy] = record.view;
        let s = Vec2::new(ox, oy) + Vec2::new(quad.x, 1.0 - quad.y) * Vec2::new(sx, sy);
        Vec2::new(s.x, 1.0 - s.y)
    }

    #[test]
    fn sub_image_view_flips_vertical_origin() {
        let view = ViewRect::from_pixels(
            Rect::new(50.0, 25.0, 40.0, 30.0),
            Vec2::new(200.0, 100.0),
        )
        .unwrap();

        assert!(close(view.scale, Vec2::new(0.2, 0.3)));
        assert!(close(view.origin, Vec2::new(0.25, 0.45)));
    }

    #[test]
    fn sampled_corners_land_on_the_pixel_rect() {
        let dims = Vec2::new(200.0, 100.0);
        let view = ViewRect::from_pixels(Rect::new(50.0, 25.0, 40.0, 30.0), dims).unwrap();
        let record = SpriteRecord::new(0, Mat4::IDENTITY, view, 1.0);

        assert!(close(sample_uv(&record, Vec2::ZERO) * dims, Vec2::new(50.0, 25.0)));
        assert!(close(sample_uv(&record, Vec2::ONE) * dims, Vec2::new(90.0, 55.0)));
    }

    #[test]
    fn full_view_is_identity_sampling() {
        let uv = Vec2::new(0.3, 0.8);
        let record = SpriteRecord::new(0, Mat4::IDENTITY, ViewRect::FULL, 1.0);
        assert!(close(sample_uv(&record, uv), uv));
        assert_eq!(
            ViewRect::from_pixels(Rect::new(0.0, 0.0, 64.0, 32.0), Vec2::new(64.0, 32.0)),
            Some(ViewRect::FULL)
        );
    }

    #[test]
    fn degenerate_image_has_no_view() {
        assert!(ViewRect::from_pixels(Rect::new(0.0, 0.0, 1.0, 1.0), Vec2::new(0.0, 10.0)).is_none());
    }

    #[test]
    fn place_maps_unit_quad_to_pixels() {
        let m = place(Vec2::new(10.0, 20.0), Vec2::new(32.0, 16.0), 0.5);
        assert_eq!(m.transform_point3(Vec3::ZERO), Vec3::new(10.0, 20.0, 0.5));
        assert_eq!(m.transform_point3(Vec3::new(1.0, 1.0, 0.0)), Vec3::new(42.0, 36.0, 0.5));
    }

    #[test]
    fn record_layouts_match_shader_strides() {
        assert_eq!(std::mem::size_of::<SpriteRecord>(), 96);
        assert_eq!(std::mem::size_of::<GlyphRecord>(), 80);

        let r = SpriteRecord::new(3, Mat4::IDENTITY, ViewRect::FULL, 0.5);
        let bytes = bytemuck::bytes_of(&r);
        assert_eq!(&bytes[80..84], &0.5f32.to_ne_bytes());
        assert_eq!(&bytes[84..88], &3u32.to_ne_bytes());
    }
}
