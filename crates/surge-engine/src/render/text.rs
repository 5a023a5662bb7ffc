//! Text draw database.
//!
//! Glyph bitmaps are rasterized once with fontdue into a shelf-packed R8 atlas
//! ([`GlyphCache`]). Each frame, strings are laid out into [`GlyphRecord`]s streamed
//! through a [`TextBatch`] and drawn in a single color by [`TextDatabase`].

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use glam::{Vec2, Vec3};

use crate::coords::{ColorRgba, Rect};
use crate::device::GpuTimeline;
use crate::render::{RenderCtx, RenderTarget};
use crate::stream::{
    BoundRange, StreamBackend, StreamConfig, StreamResult, StreamingArena, DEFAULT_REDUNDANCY,
    DEFAULT_WAIT_TIMEOUT,
};

use super::common::{
    create_uniform, premul_alpha_blend, quad_primitive, uniform_entry, QuadGeometry, QuadVertex,
    ViewportUniform,
};
use super::record::{place, GlyphRecord, ViewRect};
use super::texture::{TextureArray, TextureArrayDesc, TextureRef};

/// Drawn in place of characters missing from the table.
pub const REPLACEMENT: char = '\u{FFFD}';

const ATLAS_SIZE: u32 = 1024;
const GLYPH_PADDING: u32 = 1; // pixels between glyphs in the atlas

// ── glyph table ───────────────────────────────────────────────────────────

/// Metrics of one rasterized character, in font pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Glyph {
    /// Bitmap location inside the atlas; empty for blank glyphs.
    pub atlas: Rect,
    /// Offset from the pen to the bitmap's left edge (x) and top edge above the
    /// baseline (y).
    pub bearing: Vec2,
    /// Horizontal pen advance.
    pub advance: f32,
}

impl Glyph {
    #[inline]
    pub fn size(&self) -> Vec2 {
        self.atlas.size
    }

    #[inline]
    pub fn is_blank(&self) -> bool {
        self.atlas.is_empty()
    }
}

/// Character -> glyph lookup with U+FFFD fallback.
#[derive(Debug, Clone)]
pub struct GlyphTable {
    glyphs: HashMap<char, Glyph>,
    line_advance: f32,
    atlas_dims: Vec2,
}

impl GlyphTable {
    pub fn new(atlas_dims: Vec2, line_advance: f32) -> Self {
        Self {
            glyphs: HashMap::new(),
            line_advance,
            atlas_dims,
        }
    }

    pub fn insert(&mut self, c: char, glyph: Glyph) {
        self.glyphs.insert(c, glyph);
    }

    /// Glyph for `c`, or the replacement glyph if `c` is unknown.
    pub fn get(&self, c: char) -> Option<&Glyph> {
        self.glyphs.get(&c).or_else(|| self.glyphs.get(&REPLACEMENT))
    }

    pub fn line_advance(&self) -> f32 {
        self.line_advance
    }

    pub fn atlas_dims(&self) -> Vec2 {
        self.atlas_dims
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Unscaled single-line extent of `text`: summed advances by the tallest bitmap.
    pub fn bbox_size(&self, text: &str) -> Vec2 {
        text.chars()
            .filter(|&c| c != '\n')
            .filter_map(|c| self.get(c))
            .fold(Vec2::ZERO, |bb, g| {
                Vec2::new(bb.x + g.advance.max(0.0), bb.y.max(g.size().y))
            })
    }
}

// ── atlas ─────────────────────────────────────────────────────────────────

/// Row-by-row rectangle packer.
#[derive(Debug)]
struct ShelfPacker {
    size: u32,
    cursor_x: u32,
    cursor_y: u32,
    row_height: u32,
}

impl ShelfPacker {
    fn new(size: u32) -> Self {
        Self {
            size,
            cursor_x: GLYPH_PADDING,
            cursor_y: GLYPH_PADDING,
            row_height: 0,
        }
    }

    fn place(&mut self, w: u32, h: u32) -> Option<(u32, u32)> {
        // Advance to a new shelf row when the glyph doesn't fit horizontally.
        if self.cursor_x + w + GLYPH_PADDING > self.size {
            self.cursor_y += self.row_height + GLYPH_PADDING;
            self.cursor_x = GLYPH_PADDING;
            self.row_height = 0;
        }

        if self.cursor_x + w + GLYPH_PADDING > self.size
            || self.cursor_y + h + GLYPH_PADDING > self.size
        {
            return None;
        }

        let at = (self.cursor_x, self.cursor_y);
        self.cursor_x += w + GLYPH_PADDING;
        self.row_height = self.row_height.max(h);
        Some(at)
    }
}

/// Characters rasterized by [`GlyphCache::new`]: printable ASCII plus whitespace and
/// the replacement character.
pub fn default_charset() -> impl Iterator<Item = char> {
    ('!'..='~').chain([' ', '\n', '\t', REPLACEMENT])
}

/// Font rasterized at one pixel size into a single-layer atlas.
pub struct GlyphCache {
    table: GlyphTable,
    atlas: TextureArray,
}

impl GlyphCache {
    pub fn new(ctx: &RenderCtx<'_>, font_bytes: &[u8], px: f32) -> Result<Self> {
        anyhow::ensure!(px > 0.0, "glyph size must be positive, got {px}");

        let font = fontdue::Font::from_bytes(font_bytes, fontdue::FontSettings::default())
            .map_err(anyhow::Error::msg)
            .context("failed to parse font")?;

        let atlas = TextureArray::new(
            ctx.device,
            &TextureArrayDesc {
                label: "surge glyph atlas",
                width: ATLAS_SIZE,
                height: ATLAS_SIZE,
                layers: 1,
                format: wgpu::TextureFormat::R8Unorm,
                filter: wgpu::FilterMode::Linear,
            },
        )?;

        let line_advance = font
            .horizontal_line_metrics(px)
            .map_or(px * 1.2, |m| m.new_line_size);
        let mut table = GlyphTable::new(atlas.dims(), line_advance);
        let mut packer = ShelfPacker::new(ATLAS_SIZE);

        for c in default_charset() {
            let (metrics, bitmap) = font.rasterize(c, px);
            let (w, h) = (metrics.width as u32, metrics.height as u32);

            let atlas_rect = if w == 0 || h == 0 {
                Rect::default()
            } else {
                let (x, y) = packer.place(w, h).with_context(|| {
                    format!("glyph atlas ({ATLAS_SIZE}x{ATLAS_SIZE}) is full at {c:?} ({px} px)")
                })?;
                atlas.write_region(ctx.queue, TextureRef(0), x, y, w, h, &bitmap)?;
                Rect::new(x as f32, y as f32, w as f32, h as f32)
            };

            table.insert(
                c,
                Glyph {
                    atlas: atlas_rect,
                    bearing: Vec2::new(metrics.xmin as f32, (metrics.ymin + h as i32) as f32),
                    advance: metrics.advance_width,
                },
            );
        }

        log::info!("created glyph cache: {} glyphs at {px} px", table.len());
        Ok(Self { table, atlas })
    }

    pub fn table(&self) -> &GlyphTable {
        &self.table
    }

    pub fn atlas(&self) -> &TextureArray {
        &self.atlas
    }
}

// ── batch ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TextDatabaseConfig {
    /// Glyphs per frame; further glyphs are dropped.
    pub max_glyphs: usize,
    pub redundancy: usize,
    pub wait_timeout: Duration,
}

impl Default for TextDatabaseConfig {
    fn default() -> Self {
        Self {
            max_glyphs: 4096,
            redundancy: DEFAULT_REDUNDANCY,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

pub struct TextBatch<B: StreamBackend> {
    stream: StreamingArena<GlyphRecord, B>,
}

impl<B: StreamBackend> TextBatch<B> {
    pub fn new(backend: &B, config: &TextDatabaseConfig) -> StreamResult<Self> {
        let stream_config = StreamConfig::new("glyphs", config.max_glyphs)
            .with_redundancy(config.redundancy)
            .with_wait_timeout(config.wait_timeout);
        Ok(Self {
            stream: StreamingArena::create(backend, &stream_config)?,
        })
    }

    pub fn begin_add(&mut self) -> StreamResult<()> {
        self.stream.begin_write()
    }

    /// Lays out `text` starting at the pen position `baseline_origin`.
    ///
    /// `\n` returns the pen to `baseline_origin.x` and moves it one line down.
    /// Returns the number of glyphs stored.
    pub fn push(
        &mut self,
        baseline_origin: Vec3,
        scale: Vec2,
        glyphs: &GlyphTable,
        text: &str,
    ) -> StreamResult<usize> {
        let mut pen = baseline_origin;
        let mut stored = 0;

        for c in text.chars() {
            if c == '\n' {
                pen.x = baseline_origin.x;
                pen.y += glyphs.line_advance() * scale.y;
                continue;
            }

            let Some(glyph) = glyphs.get(c) else { continue };

            if !glyph.is_blank() {
                let origin = pen.truncate() + Vec2::new(glyph.bearing.x, -glyph.bearing.y) * scale;
                let model = place(origin, glyph.size() * scale, pen.z);
                let view = ViewRect::from_pixels(glyph.atlas, glyphs.atlas_dims())
                    .unwrap_or(ViewRect::FULL);

                if self.stream.push(GlyphRecord::new(model, view))?.is_stored() {
                    stored += 1;
                }
            }

            pen.x += glyph.advance * scale.x;
        }

        Ok(stored)
    }

    /// Shrinks `intended_scale` by `decrement_step` until `text` fits the width of
    /// `region_dims`, then centers it in the region whose bottom-left corner is
    /// `baseline_origin`.
    pub fn push_centered(
        &mut self,
        baseline_origin: Vec3,
        intended_scale: f32,
        region_dims: Vec2,
        glyphs: &GlyphTable,
        text: &str,
        decrement_step: f32,
    ) -> StreamResult<usize> {
        let scale = fit_scale(glyphs.bbox_size(text), intended_scale, region_dims.x, decrement_step);
        let scaled = glyphs.bbox_size(text) * scale;
        let shift = Vec3::new(
            (region_dims.x - scaled.x) / 2.0,
            -(region_dims.y - scaled.y) / 2.0,
            0.0,
        );
        self.push(baseline_origin + shift, Vec2::splat(scale), glyphs, text)
    }

    pub fn reset(&mut self) {
        self.stream.reset();
    }

    pub fn reinit(&mut self) -> StreamResult<()> {
        self.stream.reinit()
    }

    pub fn wait_idle(&mut self) -> StreamResult<()> {
        self.stream.wait_idle()
    }

    /// Binds the written glyphs, lets `issue` record the draw, then locks the region.
    pub fn submit<F>(&mut self, backend: &B, issue: F) -> bool
    where
        F: FnOnce(&BoundRange<'_, B::Buffer>),
    {
        if self.stream.is_empty() {
            return false;
        }
        issue(&self.stream.bind(backend));
        self.stream.lock_write_buffer(backend)
    }

    pub fn len(&self) -> usize {
        self.stream.size()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.stream.dropped()
    }

    pub fn stream(&self) -> &StreamingArena<GlyphRecord, B> {
        &self.stream
    }

    pub fn destroy(self) -> StreamResult<()> {
        self.stream.destroy()
    }
}

/// Largest `intended - k * step` (k >= 0) whose scaled width fits `max_width`.
///
/// Stops at the last positive scale if even that is too wide.
fn fit_scale(bbox: Vec2, intended: f32, max_width: f32, step: f32) -> f32 {
    if step <= 0.0 {
        return intended;
    }
    let mut scale = intended;
    while bbox.x * scale > max_width && scale - step > 0.0 {
        scale -= step;
    }
    scale
}

// ── wgpu database ─────────────────────────────────────────────────────────

/// Instanced glyph renderer drawing every queued glyph in one color.
pub struct TextDatabase {
    batch: TextBatch<GpuTimeline>,
    pipeline: wgpu::RenderPipeline,
    viewport_ubo: wgpu::Buffer,
    color_ubo: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    quad: QuadGeometry,
}

impl TextDatabase {
    pub fn new(ctx: &RenderCtx<'_>, cache: &GlyphCache, config: &TextDatabaseConfig) -> Result<Self> {
        let batch = TextBatch::new(ctx.timeline, config).context("failed to create glyph stream")?;

        let device = ctx.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("surge text shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/text.wgsl").into()),
        });

        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("surge text bgl"),
            entries: &[
                uniform_entry::<ViewportUniform>(0, wgpu::ShaderStages::VERTEX),
                uniform_entry::<[f32; 4]>(1, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("surge text pipeline layout"),
            bind_group_layouts: &[&bgl, cache.atlas().layout()],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("surge text pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout(), GlyphRecord::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.surface_format,
                    blend: Some(premul_alpha_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: quad_primitive(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let viewport_ubo = create_uniform(
            device,
            "surge text viewport ubo",
            &ViewportUniform {
                viewport: ctx.viewport.to_uniform(),
                _pad: [0.0; 2],
            },
        );
        let color_ubo = create_uniform(
            device,
            "surge text color ubo",
            &ColorRgba::white().premultiplied(),
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("surge text bind group"),
            layout: &bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: viewport_ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: color_ubo.as_entire_binding(),
                },
            ],
        });

        Ok(Self {
            batch,
            pipeline,
            viewport_ubo,
            color_ubo,
            bind_group,
            quad: QuadGeometry::new(device, "surge text"),
        })
    }

    pub fn batch(&self) -> &TextBatch<GpuTimeline> {
        &self.batch
    }

    pub fn begin_add(&mut self) -> StreamResult<()> {
        self.batch.begin_add()
    }

    pub fn push(
        &mut self,
        baseline_origin: Vec3,
        scale: Vec2,
        cache: &GlyphCache,
        text: &str,
    ) -> StreamResult<usize> {
        self.batch.push(baseline_origin, scale, cache.table(), text)
    }

    pub fn push_centered(
        &mut self,
        baseline_origin: Vec3,
        intended_scale: f32,
        region_dims: Vec2,
        cache: &GlyphCache,
        text: &str,
        decrement_step: f32,
    ) -> StreamResult<usize> {
        self.batch.push_centered(
            baseline_origin,
            intended_scale,
            region_dims,
            cache.table(),
            text,
            decrement_step,
        )
    }

    pub fn reset(&mut self) {
        self.batch.reset();
    }

    pub fn reinit(&mut self) -> StreamResult<()> {
        self.batch.reinit()
    }

    pub fn wait_idle(&mut self) -> StreamResult<()> {
        self.batch.wait_idle()
    }

    /// Draws every queued glyph in `color`, then locks the batch's region.
    pub fn draw(
        &mut self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        cache: &GlyphCache,
        color: ColorRgba,
    ) -> bool {
        if self.batch.is_empty() {
            return false;
        }

        let u = ViewportUniform {
            viewport: ctx.viewport.to_uniform(),
            _pad: [0.0; 2],
        };
        ctx.queue.write_buffer(&self.viewport_ubo, 0, bytemuck::bytes_of(&u));
        ctx.queue.write_buffer(&self.color_ubo, 0, bytemuck::bytes_of(&color.premultiplied()));

        let pipeline = &self.pipeline;
        let bind_group = &self.bind_group;
        let quad = &self.quad;

        self.batch.submit(ctx.timeline, |range| {
            let mut rpass = target.color_pass("surge text pass");
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, bind_group, &[]);
            rpass.set_bind_group(1, cache.atlas().bind_group(), &[]);
            quad.bind(&mut rpass);
            rpass.set_vertex_buffer(1, range.buffer.slice(range.offset..range.offset + range.size));
            rpass.draw_indexed(0..6, 0, 0..range.count);
        })
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.batch.dropped()
    }

    pub fn destroy(self) -> StreamResult<()> {
        self.batch.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ManualTimeline;
    use glam::Mat4;

    fn glyph(x: f32, w: f32, h: f32, bearing: Vec2, advance: f32) -> Glyph {
        Glyph {
            atlas: Rect::new(x, 0.0, w, h),
            bearing,
            advance,
        }
    }

    fn table() -> GlyphTable {
        let mut t = GlyphTable::new(Vec2::new(128.0, 64.0), 20.0);
        t.insert('A', glyph(0.0, 10.0, 12.0, Vec2::new(1.0, 10.0), 11.0));
        t.insert('g', glyph(16.0, 8.0, 14.0, Vec2::new(0.0, 9.0), 9.0));
        t.insert(' ', glyph(0.0, 0.0, 0.0, Vec2::ZERO, 5.0));
        t.insert(REPLACEMENT, glyph(32.0, 10.0, 10.0, Vec2::new(0.0, 10.0), 12.0));
        t
    }

    fn batch(tl: &ManualTimeline, max_glyphs: usize) -> TextBatch<ManualTimeline> {
        let config = TextDatabaseConfig {
            max_glyphs,
            redundancy: 2,
            wait_timeout: Duration::from_millis(2),
        };
        TextBatch::new(tl, &config).unwrap()
    }

    fn model(b: &TextBatch<ManualTimeline>, i: usize) -> Mat4 {
        Mat4::from_cols_array_2d(&b.stream().get(i).unwrap().model)
    }

    fn origin(b: &TextBatch<ManualTimeline>, i: usize) -> Vec2 {
        model(b, i).w_axis.truncate().truncate()
    }

    fn size(b: &TextBatch<ManualTimeline>, i: usize) -> Vec2 {
        Vec2::new(model(b, i).x_axis.x, model(b, i).y_axis.y)
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn glyphs_sit_on_the_baseline_and_advance_the_pen() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 16);
        let n = b
            .push(Vec3::new(100.0, 50.0, 0.0), Vec2::splat(2.0), &table(), "AA")
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(origin(&b, 0), Vec2::new(102.0, 30.0));
        assert_eq!(size(&b, 0), Vec2::new(20.0, 24.0));
        assert_eq!(origin(&b, 1), Vec2::new(124.0, 30.0));
    }

    #[test]
    fn newline_returns_the_pen_and_moves_down() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 16);
        let _ = b.push(Vec3::new(10.0, 40.0, 0.0), Vec2::ONE, &table(), "AA\nA").unwrap();

        assert_eq!(b.len(), 3);
        assert_eq!(origin(&b, 2), Vec2::new(11.0, 50.0));
    }

    #[test]
    fn blanks_advance_without_a_record() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 16);
        let n = b.push(Vec3::ZERO, Vec2::ONE, &table(), "A A").unwrap();

        assert_eq!(n, 2);
        assert_eq!(origin(&b, 1).x, 11.0 + 5.0 + 1.0);
    }

    #[test]
    fn unknown_characters_use_the_replacement_glyph() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 16);
        let _ = b.push(Vec3::ZERO, Vec2::ONE, &table(), "é").unwrap();

        let view = b.stream().get(0).unwrap().view;
        assert_eq!(view[2], 32.0 / 128.0);
        assert_eq!(size(&b, 0), Vec2::new(10.0, 10.0));
    }

    #[test]
    fn atlas_view_follows_the_sub_image_convention() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 16);
        let _ = b.push(Vec3::ZERO, Vec2::ONE, &table(), "g").unwrap();

        let view = b.stream().get(0).unwrap().view;
        assert_eq!(view, [8.0 / 128.0, 14.0 / 64.0, 16.0 / 128.0, 1.0 - 14.0 / 64.0]);
    }

    #[test]
    fn overflowing_text_is_truncated() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 3);
        let n = b.push(Vec3::ZERO, Vec2::ONE, &table(), "AAAAA").unwrap();
        assert_eq!(n, 3);
        assert_eq!(b.dropped(), 2);
    }

    // ── measuring ─────────────────────────────────────────────────────────

    #[test]
    fn bbox_sums_advances_and_takes_the_tallest_bitmap() {
        assert_eq!(table().bbox_size("Ag A"), Vec2::new(11.0 + 9.0 + 5.0 + 11.0, 14.0));
        assert_eq!(table().bbox_size(""), Vec2::ZERO);
    }

    #[test]
    fn centered_text_shrinks_until_it_fits() {
        // "AA" is 22 px wide unscaled.
        assert_eq!(fit_scale(Vec2::new(22.0, 12.0), 2.0, 30.0, 0.25), 1.25);
        assert_eq!(fit_scale(Vec2::new(22.0, 12.0), 1.0, 30.0, 0.25), 1.0);
        assert_eq!(fit_scale(Vec2::new(22.0, 12.0), 1.0, 1.0, 0.5), 0.5);
        assert_eq!(fit_scale(Vec2::new(22.0, 12.0), 2.0, 1.0, 0.0), 2.0);
    }

    #[test]
    fn centered_text_is_shifted_into_the_region() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 16);
        let _ = b
            .push_centered(Vec3::new(0.0, 100.0, 0.0), 1.0, Vec2::new(42.0, 32.0), &table(), "AA", 0.1)
            .unwrap();

        // shift = ((42 - 22) / 2, -(32 - 12) / 2) = (10, -10)
        assert_eq!(origin(&b, 0), Vec2::new(11.0, 80.0));
    }

    // ── atlas packing ─────────────────────────────────────────────────────

    #[test]
    fn packer_wraps_to_a_new_shelf() {
        let mut p = ShelfPacker::new(32);
        assert_eq!(p.place(10, 5), Some((1, 1)));
        assert_eq!(p.place(10, 8), Some((12, 1)));
        assert_eq!(p.place(10, 4), Some((1, 10)));
    }

    #[test]
    fn packer_reports_a_full_atlas() {
        let mut p = ShelfPacker::new(16);
        assert_eq!(p.place(14, 14), Some((1, 1)));
        assert_eq!(p.place(4, 4), None);
        assert_eq!(ShelfPacker::new(8).place(10, 1), None);
    }

    #[test]
    fn default_charset_covers_printable_ascii_and_fallback() {
        let set: Vec<char> = default_charset().collect();
        assert_eq!(set.len(), 94 + 4);
        assert!(set.contains(&'~') && set.contains(&REPLACEMENT));
    }
}
