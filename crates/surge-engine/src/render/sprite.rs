//! Sprite draw database.
//!
//! [`SpriteBatch`] holds the per-frame logic (one streaming arena of
//! [`SpriteRecord`]s plus the depth-mapped slot) and is generic over the backend so it
//! runs against [`ManualTimeline`](crate::stream::ManualTimeline) in tests.
//! [`SpriteDatabase`] adds the wgpu pipelines and issues the draws.
//!
//! With a depth attachment the batch is depth-tested and writes each sprite's `z`;
//! the depth-mapped sprite is drawn afterwards and tested against it per fragment.

use std::time::Duration;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::coords::Rect;
use crate::device::GpuTimeline;
use crate::render::{RenderCtx, RenderTarget};
use crate::stream::{
    BoundRange, Pushed, StreamBackend, StreamConfig, StreamResult, StreamingArena,
    DEFAULT_REDUNDANCY, DEFAULT_WAIT_TIMEOUT,
};

use super::common::{
    create_uniform, depth_test_state, premul_alpha_blend, quad_primitive, uniform_entry,
    QuadGeometry, QuadVertex, ViewportUniform,
};
use super::record::{SpriteRecord, ViewRect};
use super::texture::{TextureArray, TextureRef};

#[derive(Debug, Clone)]
pub struct SpriteDatabaseConfig {
    /// Sprites per frame; further adds are dropped.
    pub max_sprites: usize,
    pub redundancy: usize,
    pub wait_timeout: Duration,
}

impl Default for SpriteDatabaseConfig {
    fn default() -> Self {
        Self {
            max_sprites: 1024,
            redundancy: DEFAULT_REDUNDANCY,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl SpriteDatabaseConfig {
    fn stream_config(&self) -> StreamConfig {
        StreamConfig::new("sprites", self.max_sprites)
            .with_redundancy(self.redundancy)
            .with_wait_timeout(self.wait_timeout)
    }
}

/// Single full-quad sprite whose fragment depth comes from a depth map.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DepthSprite {
    pub texture: TextureRef,
    pub depth_map: TextureRef,
    pub model: Mat4,
}

/// One draw issued by [`SpriteBatch::draw_frame`], in issue order.
#[derive(Debug)]
pub enum SpriteDraw<'a, Buf> {
    /// The instanced batch; always issued first.
    Batch(BoundRange<'a, Buf>),
    /// The depth-mapped sprite, tested against the depth the batch wrote.
    ///
    /// `after_batch` is `false` when the batch was empty this frame, so the depth
    /// attachment has not been cleared yet.
    Depth {
        sprite: &'a DepthSprite,
        after_batch: bool,
    },
}

// ── batch ─────────────────────────────────────────────────────────────────

pub struct SpriteBatch<B: StreamBackend> {
    stream: StreamingArena<SpriteRecord, B>,
    depth: Option<DepthSprite>,
}

impl<B: StreamBackend> SpriteBatch<B> {
    pub fn new(backend: &B, config: &SpriteDatabaseConfig) -> StreamResult<Self> {
        Ok(Self {
            stream: StreamingArena::create(backend, &config.stream_config())?,
            depth: None,
        })
    }

    /// Makes the active region writable ahead of the frame's adds.
    pub fn begin_add(&mut self) -> StreamResult<()> {
        self.stream.begin_write()
    }

    pub fn add(&mut self, texture: TextureRef, model: Mat4, alpha: f32) -> StreamResult<Pushed> {
        self.stream
            .push(SpriteRecord::new(texture.layer(), model, ViewRect::FULL, alpha))
    }

    /// Adds a sprite sampling the pixel rectangle `view_px` of a `image_dims` image.
    pub fn add_view(
        &mut self,
        texture: TextureRef,
        model: Mat4,
        view_px: Rect,
        image_dims: Vec2,
        alpha: f32,
    ) -> StreamResult<Pushed> {
        let view = ViewRect::from_pixels(view_px, image_dims).unwrap_or_else(|| {
            log::warn!("sprite view on a {image_dims} image; sampling the whole layer");
            ViewRect::FULL
        });
        self.stream
            .push(SpriteRecord::new(texture.layer(), model, view, alpha))
    }

    /// Sets the depth-mapped sprite drawn ahead of the batch. Replaces any previous one.
    pub fn add_depth(&mut self, texture: TextureRef, depth_map: TextureRef, model: Mat4) {
        self.depth = Some(DepthSprite {
            texture,
            depth_map,
            model,
        });
    }

    pub fn depth(&self) -> Option<&DepthSprite> {
        self.depth.as_ref()
    }

    /// Moves sprite `index` of this frame by `dir` in its local space.
    ///
    /// Returns `false` if `index` was not added since the last reset.
    pub fn translate(&mut self, index: usize, dir: Vec3) -> bool {
        let Some(record) = self.stream.get_mutable(index) else {
            return false;
        };
        record.set_model(record.model() * Mat4::from_translation(dir));
        true
    }

    /// Translation part of sprite `index`'s model transform.
    pub fn position(&self, index: usize) -> Option<Vec3> {
        self.stream
            .get(index)
            .map(|r| r.model().w_axis.truncate())
    }

    pub fn get_mutable(&mut self, index: usize) -> Option<&mut SpriteRecord> {
        self.stream.get_mutable(index)
    }

    /// Clears the batch and the depth slot for a new frame.
    pub fn reset(&mut self) {
        self.stream.reset();
        self.depth = None;
    }

    /// Drains the device and rewinds every region; use after a resolution change.
    pub fn reinit(&mut self) -> StreamResult<()> {
        self.depth = None;
        self.stream.reinit()
    }

    pub fn wait_idle(&mut self) -> StreamResult<()> {
        self.stream.wait_idle()
    }

    /// Issues the frame's draws: the bound batch (if any), then the depth-mapped
    /// sprite (if set), then locks the batch's region.
    ///
    /// Returns `true` if the batch rotated to a new region.
    pub fn draw_frame<F>(&mut self, backend: &B, mut issue: F) -> bool
    where
        F: FnMut(SpriteDraw<'_, B::Buffer>),
    {
        let drawn = !self.stream.is_empty();
        if drawn {
            issue(SpriteDraw::Batch(self.stream.bind(backend)));
        }
        if let Some(sprite) = self.depth.as_ref() {
            issue(SpriteDraw::Depth {
                sprite,
                after_batch: drawn,
            });
        }
        drawn && self.stream.lock_write_buffer(backend)
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

    pub fn stream(&self) -> &StreamingArena<SpriteRecord, B> {
        &self.stream
    }

    pub fn destroy(self) -> StreamResult<()> {
        self.stream.destroy()
    }
}

// ── wgpu database ─────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct DepthSpriteUniform {
    model: [[f32; 4]; 4],
    viewport: [f32; 2],
    texture_layer: u32,
    depth_layer: u32,
}

/// Instanced sprite renderer over a [`TextureArray`].
///
/// Everything is created up front; a failure leaves no half-built database behind.
pub struct SpriteDatabase {
    batch: SpriteBatch<GpuTimeline>,

    pipeline: wgpu::RenderPipeline,
    depth_tested_pipeline: wgpu::RenderPipeline,
    viewport_ubo: wgpu::Buffer,
    viewport_bind_group: wgpu::BindGroup,

    depth_pipeline: wgpu::RenderPipeline,
    depth_ubo: wgpu::Buffer,
    depth_bind_group: wgpu::BindGroup,

    quad: QuadGeometry,
    warned_no_depth: bool,
}

impl SpriteDatabase {
    pub fn new(
        ctx: &RenderCtx<'_>,
        textures: &TextureArray,
        config: &SpriteDatabaseConfig,
    ) -> Result<Self> {
        let batch = SpriteBatch::new(ctx.timeline, config).context("failed to create sprite stream")?;

        let device = ctx.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("surge sprite shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/sprite.wgsl").into()),
        });

        let viewport_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("surge sprite viewport bgl"),
            entries: &[uniform_entry::<ViewportUniform>(0, wgpu::ShaderStages::VERTEX)],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("surge sprite pipeline layout"),
            bind_group_layouts: &[&viewport_bgl, textures.layout()],
            immediate_size: 0,
        });

        let sprite_pipeline = |label: &str, depth_stencil: Option<wgpu::DepthStencilState>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[QuadVertex::layout(), SpriteRecord::layout()],
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
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        };

        // Targets without a depth attachment need a pipeline without depth state.
        let pipeline = sprite_pipeline("surge sprite pipeline", None);
        let depth_tested_pipeline =
            sprite_pipeline("surge depth-tested sprite pipeline", Some(depth_test_state()));

        let viewport_ubo = create_uniform(
            device,
            "surge sprite viewport ubo",
            &ViewportUniform {
                viewport: ctx.viewport.to_uniform(),
                _pad: [0.0; 2],
            },
        );
        let viewport_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("surge sprite viewport bind group"),
            layout: &viewport_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: viewport_ubo.as_entire_binding(),
            }],
        });

        // ── depth-mapped sprite ────────────────────────────────────────────

        let depth_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("surge deep sprite shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/deep_sprite.wgsl").into()),
        });

        let depth_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("surge deep sprite bgl"),
            entries: &[uniform_entry::<DepthSpriteUniform>(
                0,
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            )],
        });

        let depth_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("surge deep sprite pipeline layout"),
            bind_group_layouts: &[&depth_bgl, textures.layout()],
            immediate_size: 0,
        });

        let depth_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("surge deep sprite pipeline"),
            layout: Some(&depth_layout),
            vertex: wgpu::VertexState {
                module: &depth_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &depth_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.surface_format,
                    blend: Some(premul_alpha_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: quad_primitive(),
            depth_stencil: Some(depth_test_state()),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let depth_ubo = create_uniform(device, "surge deep sprite ubo", &DepthSpriteUniform::zeroed());
        let depth_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("surge deep sprite bind group"),
            layout: &depth_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: depth_ubo.as_entire_binding(),
            }],
        });

        Ok(Self {
            batch,
            pipeline,
            depth_tested_pipeline,
            viewport_ubo,
            viewport_bind_group,
            depth_pipeline,
            depth_ubo,
            depth_bind_group,
            quad: QuadGeometry::new(device, "surge sprite"),
            warned_no_depth: false,
        })
    }

    pub fn batch(&self) -> &SpriteBatch<GpuTimeline> {
        &self.batch
    }

    pub fn batch_mut(&mut self) -> &mut SpriteBatch<GpuTimeline> {
        &mut self.batch
    }

    pub fn begin_add(&mut self) -> StreamResult<()> {
        self.batch.begin_add()
    }

    pub fn add(&mut self, texture: TextureRef, model: Mat4, alpha: f32) -> StreamResult<Pushed> {
        self.batch.add(texture, model, alpha)
    }

    pub fn add_view(
        &mut self,
        texture: TextureRef,
        model: Mat4,
        view_px: Rect,
        image_dims: Vec2,
        alpha: f32,
    ) -> StreamResult<Pushed> {
        self.batch.add_view(texture, model, view_px, image_dims, alpha)
    }

    pub fn add_depth(&mut self, texture: TextureRef, depth_map: TextureRef, model: Mat4) {
        self.batch.add_depth(texture, depth_map, model);
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

    /// Draws the batch in one instanced call, then the depth-mapped sprite (if any)
    /// against the depth the batch wrote, then locks the batch's region.
    ///
    /// Returns `true` if the batch rotated to a new region.
    pub fn draw(
        &mut self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        textures: &TextureArray,
    ) -> bool {
        ctx.queue.write_buffer(
            &self.viewport_ubo,
            0,
            bytemuck::bytes_of(&ViewportUniform {
                viewport: ctx.viewport.to_uniform(),
                _pad: [0.0; 2],
            }),
        );

        let has_depth = target.depth_view.is_some();
        if let Some(depth) = self.batch.depth() {
            if has_depth {
                let u = DepthSpriteUniform {
                    model: depth.model.to_cols_array_2d(),
                    viewport: ctx.viewport.to_uniform(),
                    texture_layer: depth.texture.layer(),
                    depth_layer: depth.depth_map.layer(),
                };
                ctx.queue.write_buffer(&self.depth_ubo, 0, bytemuck::bytes_of(&u));
            } else if !self.warned_no_depth {
                log::warn!("render target has no depth attachment; skipping depth-mapped sprite");
                self.warned_no_depth = true;
            }
        }

        let pipeline = if has_depth {
            &self.depth_tested_pipeline
        } else {
            &self.pipeline
        };
        let viewport_bind_group = &self.viewport_bind_group;
        let depth_pipeline = &self.depth_pipeline;
        let depth_bind_group = &self.depth_bind_group;
        let quad = &self.quad;

        self.batch.draw_frame(ctx.timeline, |draw| match draw {
            SpriteDraw::Batch(range) => {
                let mut rpass = target.pass("surge sprite pass", Some(wgpu::LoadOp::Clear(1.0)));
                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(0, viewport_bind_group, &[]);
                rpass.set_bind_group(1, textures.bind_group(), &[]);
                quad.bind(&mut rpass);
                rpass.set_vertex_buffer(1, range.buffer.slice(range.offset..range.offset + range.size));
                rpass.draw_indexed(0..6, 0, 0..range.count);
            }
            SpriteDraw::Depth { after_batch, .. } => {
                if !has_depth {
                    return;
                }
                let load = if after_batch {
                    wgpu::LoadOp::Load
                } else {
                    wgpu::LoadOp::Clear(1.0)
                };
                let mut rpass = target.pass("surge deep sprite pass", Some(load));
                rpass.set_pipeline(depth_pipeline);
                rpass.set_bind_group(0, depth_bind_group, &[]);
                rpass.set_bind_group(1, textures.bind_group(), &[]);
                quad.bind(&mut rpass);
                rpass.draw_indexed(0..6, 0, 0..1);
            }
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

    /// Waits for the device to release every region. Call before dropping the device.
    pub fn destroy(self) -> StreamResult<()> {
        self.batch.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::record::place;
    use crate::stream::{ManualTimeline, RegionState};

    const TEX: TextureRef = TextureRef(0);

    fn batch(tl: &ManualTimeline, max_sprites: usize) -> SpriteBatch<ManualTimeline> {
        let config = SpriteDatabaseConfig {
            max_sprites,
            redundancy: 2,
            wait_timeout: Duration::from_millis(2),
        };
        SpriteBatch::new(tl, &config).unwrap()
    }

    #[test]
    fn add_view_stores_the_normalized_sub_rect() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 4);

        let _ = b
            .add_view(
                TextureRef(2),
                Mat4::IDENTITY,
                Rect::new(50.0, 25.0, 40.0, 30.0),
                Vec2::new(200.0, 100.0),
                0.75,
            )
            .unwrap();

        let r = b.stream().get(0).copied().unwrap();
        assert_eq!(r.layer, 2);
        assert_eq!(r.alpha, 0.75);
        assert!((r.view[0] - 0.2).abs() < 1e-6);
        assert!((r.view[1] - 0.3).abs() < 1e-6);
        assert!((r.view[2] - 0.25).abs() < 1e-6);
        assert!((r.view[3] - 0.45).abs() < 1e-6);
    }

    #[test]
    fn add_view_on_an_empty_image_falls_back_to_the_full_layer() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 4);
        let _ = b
            .add_view(TEX, Mat4::IDENTITY, Rect::new(0.0, 0.0, 1.0, 1.0), Vec2::ZERO, 1.0)
            .unwrap();
        assert_eq!(b.stream().get(0).unwrap().view, ViewRect::FULL.to_array());
    }

    #[test]
    fn translate_moves_a_pushed_sprite() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 4);
        let _ = b.add(TEX, place(Vec2::new(10.0, 20.0), Vec2::ONE, 0.0), 1.0).unwrap();

        assert!(b.translate(0, Vec3::new(5.0, -5.0, 0.0)));
        assert_eq!(b.position(0), Some(Vec3::new(15.0, 15.0, 0.0)));

        assert!(!b.translate(1, Vec3::X));
        assert_eq!(b.position(1), None);
    }

    #[test]
    fn reset_clears_the_depth_slot() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 4);
        b.add_depth(TextureRef(0), TextureRef(1), Mat4::IDENTITY);
        let _ = b.add(TEX, Mat4::IDENTITY, 1.0).unwrap();

        b.reset();
        assert!(b.depth().is_none());
        assert!(b.is_empty());
    }

    #[derive(Debug, PartialEq)]
    enum Issued {
        Batch { count: u32, size: u64 },
        Depth { depth_map: u32, after_batch: bool },
    }

    fn draw_frame(b: &mut SpriteBatch<ManualTimeline>, tl: &ManualTimeline) -> (bool, Vec<Issued>) {
        let mut issued = Vec::new();
        let rotated = b.draw_frame(tl, |draw| {
            issued.push(match draw {
                SpriteDraw::Batch(range) => Issued::Batch {
                    count: range.count,
                    size: range.size,
                },
                SpriteDraw::Depth {
                    sprite,
                    after_batch,
                } => Issued::Depth {
                    depth_map: sprite.depth_map.layer(),
                    after_batch,
                },
            })
        });
        (rotated, issued)
    }

    #[test]
    fn batch_draws_once_and_rotates() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 4);
        for _ in 0..3 {
            let _ = b.add(TEX, Mat4::IDENTITY, 1.0).unwrap();
        }

        let (rotated, issued) = draw_frame(&mut b, &tl);
        assert!(rotated);
        assert_eq!(issued, [Issued::Batch { count: 3, size: 3 * 96 }]);

        assert_eq!(b.stream().write_region(), 1);
        assert_eq!(b.stream().region_state(0), RegionState::Submitted);
        assert!(b.is_empty());
    }

    #[test]
    fn empty_batch_issues_no_draw() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 4);
        let (rotated, issued) = draw_frame(&mut b, &tl);
        assert!(!rotated);
        assert!(issued.is_empty());
        assert_eq!(tl.stamped(), 0);
    }

    #[test]
    fn depth_sprite_is_drawn_after_the_batch() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 4);
        b.add_depth(TextureRef(0), TextureRef(1), Mat4::IDENTITY);
        let _ = b.add(TEX, place(Vec2::ZERO, Vec2::ONE, 0.5), 1.0).unwrap();
        let _ = b.add(TEX, place(Vec2::ONE, Vec2::ONE, 0.25), 1.0).unwrap();

        let (rotated, issued) = draw_frame(&mut b, &tl);
        assert!(rotated);
        assert_eq!(
            issued,
            [
                Issued::Batch { count: 2, size: 2 * 96 },
                Issued::Depth { depth_map: 1, after_batch: true },
            ]
        );
        // The token covers both draws: stamped once, after the depth sprite.
        assert_eq!(tl.stamped(), 1);
    }

    #[test]
    fn depth_sprite_alone_does_not_rotate_the_batch() {
        let tl = ManualTimeline::new();
        let mut b = batch(&tl, 4);
        b.add_depth(TextureRef(0), TextureRef(1), Mat4::IDENTITY);

        let (rotated, issued) = draw_frame(&mut b, &tl);
        assert!(!rotated);
        assert_eq!(issued, [Issued::Depth { depth_map: 1, after_batch: false }]);
        assert_eq!(b.stream().write_region(), 0);
        assert!(b.depth().is_some());
    }

    #[test]
    fn overflowing_adds_are_dropped_per_frame() {
        let tl = ManualTimeline::new().complete_on_wait();
        let mut b = batch(&tl, 2);

        for frame in 1..=3u64 {
            b.begin_add().unwrap();
            b.reset();
            for _ in 0..5 {
                let _ = b.add(TEX, Mat4::IDENTITY, 1.0).unwrap();
            }
            assert_eq!(b.len(), 2);
            assert_eq!(b.dropped(), 3 * frame);
            let (_, issued) = draw_frame(&mut b, &tl);
            assert_eq!(issued, [Issued::Batch { count: 2, size: 2 * 96 }]);
        }
    }

    #[test]
    fn reinit_drains_and_rewinds() {
        let tl = ManualTimeline::new().complete_on_wait();
        let mut b = batch(&tl, 4);
        let _ = b.add(TEX, Mat4::IDENTITY, 1.0).unwrap();
        assert!(draw_frame(&mut b, &tl).0);
        b.add_depth(TEX, TEX, Mat4::IDENTITY);

        b.reinit().unwrap();
        assert_eq!(b.stream().write_region(), 0);
        assert_eq!(b.stream().region_state(0), RegionState::Writable);
        assert!(b.depth().is_none());
    }
}
