use crate::coords::Viewport;
use crate::device::GpuTimeline;

/// Renderer-facing context (device/queue/timeline + surface format + viewport).
pub struct RenderCtx<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    /// Backend handed to every streaming arena operation.
    pub timeline: &'a GpuTimeline,
    pub surface_format: wgpu::TextureFormat,
    pub viewport: Viewport, // physical px
}

impl<'a> RenderCtx<'a> {
    #[inline]
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        timeline: &'a GpuTimeline,
        surface_format: wgpu::TextureFormat,
        viewport: Viewport,
    ) -> Self {
        Self {
            device,
            queue,
            timeline,
            surface_format,
            viewport,
        }
    }
}

/// Target for drawing (encoder + color view + optional depth view).
pub struct RenderTarget<'a> {
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub color_view: &'a wgpu::TextureView,
    pub depth_view: Option<&'a wgpu::TextureView>,
}

impl<'a> RenderTarget<'a> {
    #[inline]
    pub fn new(encoder: &'a mut wgpu::CommandEncoder, color_view: &'a wgpu::TextureView) -> Self {
        Self {
            encoder,
            color_view,
            depth_view: None,
        }
    }

    #[inline]
    pub fn with_depth(mut self, depth_view: Option<&'a wgpu::TextureView>) -> Self {
        self.depth_view = depth_view;
        self
    }

    /// Begins a pass that loads and stores the color target.
    pub(crate) fn color_pass(&mut self, label: &str) -> wgpu::RenderPass<'_> {
        self.pass(label, None)
    }

    /// Begins a pass that loads and stores the color target and, when `depth_load` is
    /// given and the target has a depth view, attaches depth with that load op.
    pub(crate) fn pass(
        &mut self,
        label: &str,
        depth_load: Option<wgpu::LoadOp<f32>>,
    ) -> wgpu::RenderPass<'_> {
        let depth_stencil_attachment = self
            .depth_view
            .zip(depth_load)
            .map(|(view, load)| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

        self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        })
    }
}
