use std::time::Instant;

use anyhow::{Context, Result};
use ouroboros::self_referencing;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::window::{Window, WindowId};

use surge_engine::device::{Gpu, GpuInit, SurfaceErrorAction};
use surge_engine::render::RenderTarget;

use crate::scene::Scene;

const CLEAR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.03,
    a: 1.0,
};

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

pub struct Player {
    font: Option<Vec<u8>>,
    entry: Option<WindowEntry>,
    scene: Option<Scene>,
    last_frame: Instant,
    error: Option<anyhow::Error>,
}

impl Player {
    pub fn new(font: Option<Vec<u8>>) -> Self {
        Self {
            font,
            entry: None,
            scene: None,
            last_frame: Instant::now(),
            error: None,
        }
    }

    /// Surfaces the error that stopped the event loop, if any.
    pub fn finish(mut self) -> Result<()> {
        self.shutdown();
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        log::error!("{e:#}");
        self.error = Some(e);
        self.shutdown();
        event_loop.exit();
    }

    /// Drains the device before the GPU context goes away.
    fn shutdown(&mut self) {
        if let Some(scene) = self.scene.take() {
            if let Err(e) = scene.destroy() {
                log::warn!("scene teardown: {e}");
            }
        }
        self.entry = None;
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("surge player")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let entry = WindowEntryTryBuilder {
            window,
            gpu_builder: |w| Gpu::new_blocking(w, GpuInit::default()),
        }
        .try_build()?;

        let scene = entry.with_gpu(|gpu| Scene::new(&gpu.render_ctx(), self.font.as_deref()))?;

        entry.with_window(|w| w.request_redraw());
        self.entry = Some(entry);
        self.scene = Some(scene);
        self.last_frame = Instant::now();
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(entry), Some(scene)) = (self.entry.as_mut(), self.scene.as_mut()) else {
            return Ok(());
        };

        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32().min(0.25);
        self.last_frame = now;

        entry.with_gpu_mut(|gpu| {
            let mut frame = match gpu.begin_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    return match gpu.handle_surface_error(e) {
                        SurfaceErrorAction::Fatal => Err(anyhow::anyhow!("surface out of memory")),
                        SurfaceErrorAction::Reconfigured => {
                            scene.reinit();
                            Ok(())
                        }
                        SurfaceErrorAction::SkipFrame => Ok(()),
                    };
                }
            };

            {
                let _clear = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("surge clear pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &frame.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(CLEAR),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    multiview_mask: None,
                });
            }

            let ctx = gpu.render_ctx();
            let mut target =
                RenderTarget::new(&mut frame.encoder, &frame.view).with_depth(gpu.depth_view());
            scene.frame(&ctx, &mut target, dt);

            gpu.submit(frame);
            Ok(())
        })
    }
}

impl ApplicationHandler for Player {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            return;
        }
        if let Err(e) = self.create_window(event_loop) {
            self.fail(event_loop, e.context("failed to initialize the player"));
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.with_gpu_mut(|gpu| gpu.resize(new_size));
                    entry.with_window(|w| w.request_redraw());
                }
                // Accumulated frames were laid out for the old size.
                if let Some(scene) = self.scene.as_mut() {
                    scene.reinit();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }

            _ => {}
        }
    }
}
