pub mod config;
pub mod core;
pub mod present;
pub mod recorder;
pub mod targets;

use color_eyre::Result;
use ash::vk;
use winit::dpi::PhysicalSize;
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::core::context::RenderContext;
use crate::renderer::present::recreate::ChainTargets;
use crate::renderer::present::vulkan::VulkanPresentDevice;
use crate::renderer::present::{FrameStatus, PresentationEngine};
use crate::renderer::recorder::FrameRecorder;
use crate::renderer::targets::ClearPassBuilder;
use std::sync::Arc;

type Engine = PresentationEngine<VulkanPresentDevice, ChainTargets<ClearPassBuilder>>;

pub struct Renderer {
    // Drop order matters: the engine idles the device and releases the chain, the
    // recorder's pool goes next, the context is destroyed last
    engine: Engine,
    recorder: FrameRecorder,
    ctx: RenderContext,
}

impl Renderer {
    pub fn new(window: &Window, config: RenderConfig) -> Result<Self> {
        let ctx = RenderContext::new(window)?;

        let device = Arc::new(ctx.present_device());
        let targets = ChainTargets::new(ClearPassBuilder::new(ctx.device.clone()));
        let engine = PresentationEngine::new(
            device,
            config.clone(),
            to_extent(window.inner_size()),
            targets,
        )?;
        let recorder = FrameRecorder::new(ctx.device.clone(), ctx.queue_family, config.clear_color)?;

        Ok(Self {
            engine,
            recorder,
            ctx,
        })
    }

    pub fn request_resize(&mut self, size: PhysicalSize<u32>) {
        self.engine.notify_resized(to_extent(size));
    }

    /// Renders one frame. Only errors the render loop cannot recover from are returned.
    pub fn draw(&mut self) -> Result<FrameStatus> {
        let recorder = &mut self.recorder;
        let status = self
            .engine
            .render_frame(|frame, targets| recorder.record(frame, targets.get()));

        match status {
            Ok(status) => Ok(status),
            Err(e) if !e.is_fatal() => {
                log::warn!("Frame dropped: {}", e);
                Ok(FrameStatus::Deferred)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.engine.frame_counter()
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }
}

fn to_extent(size: PhysicalSize<u32>) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}
