use ash::vk;
use crate::renderer::present::chain::ImageChain;
use crate::renderer::present::error::PresentResult;
use crate::renderer::present::recreate::TargetBuilder;
use crate::renderer::present::vulkan::VulkanPresentDevice;

/// Render pass and one framebuffer per chain image, for a pass that only clears
pub struct ClearPassTargets {
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub extent: vk::Extent2D,
    device: ash::Device,
}

impl ClearPassTargets {
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }
}

impl Drop for ClearPassTargets {
    fn drop(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

pub struct ClearPassBuilder {
    device: ash::Device,
}

impl ClearPassBuilder {
    pub fn new(device: ash::Device) -> Self {
        Self { device }
    }

    fn create_render_pass(&self, format: vk::Format) -> PresentResult<vk::RenderPass> {
        let color_attachment = vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);
        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);

        // The layout transition must wait for the image to be released by the presentation
        // engine, which the submit only guarantees at color attachment output
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

        let attachments = [color_attachment];
        let subpasses = [subpass];
        let dependencies = [dependency];
        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        Ok(unsafe {
            self.device.create_render_pass(&render_pass_info, None)?
        })
    }
}

impl TargetBuilder for ClearPassBuilder {
    type Device = VulkanPresentDevice;
    type Targets = ClearPassTargets;

    fn build(&mut self, chain: &ImageChain<VulkanPresentDevice>) -> PresentResult<ClearPassTargets> {
        let extent = chain.extent();
        let render_pass = self.create_render_pass(chain.format())?;

        // Owned from here on so a failed framebuffer still cleans up
        let mut targets = ClearPassTargets {
            render_pass,
            framebuffers: Vec::with_capacity(chain.image_count()),
            extent,
            device: self.device.clone(),
        };

        for image in chain.images() {
            let attachments = [image.view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe {
                self.device.create_framebuffer(&framebuffer_info, None)?
            };
            targets.framebuffers.push(framebuffer);
        }

        log::debug!(
            "Built {} framebuffers at {}x{}",
            targets.framebuffers.len(),
            extent.width,
            extent.height,
        );
        Ok(targets)
    }
}
