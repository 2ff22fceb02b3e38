use ash::vk;
use crate::renderer::present::error::{PresentError, PresentResult};
use crate::renderer::present::FrameContext;
use crate::renderer::targets::ClearPassTargets;

/// Records the per-frame command buffers.
///
/// There is one command buffer per chain image, and it is re-recorded every time that
/// image is acquired. The frame synchronizer guarantees the previous submission using
/// it has retired by then.
pub struct FrameRecorder {
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    clear_color: [f32; 4],
    device: ash::Device,
}

impl FrameRecorder {
    pub fn new(device: ash::Device, queue_family: u32, clear_color: [f32; 4]) -> PresentResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            device.create_command_pool(&pool_info, None)?
        };

        Ok(Self {
            command_pool,
            command_buffers: Vec::new(),
            clear_color,
            device,
        })
    }

    // A rebuilt chain can come back with more images than before
    fn command_buffer(&mut self, image_index: u32) -> PresentResult<vk::CommandBuffer> {
        let index = image_index as usize;
        if index >= self.command_buffers.len() {
            let command_buffer_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(self.command_pool)
                .command_buffer_count((index + 1 - self.command_buffers.len()) as u32)
                .level(vk::CommandBufferLevel::PRIMARY);
            let allocated = unsafe {
                self.device.allocate_command_buffers(&command_buffer_info)?
            };
            self.command_buffers.extend(allocated);
        }
        Ok(self.command_buffers[index])
    }

    pub fn record(
        &mut self,
        frame: &FrameContext,
        targets: Option<&ClearPassTargets>,
    ) -> PresentResult<vk::CommandBuffer> {
        let targets = targets.ok_or(PresentError::TargetsUnavailable)?;
        let framebuffer = targets
            .framebuffer(frame.image.0)
            .ok_or(PresentError::TargetsUnavailable)?;
        let command_buffer = self.command_buffer(frame.image.0)?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(targets.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: frame.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
            self.device
                .begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::default())?;
            self.device
                .cmd_begin_render_pass(command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
            self.device.cmd_end_render_pass(command_buffer);
            self.device.end_command_buffer(command_buffer)?;
        }

        Ok(command_buffer)
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        unsafe {
            // Frees the command buffers with it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
