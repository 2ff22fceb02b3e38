use ash::vk;
use crate::renderer::present::chain::ChainParams;
use crate::renderer::present::device::{
    AcquireOutcome, PresentDevice, PresentStatus, SubmitWork, SurfaceSupport,
};
use crate::renderer::present::error::{PresentError, PresentResult};

/// `PresentDevice` backed by a real logical device, queue and window surface.
///
/// Does not own any of them: the `RenderContext` that handed them out destroys them
/// and has to outlive this.
pub struct VulkanPresentDevice {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    queue: vk::Queue,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl VulkanPresentDevice {
    pub fn new(
        instance: &ash::Instance,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
        queue: vk::Queue,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
    ) -> Self {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device);
        Self {
            device,
            physical_device,
            queue,
            surface,
            surface_loader,
            swapchain_loader,
        }
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }
}

impl PresentDevice for VulkanPresentDevice {
    fn surface_support(&self) -> PresentResult<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface_loader
                    .get_physical_device_surface_capabilities(self.physical_device, self.surface)?,
                formats: self
                    .surface_loader
                    .get_physical_device_surface_formats(self.physical_device, self.surface)?,
                present_modes: self
                    .surface_loader
                    .get_physical_device_surface_present_modes(self.physical_device, self.surface)?,
            })
        }
    }

    fn create_swapchain(
        &self,
        params: &ChainParams,
        old_swapchain: vk::SwapchainKHR,
    ) -> PresentResult<vk::SwapchainKHR> {
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(params.image_count)
            .image_format(params.surface_format.format)
            .image_color_space(params.surface_format.color_space)
            .image_extent(params.extent)
            .image_usage(params.image_usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(params.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(params.present_mode)
            .clipped(true)
            .image_array_layers(1)
            .old_swapchain(old_swapchain);

        Ok(unsafe {
            self.swapchain_loader.create_swapchain(&swapchain_info, None)?
        })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe {
            self.swapchain_loader.destroy_swapchain(swapchain, None);
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> PresentResult<Vec<vk::Image>> {
        Ok(unsafe {
            self.swapchain_loader.get_swapchain_images(swapchain)?
        })
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> PresentResult<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image(image);
        Ok(unsafe {
            self.device.create_image_view(&view_info, None)?
        })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe {
            self.device.destroy_image_view(view, None);
        }
    }

    fn create_semaphore(&self) -> PresentResult<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe {
            self.device.create_semaphore(&semaphore_info, None)?
        })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe {
            self.device.destroy_semaphore(semaphore, None);
        }
    }

    fn create_fence(&self, signaled: bool) -> PresentResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        Ok(unsafe {
            self.device.create_fence(&fence_info, None)?
        })
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe {
            self.device.destroy_fence(fence, None);
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> PresentResult<()> {
        Ok(unsafe {
            self.device.wait_for_fences(&[fence], true, timeout_ns)?
        })
    }

    fn reset_fence(&self, fence: vk::Fence) -> PresentResult<()> {
        Ok(unsafe {
            self.device.reset_fences(&[fence])?
        })
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> PresentResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        };
        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Ready(index)),
            Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(PresentError::from(e)),
        }
    }

    fn queue_submit(&self, work: &SubmitWork) -> PresentResult<()> {
        let wait_semaphores = [work.wait];
        let wait_stages = [work.wait_stage];
        let signal_semaphores = [work.signal];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(work.command_buffers)
            .signal_semaphores(&signal_semaphores);

        Ok(unsafe {
            self.device.queue_submit(self.queue, &[submit_info], work.fence)?
        })
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> PresentResult<PresentStatus> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader.queue_present(self.queue, &present_info)
        };
        match result {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(PresentError::from(e)),
        }
    }

    fn wait_idle(&self) -> PresentResult<()> {
        Ok(unsafe {
            self.device.device_wait_idle()?
        })
    }
}
