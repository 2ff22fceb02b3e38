use std::sync::Arc;
use std::time::Duration;
use ash::vk;
use crate::renderer::config::RenderConfig;
use crate::renderer::present::device::{AcquireOutcome, PresentDevice, SurfaceSupport};
use crate::renderer::present::error::{timeout_nanos, PresentError, PresentResult};
use crate::renderer::present::sync::AcquiredImageIndex;

/// Everything negotiated with the surface for one chain instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainParams {
    pub image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub image_usage: vk::ImageUsageFlags,
}

impl ChainParams {
    /// Picks image count, format, present mode and extent from what the surface supports.
    ///
    /// `requested_extent` is only used when the surface leaves the extent up to us,
    /// which it signals with a current extent of `u32::MAX`.
    pub fn negotiate(
        support: &SurfaceSupport,
        config: &RenderConfig,
        requested_extent: vk::Extent2D,
    ) -> PresentResult<Self> {
        let surface_format = choose_surface_format(&support.formats, &config.surface_formats)
            .ok_or_else(|| PresentError::SurfaceUnavailable("no surface formats reported".to_string()))?;
        if support.present_modes.is_empty() {
            return Err(PresentError::SurfaceUnavailable("no present modes reported".to_string()));
        }

        let caps = &support.capabilities;

        let extent = choose_extent(caps, requested_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(PresentError::ZeroAreaSurface {
                width: extent.width,
                height: extent.height,
            });
        }

        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        Ok(Self {
            image_count: choose_image_count(caps.min_image_count, caps.max_image_count),
            surface_format,
            present_mode: choose_present_mode(&support.present_modes, config),
            extent,
            pre_transform,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        })
    }
}

/// Request at least one more image than the minimum so we never have to wait on the
/// driver to complete internal operations before another image can be acquired.
/// A maximum of 0 means there is no upper bound.
pub fn choose_image_count(min: u32, max: u32) -> u32 {
    if max > 0 && min + 1 > max {
        max
    } else {
        min + 1
    }
}

/// The first preferred format the surface supports, else the first one it reports.
/// `None` only when the surface reports no formats at all.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    preferred
        .iter()
        .find(|want| {
            available.iter().any(|have| {
                have.format == want.format && have.color_space == want.color_space
            })
        })
        .or_else(|| available.first())
        .copied()
}

pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    config: &RenderConfig,
) -> vk::PresentModeKHR {
    if config.vsync {
        return vk::PresentModeKHR::FIFO;
    }
    config
        .present_modes
        .iter()
        .find(|mode| available.contains(mode))
        .copied()
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    let extent = if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        requested
    };
    // Not `clamp`, a surface is allowed to report min > max while it is being resized
    vk::Extent2D {
        width: extent
            .width
            .max(caps.min_image_extent.width)
            .min(caps.max_image_extent.width),
        height: extent
            .height
            .max(caps.min_image_extent.height)
            .min(caps.max_image_extent.height),
    }
}

/// An image owned by the chain, with the view used to render into it
#[derive(Clone, Copy, Debug)]
pub struct PresentableImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub index: AcquiredImageIndex,
}

/// The rotating set of presentable images negotiated with the surface.
///
/// Format and extent never change for one instance, a surface change builds a new
/// chain. Dropping the chain destroys all views and the swapchain, which is only
/// valid once nothing in flight references its images.
pub struct ImageChain<D: PresentDevice> {
    swapchain: vk::SwapchainKHR,
    images: Vec<PresentableImage>,
    params: ChainParams,

    // Handed to a swapchain creation that failed, the driver no longer presents from it
    retired: bool,
    device: Arc<D>,
}

impl<D: PresentDevice> ImageChain<D> {
    pub fn negotiate(
        device: &D,
        config: &RenderConfig,
        requested_extent: vk::Extent2D,
    ) -> PresentResult<ChainParams> {
        let support = device.surface_support()?;
        ChainParams::negotiate(&support, config, requested_extent)
    }

    /// Queries the surface, negotiates parameters and creates the chain
    pub fn build(
        device: Arc<D>,
        config: &RenderConfig,
        requested_extent: vk::Extent2D,
        previous: Option<&ImageChain<D>>,
    ) -> PresentResult<Self> {
        let params = Self::negotiate(&device, config, requested_extent)?;
        Self::create(device, params, previous)
    }

    /// Creates the chain from already negotiated parameters.
    ///
    /// `previous` is handed to the driver as the chain being replaced so it can reuse
    /// resources. It is retired by this call even on failure, in which case the caller
    /// has to `mark_retired` it. A retired chain is never handed over again.
    pub fn create(
        device: Arc<D>,
        params: ChainParams,
        previous: Option<&ImageChain<D>>,
    ) -> PresentResult<Self> {
        let old_swapchain = previous
            .filter(|chain| !chain.retired)
            .map_or(vk::SwapchainKHR::null(), |chain| chain.swapchain);
        let swapchain = device.create_swapchain(&params, old_swapchain)?;

        // Owned from here on, so an error below still releases what was created
        let mut chain = Self {
            swapchain,
            images: Vec::new(),
            params,
            retired: false,
            device,
        };

        let images = chain.device.swapchain_images(swapchain)?;
        chain.images.reserve(images.len());
        for (index, image) in images.into_iter().enumerate() {
            let view = chain
                .device
                .create_image_view(image, params.surface_format.format)?;
            chain.images.push(PresentableImage {
                image,
                view,
                index: AcquiredImageIndex(index as u32),
            });
        }

        log::info!(
            "Built image chain: {} images, {:?}, {:?}, {}x{}",
            chain.images.len(),
            params.surface_format.format,
            params.present_mode,
            params.extent.width,
            params.extent.height,
        );

        Ok(chain)
    }

    pub fn acquire_next(
        &self,
        availability: vk::Semaphore,
        timeout: Duration,
    ) -> PresentResult<AcquireOutcome> {
        let outcome = self
            .device
            .acquire_next_image(self.swapchain, timeout_nanos(timeout), availability)
            .map_err(|e| e.with_timeout(timeout))?;
        if let AcquireOutcome::Ready(index) | AcquireOutcome::Suboptimal(index) = outcome {
            debug_assert!((index as usize) < self.images.len());
        }
        Ok(outcome)
    }

    pub fn mark_retired(&mut self) {
        self.retired = true;
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn images(&self) -> &[PresentableImage] {
        &self.images
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn format(&self) -> vk::Format {
        self.params.surface_format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.params.extent
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }
}

impl<D: PresentDevice> Drop for ImageChain<D> {
    fn drop(&mut self) {
        for image in self.images.drain(..) {
            self.device.destroy_image_view(image.view);
        }
        self.device.destroy_swapchain(self.swapchain);
        log::debug!("Destroyed image chain {:?}", self.swapchain);
    }
}
