use ash::vk;
use crate::renderer::present::chain::ChainParams;
use crate::renderer::present::error::PresentResult;

/// What the surface reports it can do, queried fresh on every chain build
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Result of asking the chain for its next image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready(u32),
    /// The image is usable this frame but the chain should be rebuilt
    Suboptimal(u32),
    /// The chain can no longer be presented to
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    pub fn is_stale(self) -> bool {
        !matches!(self, PresentStatus::Optimal)
    }
}

/// One queue submission gated by a frame slot's signals
pub struct SubmitWork<'a> {
    pub wait: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub command_buffers: &'a [vk::CommandBuffer],
    pub signal: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Everything the presentation engine needs from the graphics device, the
/// graphics+present queue and the surface.
///
/// Handles are raw `ash::vk` handles. Ownership of every created handle passes
/// to the caller, which must hand it back to the matching `destroy_*` call.
pub trait PresentDevice {
    fn surface_support(&self) -> PresentResult<SurfaceSupport>;

    fn create_swapchain(
        &self,
        params: &ChainParams,
        old_swapchain: vk::SwapchainKHR,
    ) -> PresentResult<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> PresentResult<Vec<vk::Image>>;

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> PresentResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_semaphore(&self) -> PresentResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self, signaled: bool) -> PresentResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> PresentResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> PresentResult<()>;

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> PresentResult<AcquireOutcome>;
    fn queue_submit(&self, work: &SubmitWork) -> PresentResult<()>;
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> PresentResult<PresentStatus>;

    /// Blocks until the device has no outstanding work
    fn wait_idle(&self) -> PresentResult<()>;
}
