use std::time::Duration;
use ash::vk;

/// Contains configuration options for the renderer like the number of frames in flight,
/// vsync, and the present mode and surface format preferences
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub frames_in_flight: usize,

    // Forces FIFO regardless of `present_modes`
    pub vsync: bool,

    /// Present modes in order of preference. FIFO is always the final fallback since
    /// every driver has to support it.
    pub present_modes: Vec<vk::PresentModeKHR>,

    /// Surface formats in order of preference. When none is reported the first
    /// format the surface reports is used.
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,

    pub fence_timeout: Duration,
    pub acquire_timeout: Duration,

    pub clear_color: [f32; 4],
}

impl RenderConfig {
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight.max(1);
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: Self::DEFAULT_FRAMES_IN_FLIGHT,
            vsync: false,
            present_modes: vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
            surface_formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            // Effectively infinite, drivers treat u64::MAX nanoseconds as "no timeout"
            fence_timeout: Duration::from_nanos(u64::MAX),
            acquire_timeout: Duration::from_nanos(u64::MAX),
            clear_color: [0.02, 0.02, 0.05, 1.0],
        }
    }
}
