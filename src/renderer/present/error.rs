use std::time::Duration;
use ash::vk;
use thiserror::Error;

/// Failures the presentation engine can report to its caller.
///
/// A stale chain (suboptimal or out-of-date) is not an error: it is handled
/// inside the render loop and never leaves a single iteration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresentError {
    /// The surface currently reports no usable formats or present modes
    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// The surface was destroyed underneath us, it will not come back
    #[error("Surface lost")]
    SurfaceLost,

    /// The surface currently has no area to present into (e.g. a minimized window)
    #[error("Surface has zero area ({width}x{height})")]
    ZeroAreaSurface { width: u32, height: u32 },

    /// The logical device was lost, there is no recovery path
    #[error("Device lost")]
    DeviceLost,

    /// A finite fence or acquire timeout expired
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A frame was recorded before its chain-dependent targets were built
    #[error("Render targets are not built for the current image chain")]
    TargetsUnavailable,

    /// Any other Vulkan failure
    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),
}

impl PresentError {
    /// Whether the render loop must stop.
    ///
    /// `ZeroAreaSurface` and `SurfaceUnavailable` can clear up once the window
    /// is restored, so they are retried on later iterations.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PresentError::ZeroAreaSurface { .. } | PresentError::SurfaceUnavailable(_)
        )
    }
}

impl From<vk::Result> for PresentError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => PresentError::DeviceLost,
            vk::Result::ERROR_SURFACE_LOST_KHR => PresentError::SurfaceLost,
            // The caller knows the actual timeout, see `PresentError::timeout`
            vk::Result::TIMEOUT | vk::Result::NOT_READY => PresentError::Timeout(Duration::ZERO),
            other => PresentError::Vulkan(other),
        }
    }
}

impl PresentError {
    /// Fills in the duration of a timeout produced by the `vk::Result` conversion
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match self {
            PresentError::Timeout(_) => PresentError::Timeout(timeout),
            other => other,
        }
    }
}

pub type PresentResult<T> = std::result::Result<T, PresentError>;

/// Converts a duration to the nanosecond count Vulkan waits take.
/// Anything that does not fit saturates to `u64::MAX`, which drivers treat as infinite.
pub fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}
