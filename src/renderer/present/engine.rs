use std::sync::Arc;
use ash::vk;
use crate::renderer::config::RenderConfig;
use crate::renderer::present::chain::ImageChain;
use crate::renderer::present::device::{PresentDevice, PresentStatus};
use crate::renderer::present::error::{PresentError, PresentResult};
use crate::renderer::present::recreate::{
    ChainDependent, RecreateOutcome, RecreateReason, RecreationCoordinator,
};
use crate::renderer::present::sync::{Acquired, AcquiredImageIndex, FrameSlotIndex, FrameSync};

/// What the recording callback gets to know about the frame it records
#[derive(Clone, Copy, Debug)]
pub struct FrameContext {
    pub slot: FrameSlotIndex,
    pub image: AcquiredImageIndex,
    pub extent: vk::Extent2D,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented {
        slot: FrameSlotIndex,
        image: AcquiredImageIndex,
    },
    /// The chain was stale on acquire, nothing was submitted and it has been rebuilt
    Skipped,
    /// The surface has no area, nothing was rendered
    Deferred,
}

/// Owns the image chain, the frame slots and everything built on top of the chain.
///
/// Fields drop in declaration order: dependents, then the chain, then the slots.
pub struct PresentationEngine<D: PresentDevice, T: ChainDependent<D>> {
    dependents: T,
    // None until the surface first has an area
    chain: Option<ImageChain<D>>,
    sync: FrameSync<D>,
    recreation: RecreationCoordinator,

    config: RenderConfig,
    requested_extent: vk::Extent2D,
    device: Arc<D>,
}

impl<D: PresentDevice, T: ChainDependent<D>> PresentationEngine<D, T> {
    /// Builds the first image chain and the dependents on top of it.
    ///
    /// A surface with zero area (a window that starts minimized) is not an error: the
    /// engine starts without a chain, frames report `Deferred`, and the chain is built
    /// on the first iteration after the surface has an area again. Any other failure,
    /// including a surface with no formats or present modes, is returned.
    pub fn new(
        device: Arc<D>,
        config: RenderConfig,
        requested_extent: vk::Extent2D,
        mut dependents: T,
    ) -> PresentResult<Self> {
        let mut recreation = RecreationCoordinator::new();
        let chain = match ImageChain::build(device.clone(), &config, requested_extent, None) {
            Ok(chain) => Some(chain),
            Err(e @ PresentError::ZeroAreaSurface { .. }) => {
                log::warn!("Starting without an image chain: {}", e);
                recreation.request(RecreateReason::FirstBuild);
                None
            }
            Err(e) => return Err(e),
        };
        let image_count = chain.as_ref().map_or(0, ImageChain::image_count);
        let sync = FrameSync::new(device.clone(), &config, image_count)?;
        if let Some(chain) = chain.as_ref() {
            dependents.rebuild(chain)?;
        }

        Ok(Self {
            dependents,
            chain,
            sync,
            recreation,
            config,
            requested_extent,
            device,
        })
    }

    /// Runs one iteration of the render loop.
    ///
    /// `record` is called with the acquired image and the chain dependents and returns
    /// the command buffer to submit for it. It is not called when the frame is skipped
    /// or deferred. The frame slot advances exactly once no matter how the iteration ends,
    /// errors included.
    pub fn render_frame<F>(&mut self, record: F) -> PresentResult<FrameStatus>
    where
        F: FnOnce(&FrameContext, &T) -> PresentResult<vk::CommandBuffer>,
    {
        let status = self.run_frame(record);
        self.sync.advance();
        if let Err(e) = &status {
            if e.is_fatal() {
                log::error!("Frame {} failed: {}", self.sync.frame_counter(), e);
            }
        }
        status
    }

    fn run_frame<F>(&mut self, record: F) -> PresentResult<FrameStatus>
    where
        F: FnOnce(&FrameContext, &T) -> PresentResult<vk::CommandBuffer>,
    {
        // Left over from a deferral or a failed rebuild
        if self.recreation.is_pending() && self.recreate()? == RecreateOutcome::Deferred {
            return Ok(FrameStatus::Deferred);
        }

        let Some(chain) = self.chain.as_ref() else {
            return Ok(FrameStatus::Deferred);
        };

        let slot = self.sync.begin_frame()?;
        let image = match self.sync.acquire_image(slot, chain)? {
            Acquired::Image(image) => image,
            Acquired::Stale => {
                self.recreation.request(RecreateReason::StaleAcquire);
                return match self.recreate()? {
                    RecreateOutcome::Deferred => Ok(FrameStatus::Deferred),
                    _ => Ok(FrameStatus::Skipped),
                };
            }
        };

        let frame = FrameContext {
            slot,
            image,
            extent: chain.extent(),
        };
        let command_buffer = record(&frame, &self.dependents)?;
        self.sync.submit(slot, image, &[command_buffer])?;

        match self.sync.present(slot, chain, image)? {
            PresentStatus::Optimal => {}
            PresentStatus::Suboptimal => {
                self.recreation.request(RecreateReason::PresentSuboptimal);
            }
            PresentStatus::OutOfDate => {
                self.recreation.request(RecreateReason::PresentOutOfDate);
            }
        }
        self.recreate()?;

        Ok(FrameStatus::Presented { slot, image })
    }

    fn recreate(&mut self) -> PresentResult<RecreateOutcome> {
        self.recreation.recreate(
            &self.device,
            &self.config,
            self.requested_extent,
            &mut self.chain,
            &mut self.sync,
            &mut self.dependents,
        )
    }

    /// Records the new window size, used when the surface leaves the extent to us,
    /// and schedules a recreation for the next frame
    pub fn notify_resized(&mut self, extent: vk::Extent2D) {
        self.requested_extent = extent;
        self.recreation.request(RecreateReason::Resized);
    }

    pub fn frame_counter(&self) -> u64 {
        self.sync.frame_counter()
    }

    pub fn recreation_count(&self) -> u64 {
        self.recreation.recreation_count()
    }

    pub fn is_recreation_pending(&self) -> bool {
        self.recreation.is_pending()
    }

    /// `None` while a window that started minimized has not had an area yet
    pub fn chain(&self) -> Option<&ImageChain<D>> {
        self.chain.as_ref()
    }

    pub fn dependents(&self) -> &T {
        &self.dependents
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }
}

impl<D: PresentDevice, T: ChainDependent<D>> Drop for PresentationEngine<D, T> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for the device before shutdown: {}", e);
        }
        self.dependents.release();
        log::debug!("Presentation engine shut down after {} frames", self.sync.frame_counter());
    }
}
