use std::sync::Arc;
use std::time::Duration;
use ash::vk;
use smallvec::SmallVec;
use crate::renderer::config::RenderConfig;
use crate::renderer::present::chain::ImageChain;
use crate::renderer::present::device::{AcquireOutcome, PresentDevice, PresentStatus, SubmitWork};
use crate::renderer::present::error::{timeout_nanos, PresentResult};

/// Identifies a set of synchronization primitives, not the image being drawn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameSlotIndex(pub usize);

/// Index of an image inside the current chain, as handed out by acquire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AcquiredImageIndex(pub u32);

pub struct Semaphore<D: PresentDevice> {
    handle: vk::Semaphore,
    device: Arc<D>,
}

impl<D: PresentDevice> Semaphore<D> {
    pub fn new(device: Arc<D>) -> PresentResult<Self> {
        let handle = device.create_semaphore()?;
        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl<D: PresentDevice> Drop for Semaphore<D> {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.handle);
    }
}

pub struct Fence<D: PresentDevice> {
    handle: vk::Fence,
    device: Arc<D>,
}

impl<D: PresentDevice> Fence<D> {
    pub fn new(device: Arc<D>, signaled: bool) -> PresentResult<Self> {
        let handle = device.create_fence(signaled)?;
        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    pub fn wait(&self, timeout: Duration) -> PresentResult<()> {
        self.device
            .wait_for_fence(self.handle, timeout_nanos(timeout))
            .map_err(|e| e.with_timeout(timeout))
    }

    pub fn reset(&self) -> PresentResult<()> {
        self.device.reset_fence(self.handle)
    }
}

impl<D: PresentDevice> Drop for Fence<D> {
    fn drop(&mut self) {
        self.device.destroy_fence(self.handle);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// The fence has been observed signaled, the slot's primitives are free
    Idle,
    /// Queue submission is underway
    Submitted,
    /// Work is on the GPU, nobody has waited for the fence yet
    Retiring,
}

pub struct FrameSlot<D: PresentDevice> {
    // Signals when the acquired image is ready to be rendered into
    image_available: Semaphore<D>,

    // Signals when rendering has finished, waited on by present
    render_finished: Semaphore<D>,

    // Signals when all GPU work submitted for this slot has retired.
    // Created signaled so the first wait returns immediately.
    in_flight: Fence<D>,

    state: SlotState,

    // A suboptimal acquire signaled `image_available` but nothing will ever wait on it
    availability_orphaned: bool,
}

impl<D: PresentDevice> FrameSlot<D> {
    fn new(device: &Arc<D>) -> PresentResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
            state: SlotState::Idle,
            availability_orphaned: false,
        })
    }
}

pub enum Acquired {
    Image(AcquiredImageIndex),
    /// The chain is suboptimal or out of date, nothing may be submitted this iteration
    Stale,
}

/// Round-robins N frame slots and sequences acquire, submit and present.
///
/// Waiting on a slot's fence before reusing it is what bounds the number of frames in
/// flight to N. The slot counter advances once per loop iteration whether or not the
/// frame was actually rendered.
pub struct FrameSync<D: PresentDevice> {
    slots: SmallVec<[FrameSlot<D>; 3]>,
    frame_counter: u64,

    // The slot whose submission last rendered into each image of the current chain
    image_owners: Vec<Option<FrameSlotIndex>>,

    fence_timeout: Duration,
    acquire_timeout: Duration,
    device: Arc<D>,
}

impl<D: PresentDevice> FrameSync<D> {
    pub fn new(device: Arc<D>, config: &RenderConfig, image_count: usize) -> PresentResult<Self> {
        assert!(config.frames_in_flight > 0, "at least one frame must be allowed in flight");

        let slots = (0..config.frames_in_flight)
            .map(|_| FrameSlot::new(&device))
            .collect::<PresentResult<SmallVec<[FrameSlot<D>; 3]>>>()?;

        log::info!("Frame synchronizer created with {} frames in flight", slots.len());

        Ok(Self {
            slots,
            frame_counter: 0,
            image_owners: vec![None; image_count],
            fence_timeout: config.fence_timeout,
            acquire_timeout: config.acquire_timeout,
            device,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn current_slot(&self) -> FrameSlotIndex {
        FrameSlotIndex((self.frame_counter % self.slots.len() as u64) as usize)
    }

    pub fn slot_state(&self, slot: FrameSlotIndex) -> SlotState {
        self.slots[slot.0].state
    }

    /// Blocks until the GPU has retired the work last submitted with the current slot
    pub fn begin_frame(&mut self) -> PresentResult<FrameSlotIndex> {
        let slot = self.current_slot();
        let frame = &mut self.slots[slot.0];
        frame.in_flight.wait(self.fence_timeout)?;
        frame.state = SlotState::Idle;
        Ok(slot)
    }

    pub fn acquire_image(
        &mut self,
        slot: FrameSlotIndex,
        chain: &ImageChain<D>,
    ) -> PresentResult<Acquired> {
        let frame = &mut self.slots[slot.0];
        match chain.acquire_next(frame.image_available.handle(), self.acquire_timeout)? {
            AcquireOutcome::Ready(index) => {
                let image = AcquiredImageIndex(index);
                self.wait_for_image(slot, image)?;
                Ok(Acquired::Image(image))
            }
            AcquireOutcome::Suboptimal(index) => {
                log::debug!("Acquired image {} from a suboptimal chain", index);
                frame.availability_orphaned = true;
                Ok(Acquired::Stale)
            }
            AcquireOutcome::OutOfDate => {
                log::debug!("Image chain out of date on acquire");
                Ok(Acquired::Stale)
            }
        }
    }

    // The command buffer for an image is reused every time the image comes around,
    // so the slot that last rendered into it has to be done first.
    fn wait_for_image(&mut self, slot: FrameSlotIndex, image: AcquiredImageIndex) -> PresentResult<()> {
        let index = image.0 as usize;
        if index >= self.image_owners.len() {
            self.image_owners.resize(index + 1, None);
        }
        if let Some(owner) = self.image_owners[index] {
            if owner != slot && self.slots[owner.0].state != SlotState::Idle {
                self.slots[owner.0].in_flight.wait(self.fence_timeout)?;
                self.slots[owner.0].state = SlotState::Idle;
            }
        }
        Ok(())
    }

    /// Submits work that waits for the slot's image at color output and signals the
    /// slot's completion semaphore and fence once it retires
    pub fn submit(
        &mut self,
        slot: FrameSlotIndex,
        image: AcquiredImageIndex,
        command_buffers: &[vk::CommandBuffer],
    ) -> PresentResult<()> {
        let frame = &mut self.slots[slot.0];
        debug_assert_eq!(frame.state, SlotState::Idle);

        // Reset only right before submitting, a skipped frame must leave the fence signaled
        frame.in_flight.reset()?;
        frame.state = SlotState::Submitted;
        self.device.queue_submit(&SubmitWork {
            wait: frame.image_available.handle(),
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            command_buffers,
            signal: frame.render_finished.handle(),
            fence: frame.in_flight.handle(),
        })?;
        frame.state = SlotState::Retiring;

        if let Some(owner) = self.image_owners.get_mut(image.0 as usize) {
            *owner = Some(slot);
        }
        Ok(())
    }

    pub fn present(
        &mut self,
        slot: FrameSlotIndex,
        chain: &ImageChain<D>,
        image: AcquiredImageIndex,
    ) -> PresentResult<PresentStatus> {
        let frame = &self.slots[slot.0];
        self.device
            .queue_present(chain.handle(), image.0, frame.render_finished.handle())
    }

    pub fn advance(&mut self) {
        self.frame_counter += 1;
    }

    /// Called after a full device idle barrier: every slot has retired, and any
    /// availability semaphore left signaled by a skipped frame is replaced.
    pub fn on_device_idle(&mut self) -> PresentResult<()> {
        for (index, frame) in self.slots.iter_mut().enumerate() {
            frame.state = SlotState::Idle;
            if frame.availability_orphaned {
                frame.image_available = Semaphore::new(self.device.clone())?;
                frame.availability_orphaned = false;
                log::debug!("Replaced orphaned availability semaphore of slot {}", index);
            }
        }
        Ok(())
    }

    pub fn on_chain_rebuilt(&mut self, image_count: usize) {
        self.image_owners.clear();
        self.image_owners.resize(image_count, None);
    }
}
