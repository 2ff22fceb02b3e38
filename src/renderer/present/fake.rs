//! Instrumented stand-in for the GPU, used by the presentation engine tests.
//!
//! Submitted work only retires when its fence is waited on or the device is idled,
//! so tests observe the worst case for frames in flight. Every destroy call made
//! while work is still outstanding is counted as a violation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use ash::vk::{self, Handle};
use crate::renderer::present::chain::{ChainParams, ImageChain};
use crate::renderer::present::device::{
    AcquireOutcome, PresentDevice, PresentStatus, SubmitWork, SurfaceSupport,
};
use crate::renderer::present::error::{PresentError, PresentResult};
use crate::renderer::present::recreate::ChainDependent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptedAcquire {
    Image(u32),
    Suboptimal(u32),
    OutOfDate,
    Fail(vk::Result),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FakeEvent {
    WaitIdle,
    CreateSwapchain { extent: vk::Extent2D, image_count: u32 },
    DestroySwapchain,
    Acquire(AcquireOutcome),
    Submit,
    Present(u32, PresentStatus),
    /// Logged by test dependents
    ReleaseTargets(&'static str),
    BuildTargets(&'static str, vk::Extent2D),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiveObjects {
    pub swapchains: usize,
    pub views: usize,
    pub semaphores: usize,
    pub fences: usize,
}

struct SwapchainState {
    images: Vec<vk::Image>,
    next_image: u32,
    // Handed over as an old swapchain, acquiring from it reports out of date
    retired: bool,
}

struct FakeState {
    next_handle: u64,
    support: SurfaceSupport,

    swapchains: HashMap<vk::SwapchainKHR, SwapchainState>,
    views: HashSet<vk::ImageView>,
    semaphores: HashSet<vk::Semaphore>,
    fences: HashMap<vk::Fence, FenceState>,

    acquire_script: VecDeque<ScriptedAcquire>,
    present_script: VecDeque<PresentStatus>,
    fail_fence_wait: Option<vk::Result>,
    fail_swapchain: Option<vk::Result>,
    last_old_swapchain: vk::SwapchainKHR,

    submissions: usize,
    max_in_flight: usize,
    busy_destroys: usize,
    events: Vec<FakeEvent>,
}

impl FakeState {
    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn in_flight(&self) -> usize {
        self.fences
            .values()
            .filter(|state| **state == FenceState::Pending)
            .count()
    }

    fn note_destroy(&mut self) {
        if self.in_flight() > 0 {
            self.busy_destroys += 1;
        }
    }
}

pub struct FakeDevice {
    state: Mutex<FakeState>,
}

impl FakeDevice {
    pub fn new() -> Self {
        let support = SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: vk::Extent2D { width: 800, height: 600 },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        Self {
            state: Mutex::new(FakeState {
                next_handle: 0,
                support,
                swapchains: HashMap::new(),
                views: HashSet::new(),
                semaphores: HashSet::new(),
                fences: HashMap::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fail_fence_wait: None,
                fail_swapchain: None,
                last_old_swapchain: vk::SwapchainKHR::null(),
                submissions: 0,
                max_in_flight: 0,
                busy_destroys: 0,
                events: Vec::new(),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Changes the extent the surface reports, like a window resize would
    pub fn set_extent(&self, width: u32, height: u32) {
        self.state().support.capabilities.current_extent = vk::Extent2D { width, height };
    }

    pub fn set_image_count_limits(&self, min: u32, max: u32) {
        let mut state = self.state();
        state.support.capabilities.min_image_count = min;
        state.support.capabilities.max_image_count = max;
    }

    pub fn update_support(&self, update: impl FnOnce(&mut SurfaceSupport)) {
        update(&mut self.state().support);
    }

    pub fn script_acquire(&self, outcome: ScriptedAcquire) {
        self.state().acquire_script.push_back(outcome);
    }

    pub fn script_present(&self, status: PresentStatus) {
        self.state().present_script.push_back(status);
    }

    pub fn fail_next_fence_wait(&self, result: vk::Result) {
        self.state().fail_fence_wait = Some(result);
    }

    pub fn fail_next_swapchain(&self, result: vk::Result) {
        self.state().fail_swapchain = Some(result);
    }

    pub fn record(&self, event: FakeEvent) {
        let mut state = self.state();
        if matches!(event, FakeEvent::ReleaseTargets(_)) {
            state.note_destroy();
        }
        state.events.push(event);
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    pub fn live(&self) -> LiveObjects {
        let state = self.state();
        LiveObjects {
            swapchains: state.swapchains.len(),
            views: state.views.len(),
            semaphores: state.semaphores.len(),
            fences: state.fences.len(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state().in_flight()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    pub fn submissions(&self) -> usize {
        self.state().submissions
    }

    /// Destroy calls made while submitted work had not retired
    pub fn busy_destroys(&self) -> usize {
        self.state().busy_destroys
    }

    pub fn last_old_swapchain(&self) -> vk::SwapchainKHR {
        self.state().last_old_swapchain
    }
}

impl PresentDevice for FakeDevice {
    fn surface_support(&self) -> PresentResult<SurfaceSupport> {
        Ok(self.state().support.clone())
    }

    fn create_swapchain(
        &self,
        params: &ChainParams,
        old_swapchain: vk::SwapchainKHR,
    ) -> PresentResult<vk::SwapchainKHR> {
        let mut state = self.state();
        if old_swapchain != vk::SwapchainKHR::null() {
            let old = state.swapchains.get_mut(&old_swapchain).expect("old swapchain already destroyed");
            assert!(!old.retired, "old swapchain handed over twice");
            // Retired whether or not the creation succeeds
            old.retired = true;
        }
        state.last_old_swapchain = old_swapchain;
        if let Some(result) = state.fail_swapchain.take() {
            return Err(result.into());
        }

        let swapchain = vk::SwapchainKHR::from_raw(state.mint());
        let images = (0..params.image_count)
            .map(|_| vk::Image::from_raw(state.mint()))
            .collect();
        state.swapchains.insert(swapchain, SwapchainState { images, next_image: 0, retired: false });
        state.events.push(FakeEvent::CreateSwapchain {
            extent: params.extent,
            image_count: params.image_count,
        });
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state();
        state.note_destroy();
        assert!(state.swapchains.remove(&swapchain).is_some(), "double destroy of swapchain");
        state.events.push(FakeEvent::DestroySwapchain);
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> PresentResult<Vec<vk::Image>> {
        let state = self.state();
        state
            .swapchains
            .get(&swapchain)
            .map(|chain| chain.images.clone())
            .ok_or(PresentError::Vulkan(vk::Result::ERROR_UNKNOWN))
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> PresentResult<vk::ImageView> {
        let mut state = self.state();
        let view = vk::ImageView::from_raw(state.mint());
        state.views.insert(view);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.state();
        state.note_destroy();
        assert!(state.views.remove(&view), "double destroy of image view");
    }

    fn create_semaphore(&self) -> PresentResult<vk::Semaphore> {
        let mut state = self.state();
        let semaphore = vk::Semaphore::from_raw(state.mint());
        state.semaphores.insert(semaphore);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state();
        state.note_destroy();
        assert!(state.semaphores.remove(&semaphore), "double destroy of semaphore");
    }

    fn create_fence(&self, signaled: bool) -> PresentResult<vk::Fence> {
        let mut state = self.state();
        let fence = vk::Fence::from_raw(state.mint());
        let initial = if signaled { FenceState::Signaled } else { FenceState::Unsignaled };
        state.fences.insert(fence, initial);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        state.note_destroy();
        assert!(state.fences.remove(&fence).is_some(), "double destroy of fence");
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> PresentResult<()> {
        let mut state = self.state();
        if let Some(result) = state.fail_fence_wait.take() {
            return Err(result.into());
        }
        let fence_state = state.fences.get_mut(&fence).expect("wait on unknown fence");
        match *fence_state {
            FenceState::Signaled => Ok(()),
            FenceState::Pending => {
                *fence_state = FenceState::Signaled;
                Ok(())
            }
            // Nothing will ever signal it, a real device would hang here
            FenceState::Unsignaled => Err(vk::Result::TIMEOUT.into()),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> PresentResult<()> {
        let mut state = self.state();
        let fence_state = state.fences.get_mut(&fence).expect("reset of unknown fence");
        assert_ne!(*fence_state, FenceState::Pending, "reset of a fence still in flight");
        *fence_state = FenceState::Unsignaled;
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> PresentResult<AcquireOutcome> {
        let mut state = self.state();
        assert!(state.semaphores.contains(&signal), "acquire with unknown semaphore");
        let scripted = state.acquire_script.pop_front();
        let chain = state.swapchains.get_mut(&swapchain).expect("acquire from unknown swapchain");
        let count = chain.images.len() as u32;
        if chain.retired {
            state.events.push(FakeEvent::Acquire(AcquireOutcome::OutOfDate));
            return Ok(AcquireOutcome::OutOfDate);
        }

        let outcome = match scripted {
            None => {
                let index = chain.next_image;
                chain.next_image = (index + 1) % count;
                AcquireOutcome::Ready(index)
            }
            Some(ScriptedAcquire::Image(index)) => AcquireOutcome::Ready(index),
            Some(ScriptedAcquire::Suboptimal(index)) => AcquireOutcome::Suboptimal(index),
            Some(ScriptedAcquire::OutOfDate) => AcquireOutcome::OutOfDate,
            Some(ScriptedAcquire::Fail(result)) => return Err(result.into()),
        };
        state.events.push(FakeEvent::Acquire(outcome));
        Ok(outcome)
    }

    fn queue_submit(&self, work: &SubmitWork) -> PresentResult<()> {
        let mut state = self.state();
        assert!(state.semaphores.contains(&work.wait), "submit waits on unknown semaphore");
        assert!(state.semaphores.contains(&work.signal), "submit signals unknown semaphore");
        assert_eq!(work.wait_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);

        let fence_state = state.fences.get_mut(&work.fence).expect("submit with unknown fence");
        assert_eq!(*fence_state, FenceState::Unsignaled, "submit with a fence that was not reset");
        *fence_state = FenceState::Pending;

        state.submissions += 1;
        let in_flight = state.in_flight();
        state.max_in_flight = state.max_in_flight.max(in_flight);
        state.events.push(FakeEvent::Submit);
        Ok(())
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> PresentResult<PresentStatus> {
        let mut state = self.state();
        assert!(state.swapchains.contains_key(&swapchain), "present to unknown swapchain");
        assert!(state.semaphores.contains(&wait), "present waits on unknown semaphore");
        let status = state.present_script.pop_front().unwrap_or(PresentStatus::Optimal);
        state.events.push(FakeEvent::Present(image_index, status));
        Ok(status)
    }

    fn wait_idle(&self) -> PresentResult<()> {
        let mut state = self.state();
        for fence_state in state.fences.values_mut() {
            if *fence_state == FenceState::Pending {
                *fence_state = FenceState::Signaled;
            }
        }
        state.events.push(FakeEvent::WaitIdle);
        Ok(())
    }
}

/// Chain dependent that logs its release and rebuild calls into the device's event log
pub struct TrackedTargets {
    pub name: &'static str,
    pub built_for: Option<vk::Extent2D>,
    device: Arc<FakeDevice>,
}

impl TrackedTargets {
    pub fn new(name: &'static str, device: Arc<FakeDevice>) -> Self {
        Self { name, built_for: None, device }
    }
}

impl ChainDependent<FakeDevice> for TrackedTargets {
    fn release(&mut self) {
        if self.built_for.take().is_some() {
            self.device.record(FakeEvent::ReleaseTargets(self.name));
        }
    }

    fn rebuild(&mut self, chain: &ImageChain<FakeDevice>) -> PresentResult<()> {
        self.device.record(FakeEvent::BuildTargets(self.name, chain.extent()));
        self.built_for = Some(chain.extent());
        Ok(())
    }
}
