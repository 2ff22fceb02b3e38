use std::sync::Arc;
use ash::vk;
use crate::renderer::config::RenderConfig;
use crate::renderer::present::chain::ImageChain;
use crate::renderer::present::device::PresentDevice;
use crate::renderer::present::error::PresentResult;
use crate::renderer::present::sync::FrameSync;

/// Objects built on top of the image chain, like framebuffers, that have to be
/// thrown away and rebuilt whenever the chain is.
pub trait ChainDependent<D: PresentDevice> {
    /// Destroys everything that references the current chain. Must be safe to call
    /// when nothing is built.
    fn release(&mut self);

    fn rebuild(&mut self, chain: &ImageChain<D>) -> PresentResult<()>;
}

impl<D: PresentDevice> ChainDependent<D> for () {
    fn release(&mut self) {}

    fn rebuild(&mut self, _chain: &ImageChain<D>) -> PresentResult<()> {
        Ok(())
    }
}

// Released and rebuilt in list order
impl<D: PresentDevice> ChainDependent<D> for Vec<Box<dyn ChainDependent<D>>> {
    fn release(&mut self) {
        for dependent in self.iter_mut() {
            dependent.release();
        }
    }

    fn rebuild(&mut self, chain: &ImageChain<D>) -> PresentResult<()> {
        for dependent in self.iter_mut() {
            dependent.rebuild(chain)?;
        }
        Ok(())
    }
}

/// Produces render targets bound to one image chain
pub trait TargetBuilder {
    type Device: PresentDevice;
    type Targets;

    fn build(&mut self, chain: &ImageChain<Self::Device>) -> PresentResult<Self::Targets>;
}

/// Holds the targets built for the current chain, the engine only ever drops and
/// rebuilds them
pub struct ChainTargets<B: TargetBuilder> {
    targets: Option<B::Targets>,
    builder: B,
}

impl<B: TargetBuilder> ChainTargets<B> {
    pub fn new(builder: B) -> Self {
        Self { targets: None, builder }
    }

    pub fn get(&self) -> Option<&B::Targets> {
        self.targets.as_ref()
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }
}

impl<B: TargetBuilder> ChainDependent<B::Device> for ChainTargets<B> {
    fn release(&mut self) {
        self.targets = None;
    }

    fn rebuild(&mut self, chain: &ImageChain<B::Device>) -> PresentResult<()> {
        self.targets = Some(self.builder.build(chain)?);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecreateReason {
    /// The surface had no area when the engine was created
    FirstBuild,
    StaleAcquire,
    PresentSuboptimal,
    PresentOutOfDate,
    Resized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecreateOutcome {
    Rebuilt,
    /// The surface has no area right now, nothing was touched and the request stays pending
    Deferred,
    /// Nothing was requested
    Idle,
}

/// Collects chain invalidation triggers and runs at most one rebuild for all of them.
///
/// Requests made while one is already pending are merged into it, so any number of
/// triggers in one loop iteration cost a single recreation. `recreate` takes the
/// chain and synchronizer by exclusive reference, which makes reentry impossible.
#[derive(Debug, Default)]
pub struct RecreationCoordinator {
    pending: Option<RecreateReason>,
    recreations: u64,
    deferred_streak: u32,
}

impl RecreationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a recreation was already pending and the trigger was merged
    pub fn request(&mut self, reason: RecreateReason) -> bool {
        if let Some(pending) = self.pending {
            log::debug!("Ignoring {:?}, recreation already pending for {:?}", reason, pending);
            return false;
        }
        log::info!("Image chain recreation requested: {:?}", reason);
        self.pending = Some(reason);
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn recreation_count(&self) -> u64 {
        self.recreations
    }

    /// Rebuilds the chain and everything that depends on it if a recreation is pending.
    ///
    /// Order: device idle, release dependents, create the new chain from the old one,
    /// destroy the old chain, rebuild dependents. Negotiation happens first so that a
    /// zero-area surface defers the whole thing before anything is destroyed. `chain`
    /// is `None` until a first chain could be built.
    ///
    /// When the new chain cannot be created the old one stays in place, retired, and the
    /// request stays pending.
    pub fn recreate<D, T>(
        &mut self,
        device: &Arc<D>,
        config: &RenderConfig,
        requested_extent: vk::Extent2D,
        chain: &mut Option<ImageChain<D>>,
        sync: &mut FrameSync<D>,
        dependents: &mut T,
    ) -> PresentResult<RecreateOutcome>
    where
        D: PresentDevice,
        T: ChainDependent<D>,
    {
        let Some(reason) = self.pending else {
            return Ok(RecreateOutcome::Idle);
        };

        let params = match ImageChain::<D>::negotiate(device, config, requested_extent) {
            Ok(params) => params,
            Err(e) if !e.is_fatal() => {
                if self.deferred_streak == 0 {
                    log::warn!("Deferring image chain recreation: {}", e);
                } else {
                    log::debug!("Still deferring image chain recreation: {}", e);
                }
                self.deferred_streak += 1;
                return Ok(RecreateOutcome::Deferred);
            }
            Err(e) => return Err(e),
        };

        device.wait_idle()?;
        sync.on_device_idle()?;

        dependents.release();

        let replacement = match ImageChain::create(device.clone(), params, chain.as_ref()) {
            Ok(replacement) => replacement,
            Err(e) => {
                if let Some(old) = chain.as_mut() {
                    old.mark_retired();
                }
                return Err(e);
            }
        };
        let old = chain.take();
        let chain = chain.insert(replacement);
        drop(old);

        sync.on_chain_rebuilt(chain.image_count());
        dependents.rebuild(chain)?;

        self.pending = None;
        self.recreations += 1;
        self.deferred_streak = 0;
        log::info!(
            "Recreated image chain ({:?}), now {}x{}",
            reason,
            chain.extent().width,
            chain.extent().height,
        );
        Ok(RecreateOutcome::Rebuilt)
    }
}
