//! Input device registry
//!
//! Tracks the two controller slots through their connection lifecycle. On
//! connect, profile resolution runs on its own task and reports back over a
//! channel; the session loop applies results between ticks, so all registry
//! mutation stays on one thread. A per-slot generation counter plus a
//! cancellation token make sure a fetch that outlives its device can never
//! populate the slot of a later connection.
//!
//! A failed resolution is logged and leaves the device registered but inert:
//! it never polls and never selects, and the status board says so.

use chrono::{DateTime, Local};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::state_cache::{ButtonStateCache, StateCacheError};
use crate::device::{
    DeviceStatus, GamepadSnapshot, Handedness, InputSourceDescriptor, StatusBoard, MAX_DEVICES,
};
use crate::profile::{ControlLayout, InputProfile, ProfileError, ProfileService};

/// Buffer for in-flight resolution results. Two slots, so contention is rare.
const RESOLUTION_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("device index {0} is out of range")]
    IndexOutOfRange(usize),
}

/// Result of one profile resolution attempt, delivered over the registry's
/// resolution channel and applied on the session loop.
#[derive(Debug)]
pub struct LayoutResolution {
    pub index: usize,
    pub generation: u64,
    pub result: Result<InputProfile, ProfileError>,
}

#[derive(Debug)]
enum LayoutState {
    Resolving,
    Ready(ControlLayout),
    Failed,
}

#[derive(Debug)]
struct DeviceSlot {
    descriptor: InputSourceDescriptor,
    connected_at: DateTime<Local>,
    generation: u64,
    layout: LayoutState,
    cache: ButtonStateCache,
    cancel: CancellationToken,
}

/// Registry of connected devices and their resolved control layouts.
pub struct DeviceRegistry {
    slots: [Option<DeviceSlot>; MAX_DEVICES],
    generations: [u64; MAX_DEVICES],
    status: StatusBoard,
    service: Arc<dyn ProfileService>,
    resolution_tx: mpsc::Sender<LayoutResolution>,
    status_tx: watch::Sender<StatusBoard>,
}

impl DeviceRegistry {
    /// Creates a registry plus the channel ends the session loop needs: the
    /// receiver for resolution results and a watch receiver for device status.
    pub fn new(
        service: Arc<dyn ProfileService>,
    ) -> (
        Self,
        mpsc::Receiver<LayoutResolution>,
        watch::Receiver<StatusBoard>,
    ) {
        let (resolution_tx, resolution_rx) = mpsc::channel(RESOLUTION_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(StatusBoard::default());
        let registry = Self {
            slots: [None, None],
            generations: [0; MAX_DEVICES],
            status: StatusBoard::default(),
            service,
            resolution_tx,
            status_tx,
        };
        (registry, resolution_rx, status_rx)
    }

    /// Registers a device and starts resolving its control layout.
    ///
    /// A connect on an occupied slot tears the old registration down first,
    /// which covers hosts that reconnect without a disconnected signal.
    pub fn on_connected(
        &mut self,
        index: usize,
        descriptor: InputSourceDescriptor,
    ) -> Result<(), RegistryError> {
        let handedness =
            Handedness::from_index(index).ok_or(RegistryError::IndexOutOfRange(index))?;
        if self.slots[index].is_some() {
            warn!(
                "Device {} connected over an existing registration, replacing it",
                index
            );
            self.teardown_slot(index);
        }

        self.generations[index] += 1;
        let generation = self.generations[index];
        let cancel = CancellationToken::new();
        info!(
            "Device {} ({}) connected, resolving profile from {:?}",
            index, handedness, descriptor.profiles
        );

        let task_cancel = cancel.clone();
        let service = Arc::clone(&self.service);
        let task_descriptor = descriptor.clone();
        let resolution_tx = self.resolution_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_cancel.cancelled() => {
                    debug!("Profile resolution for device {} cancelled", index);
                }
                result = service.fetch_profile(&task_descriptor) => {
                    let resolution = LayoutResolution { index, generation, result };
                    if resolution_tx.send(resolution).await.is_err() {
                        warn!("Resolution channel closed before device {} resolved", index);
                    }
                }
            }
        });

        self.slots[index] = Some(DeviceSlot {
            descriptor,
            connected_at: Local::now(),
            generation,
            layout: LayoutState::Resolving,
            cache: ButtonStateCache::default(),
            cancel,
        });
        self.set_status(index, DeviceStatus::ResolvingLayout);
        Ok(())
    }

    /// Tears a slot down. Unknown disconnects are normal lifecycle noise.
    pub fn on_disconnected(&mut self, index: usize) -> Result<(), RegistryError> {
        if index >= MAX_DEVICES {
            return Err(RegistryError::IndexOutOfRange(index));
        }
        if self.slots[index].is_none() {
            debug!("Disconnect for device {} with no registration", index);
            return Ok(());
        }
        self.teardown_slot(index);
        self.set_status(index, DeviceStatus::Disconnected);
        Ok(())
    }

    /// Applies one resolution result. Results from a previous registration of
    /// the slot (the generation moved on) are dropped.
    pub fn apply_resolution(&mut self, resolution: LayoutResolution) {
        let LayoutResolution {
            index,
            generation,
            result,
        } = resolution;
        let Some(slot) = self.slots.get_mut(index).and_then(Option::as_mut) else {
            debug!("Dropping resolution for unregistered device {}", index);
            return;
        };
        if slot.generation != generation {
            debug!(
                "Dropping stale resolution for device {} (generation {} vs {})",
                index, generation, slot.generation
            );
            return;
        }

        let layout = result.and_then(|profile| {
            ControlLayout::from_profile(&profile, slot.descriptor.handedness)
        });
        match layout {
            Ok(layout) => {
                info!(
                    "Device {} layout ready with {} controls",
                    index,
                    layout.len()
                );
                slot.layout = LayoutState::Ready(layout);
                self.set_status(index, DeviceStatus::Ready);
            }
            Err(e) => {
                warn!(
                    "Profile resolution for device {} failed, device stays inert: {}",
                    index, e
                );
                slot.layout = LayoutState::Failed;
                self.set_status(index, DeviceStatus::Inert);
            }
        }
    }

    /// Refreshes the device's button cache from one hardware snapshot.
    ///
    /// Returns `Ok(false)` when the device has no layout (not connected,
    /// still resolving, or resolution failed); the cache is untouched then.
    pub fn refresh(
        &mut self,
        index: usize,
        snapshot: &GamepadSnapshot,
    ) -> Result<bool, StateCacheError> {
        let Some(slot) = self.slots.get_mut(index).and_then(Option::as_mut) else {
            return Ok(false);
        };
        let LayoutState::Ready(layout) = &slot.layout else {
            return Ok(false);
        };
        slot.cache.refresh(layout, snapshot)?;
        Ok(true)
    }

    pub fn is_connected(&self, index: usize) -> bool {
        self.slots.get(index).map_or(false, Option::is_some)
    }

    pub fn control_layout(&self, index: usize) -> Option<&ControlLayout> {
        match &self.slots.get(index)?.as_ref()?.layout {
            LayoutState::Ready(layout) => Some(layout),
            _ => None,
        }
    }

    pub fn button_state(&self, index: usize) -> Option<&ButtonStateCache> {
        Some(&self.slots.get(index)?.as_ref()?.cache)
    }

    pub fn descriptor(&self, index: usize) -> Option<&InputSourceDescriptor> {
        Some(&self.slots.get(index)?.as_ref()?.descriptor)
    }

    pub fn status(&self) -> StatusBoard {
        self.status
    }

    fn teardown_slot(&mut self, index: usize) {
        if let Some(slot) = self.slots[index].take() {
            slot.cancel.cancel();
            self.generations[index] += 1;
            let connected_for = Local::now() - slot.connected_at;
            info!(
                "Device {} disconnected after {}s",
                index,
                connected_for.num_seconds()
            );
        }
    }

    fn set_status(&mut self, index: usize, status: DeviceStatus) {
        self.status[index] = status;
        if self.status_tx.send(self.status).is_err() {
            debug!("No status subscribers left");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::StaticProfileService;
    use async_trait::async_trait;

    struct FailingService;

    #[async_trait]
    impl ProfileService for FailingService {
        async fn fetch_profile(
            &self,
            _descriptor: &InputSourceDescriptor,
        ) -> Result<InputProfile, ProfileError> {
            Err(ProfileError::Fetch("asset host unreachable".to_string()))
        }
    }

    fn descriptor(index: usize) -> InputSourceDescriptor {
        InputSourceDescriptor::new(Handedness::from_index(index).unwrap(), &[])
    }

    #[tokio::test]
    async fn connect_resolves_layout_and_reports_ready() {
        let service = Arc::new(StaticProfileService::bundled().unwrap());
        let (mut registry, mut resolution_rx, status_rx) = DeviceRegistry::new(service);

        registry.on_connected(0, descriptor(0)).unwrap();
        assert_eq!(registry.status()[0], DeviceStatus::ResolvingLayout);
        assert!(registry.control_layout(0).is_none());

        let resolution = resolution_rx.recv().await.unwrap();
        registry.apply_resolution(resolution);

        assert_eq!(registry.status()[0], DeviceStatus::Ready);
        assert_eq!(registry.control_layout(0).unwrap().len(), 4);
        assert_eq!(status_rx.borrow()[0], DeviceStatus::Ready);
    }

    #[tokio::test]
    async fn failed_resolution_leaves_device_registered_but_inert() {
        let (mut registry, mut resolution_rx, _status_rx) =
            DeviceRegistry::new(Arc::new(FailingService));

        registry.on_connected(0, descriptor(0)).unwrap();
        let resolution = resolution_rx.recv().await.unwrap();
        registry.apply_resolution(resolution);

        assert!(registry.is_connected(0));
        assert_eq!(registry.status()[0], DeviceStatus::Inert);
        assert!(registry.control_layout(0).is_none());
    }

    #[tokio::test]
    async fn refresh_without_layout_is_a_noop() {
        let (mut registry, _resolution_rx, _status_rx) =
            DeviceRegistry::new(Arc::new(FailingService));
        registry.on_connected(0, descriptor(0)).unwrap();

        let snapshot = GamepadSnapshot {
            buttons: vec![1.0],
            axes: vec![],
        };
        let refreshed = registry.refresh(0, &snapshot).unwrap();
        assert!(!refreshed);
        assert!(registry.button_state(0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_resolution_after_reconnect_is_dropped() {
        let service = Arc::new(StaticProfileService::bundled().unwrap());
        let (mut registry, mut resolution_rx, _status_rx) = DeviceRegistry::new(service);

        registry.on_connected(0, descriptor(0)).unwrap();
        let stale = resolution_rx.recv().await.unwrap();
        let stale_generation = stale.generation;

        registry.on_disconnected(0).unwrap();
        registry.on_connected(0, descriptor(0)).unwrap();

        registry.apply_resolution(stale);
        assert_eq!(
            registry.status()[0],
            DeviceStatus::ResolvingLayout,
            "a resolution from the old registration must not apply"
        );

        // The fresh registration still resolves normally.
        let fresh = resolution_rx.recv().await.unwrap();
        assert!(fresh.generation > stale_generation);
        registry.apply_resolution(fresh);
        assert_eq!(registry.status()[0], DeviceStatus::Ready);
    }

    #[tokio::test]
    async fn resolution_after_disconnect_is_dropped() {
        let service = Arc::new(StaticProfileService::bundled().unwrap());
        let (mut registry, mut resolution_rx, status_rx) = DeviceRegistry::new(service);

        registry.on_connected(1, descriptor(1)).unwrap();
        let resolution = resolution_rx.recv().await.unwrap();
        registry.on_disconnected(1).unwrap();

        registry.apply_resolution(resolution);
        assert!(!registry.is_connected(1));
        assert_eq!(status_rx.borrow()[1], DeviceStatus::Disconnected);
    }

    #[tokio::test]
    async fn out_of_range_index_is_rejected() {
        let service = Arc::new(StaticProfileService::bundled().unwrap());
        let (mut registry, _resolution_rx, _status_rx) = DeviceRegistry::new(service);
        assert!(matches!(
            registry.on_connected(2, InputSourceDescriptor::new(Handedness::Left, &[])),
            Err(RegistryError::IndexOutOfRange(2))
        ));
    }
}
