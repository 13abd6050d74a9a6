//! The periodic device polling tick.

use crate::button::{ButtonId, DeviceId};
use crate::device::DeviceRegistry;
use crate::event::ShortcutDispatcher;
use crate::platform::{AcquireStatus, BufferedEvent, InputSubsystem, RawDevice};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic hardware-change counter, bumped by the host whenever the
/// operating system reports a device arrival or removal.
#[derive(Debug, Clone, Default)]
pub struct HardwareCounter(Arc<AtomicU64>);

impl HardwareCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub enumerated: bool,
    pub remapped: bool,
    pub removed: Vec<DeviceId>,
    pub dispatched: usize,
}

/// State carried between polling ticks.
pub struct Poller {
    hardware: HardwareCounter,
    last_hardware: Option<u64>,
    enumeration_failing: bool,
    remap: Arc<AtomicBool>,
    press_mask: u32,
    buffer: Vec<BufferedEvent>,
}

impl Poller {
    pub fn new(hardware: HardwareCounter, remap: Arc<AtomicBool>, press_mask: u8) -> Self {
        Self {
            hardware,
            last_hardware: None,
            enumeration_failing: false,
            remap,
            press_mask: u32::from(press_mask),
            buffer: Vec::new(),
        }
    }

    /// Run one tick: re-enumerate if the hardware changed, remap if asked to,
    /// then drain every registered device into `dispatcher`.
    pub fn tick<S: InputSubsystem>(
        &mut self,
        registry: &mut DeviceRegistry<S>,
        dispatcher: &dyn ShortcutDispatcher,
    ) -> TickReport {
        let mut report = TickReport::default();

        // The counter is only marked as seen once enumeration succeeds, so a
        // failed attempt is retried on the next tick.
        let hardware = self.hardware.current();
        if self.last_hardware != Some(hardware) {
            report.enumerated = true;
            match registry.refresh_devices() {
                Ok(_) => {
                    self.last_hardware = Some(hardware);
                    self.enumeration_failing = false;
                }
                Err(e) if self.enumeration_failing => {
                    log::trace!("Device enumeration still failing: {:#}", e);
                }
                Err(e) => {
                    log::warn!("Device enumeration failed, retrying: {:#}", e);
                    self.enumeration_failing = true;
                }
            }
        }

        if self.remap.swap(false, Ordering::SeqCst) {
            report.remapped = true;
            registry.remap();
            dispatcher.remap();
        }

        for id in registry.ids() {
            let Some(device) = registry.get_mut(id) else {
                continue;
            };
            let (controls, handle) = device.parts_mut();

            match handle.acquire() {
                AcquireStatus::Acquired
                | AcquireStatus::AlreadyAcquired
                | AcquireStatus::Other(_) => {}
                AcquireStatus::OtherHasPriority => {
                    log::trace!("Device {} busy, retrying next tick", id);
                    continue;
                }
                AcquireStatus::Removed => {
                    report.removed.push(id);
                    continue;
                }
            }

            handle.poll();
            self.buffer.clear();
            if let Err(e) = handle.read_buffered(&mut self.buffer) {
                // A read can be the first thing to notice an unplug.
                if handle.acquire() == AcquireStatus::Removed {
                    log::debug!("Device {} vanished while reading: {:#}", id, e);
                    report.removed.push(id);
                } else {
                    log::trace!("Reading device {} failed: {:#}", id, e);
                }
                continue;
            }

            for item in &self.buffer {
                let Some(type_code) = controls.type_for_offset(item.offset) else {
                    log::trace!("Device {} reported unmapped offset {}", id, item.offset);
                    continue;
                };
                let pressed = item.data & self.press_mask != 0;
                dispatcher.handle_button(ButtonId::new(type_code, id), pressed);
                report.dispatched += 1;
            }
        }

        for id in &report.removed {
            registry.remove(*id);
        }
        report
    }
}
