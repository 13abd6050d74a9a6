//! Registry of attached polled devices.
//!
//! Keyboards and mice are served by the global hooks; everything else that
//! exposes buttons (joysticks, gamepads, pedals) is opened here and read by
//! the polling loop. The registry is owned by the engine's background thread.
//! A [`DeviceCatalog`] mirrors the names it holds so the host thread can label
//! buttons without touching the registry itself.

use crate::button::{Button, ButtonId, DeviceId};
use crate::platform::{AttachedDevice, ButtonObject, HostWindow, InputSubsystem, RawDevice};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

/// One entry of a per-device data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectFormat {
    pub offset: u32,
    pub type_code: u32,
}

/// Compact per-device data layout: one byte per button, in ascending
/// control-type order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFormat {
    pub objects: Vec<ObjectFormat>,
    /// Size of one device state record, rounded up to a multiple of four.
    pub data_size: u32,
}

/// Bidirectional mapping between a device's data offsets and control types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlMap {
    ofs_to_type: Vec<u32>,
    type_to_ofs: HashMap<u32, u32>,
    names: BTreeMap<u32, String>,
}

impl ControlMap {
    /// Build a map from enumerated button objects. Offsets are assigned in
    /// ascending control-type order so the layout is deterministic.
    pub fn from_objects(objects: Vec<ButtonObject>) -> Self {
        let mut names = BTreeMap::new();
        for object in objects {
            names.insert(object.type_code, object.name);
        }

        let ofs_to_type: Vec<u32> = names.keys().copied().collect();
        let type_to_ofs = ofs_to_type
            .iter()
            .enumerate()
            .map(|(ofs, &ty)| (ty, ofs as u32))
            .collect();

        Self {
            ofs_to_type,
            type_to_ofs,
            names,
        }
    }

    pub fn len(&self) -> usize {
        self.ofs_to_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ofs_to_type.is_empty()
    }

    pub fn type_for_offset(&self, offset: u32) -> Option<u32> {
        self.ofs_to_type.get(offset as usize).copied()
    }

    pub fn offset_for_type(&self, type_code: u32) -> Option<u32> {
        self.type_to_ofs.get(&type_code).copied()
    }

    pub fn name(&self, type_code: u32) -> Option<&str> {
        self.names.get(&type_code).map(String::as_str)
    }

    pub fn data_format(&self) -> DataFormat {
        let objects = self
            .ofs_to_type
            .iter()
            .enumerate()
            .map(|(ofs, &type_code)| ObjectFormat {
                offset: ofs as u32,
                type_code,
            })
            .collect::<Vec<_>>();
        let data_size = (objects.len() as u32 + 3) & !3;
        DataFormat { objects, data_size }
    }
}

/// A registered device and its acquired native resource.
pub struct Device<H> {
    id: DeviceId,
    name: String,
    instance_name: String,
    controls: ControlMap,
    handle: H,
}

impl<H> Device<H> {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn controls(&self) -> &ControlMap {
        &self.controls
    }

    pub(crate) fn parts_mut(&mut self) -> (&ControlMap, &mut H) {
        (&self.controls, &mut self.handle)
    }
}

#[derive(Debug, Clone, Default)]
struct CatalogEntry {
    name: String,
    controls: BTreeMap<u32, String>,
}

/// Read-only view of registered device and control names.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    inner: Arc<RwLock<BTreeMap<DeviceId, CatalogEntry>>>,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, id: DeviceId, name: &str, controls: &ControlMap) {
        let entry = CatalogEntry {
            name: name.to_string(),
            controls: controls.names.clone(),
        };
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);
    }

    fn withdraw(&self, id: DeviceId) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Identities and names of every registered device.
    pub fn devices(&self) -> Vec<(DeviceId, String)> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, entry)| (*id, entry.name.clone()))
            .collect()
    }

    /// Human-readable label such as `K:0x1E`, `M:Left` or `Pad:Trigger`.
    pub fn button_name(&self, button: ButtonId) -> String {
        let devices = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let entry = devices.get(&button.device);
        let control = entry.and_then(|e| e.controls.get(&button.code).cloned());

        match button.decode() {
            Button::SystemKey {
                scan_code,
                extended,
            } => {
                let label = control.unwrap_or_else(|| {
                    if extended {
                        format!("0xE0{:02X}", scan_code)
                    } else {
                        format!("0x{:02X}", scan_code)
                    }
                });
                format!("K:{}", label)
            }
            Button::SystemMouse(mouse) => {
                format!("M:{}", control.unwrap_or_else(|| mouse.to_string()))
            }
            Button::Device { device, .. } => {
                let prefix = entry.map_or_else(|| device.to_string(), |e| e.name.clone());
                format!("{}:{}", prefix, control.as_deref().unwrap_or("Unknown"))
            }
        }
    }
}

/// Attached polled devices, keyed by identity.
pub struct DeviceRegistry<S: InputSubsystem> {
    subsystem: S,
    host: HostWindow,
    buffer_size: u32,
    devices: BTreeMap<DeviceId, Device<S::Device>>,
    catalog: DeviceCatalog,
}

impl<S: InputSubsystem> DeviceRegistry<S> {
    pub fn new(subsystem: S, host: HostWindow, buffer_size: u32, catalog: DeviceCatalog) -> Self {
        Self {
            subsystem,
            host,
            buffer_size,
            devices: BTreeMap::new(),
            catalog,
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device<S::Device>> {
        self.devices.get(&id)
    }

    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices.keys().copied().collect()
    }

    pub(crate) fn get_mut(&mut self, id: DeviceId) -> Option<&mut Device<S::Device>> {
        self.devices.get_mut(&id)
    }

    /// Enumerate attached devices, register any not seen before and drop
    /// any that are no longer reported.
    ///
    /// Known devices are left untouched. A device that fails to open or
    /// configure is logged and skipped. Returns how many devices were added.
    pub fn refresh_devices(&mut self) -> Result<usize> {
        let attached = self
            .subsystem
            .attached_devices()
            .context("Failed to enumerate attached devices")?;

        let present: HashSet<DeviceId> = attached.iter().map(|info| info.id).collect();
        let gone: Vec<DeviceId> = self
            .devices
            .keys()
            .filter(|id| !present.contains(id))
            .copied()
            .collect();
        for id in gone {
            log::info!("Device {} is no longer attached", id);
            self.remove(id);
        }

        let mut added = 0;
        for info in attached {
            if info.id.is_system() || self.devices.contains_key(&info.id) {
                continue;
            }
            match self.open_device(&info) {
                Ok(Some(device)) => {
                    log::info!(
                        "Adding device {} {} {}:{}",
                        device.id,
                        device.name,
                        device.instance_name,
                        device.controls.len()
                    );
                    self.catalog.publish(device.id, &device.name, &device.controls);
                    self.devices.insert(device.id, device);
                    added += 1;
                }
                Ok(None) => {
                    log::debug!("Ignoring {} {}: no buttons", info.id, info.product_name);
                }
                Err(e) => {
                    log::warn!("Skipping device {} {}: {:#}", info.id, info.product_name, e);
                }
            }
        }
        Ok(added)
    }

    fn open_device(&mut self, info: &AttachedDevice) -> Result<Option<Device<S::Device>>> {
        let mut handle = self.subsystem.open(info).context("Failed to open device")?;
        let objects = handle
            .button_objects()
            .context("Failed to enumerate buttons")?;

        let controls = ControlMap::from_objects(objects);
        if controls.is_empty() {
            return Ok(None);
        }

        handle
            .set_cooperative_level(self.host)
            .context("Failed to set cooperative level")?;
        handle
            .set_data_format(&controls.data_format())
            .context("Failed to set data format")?;
        handle
            .set_buffer_size(self.buffer_size)
            .context("Failed to set buffer size")?;

        Ok(Some(Device {
            id: info.id,
            name: info.product_name.clone(),
            instance_name: info.instance_name.clone(),
            controls,
            handle,
        }))
    }

    /// Re-read every device's buttons and rebuild its offset table.
    ///
    /// A device that can no longer be reconfigured is dropped.
    pub fn remap(&mut self) {
        let mut failed = Vec::new();
        for (id, device) in self.devices.iter_mut() {
            device.handle.unacquire();
            let rebuilt = device
                .handle
                .button_objects()
                .map(ControlMap::from_objects)
                .and_then(|controls| {
                    device.handle.set_data_format(&controls.data_format())?;
                    Ok(controls)
                });
            match rebuilt {
                Ok(controls) if !controls.is_empty() => {
                    self.catalog.publish(*id, &device.name, &controls);
                    device.controls = controls;
                }
                Ok(_) => {
                    log::warn!("Device {} {} no longer has buttons", id, device.name);
                    failed.push(*id);
                }
                Err(e) => {
                    log::warn!("Failed to remap device {} {}: {:#}", id, device.name, e);
                    failed.push(*id);
                }
            }
        }
        for id in failed {
            self.remove(id);
        }
    }

    /// Remove a device, releasing its native resource.
    pub fn remove(&mut self, id: DeviceId) -> bool {
        match self.devices.remove(&id) {
            Some(device) => {
                log::info!("Removing device {} {}", device.id, device.name);
                self.catalog.withdraw(id);
                true
            }
            None => false,
        }
    }

    /// Unacquire every device, then destroy every entry.
    pub fn shutdown(&mut self) {
        for device in self.devices.values_mut() {
            device.handle.unacquire();
        }
        self.devices.clear();
        self.catalog.clear();
    }
}

impl<S: InputSubsystem> Drop for DeviceRegistry<S> {
    fn drop(&mut self) {
        if !self.devices.is_empty() {
            self.shutdown();
        }
    }
}
