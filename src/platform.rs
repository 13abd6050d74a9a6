//! Seams between the platform-neutral engine and the native input APIs.
//!
//! A [`Backend`] supplies two things: an [`InputSubsystem`] for devices that
//! must be polled (joysticks, gamepads) and a [`HookSource`] that delivers
//! system-wide keyboard and mouse events to a [`HookListener`]. Everything
//! the backend hands over is owned by the engine's background thread, so
//! neither the subsystem nor its devices need to be `Send`.

use crate::button::DeviceId;
use crate::device::DataFormat;
use crate::engine::StopSignal;
use crate::hook::HookListener;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Native handle of the host application's main window.
///
/// Device cooperative levels are scoped to it. Backends that have no use for
/// a window accept the default (null) handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HostWindow(pub isize);

/// Native handle of the surface that receives synthesized input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub isize);

/// A device reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedDevice {
    pub id: DeviceId,
    pub product_name: String,
    pub instance_name: String,
}

/// A button control reported by a device's object enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonObject {
    /// Control-type code; unique within the device.
    pub type_code: u32,
    pub name: String,
}

/// One item drained from a device's event buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferedEvent {
    /// Offset assigned to the control by the device's data format.
    pub offset: u32,
    pub data: u32,
}

/// Outcome of trying to acquire a device for reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    Acquired,
    AlreadyAcquired,
    /// Another process holds the device with higher priority.
    OtherHasPriority,
    /// The device was unplugged or its handle is no longer valid.
    Removed,
    /// Any other native status; reading is attempted anyway.
    Other(i32),
}

/// Connection to the platform's raw-device API.
pub trait InputSubsystem {
    type Device: RawDevice;

    /// All devices currently attached.
    fn attached_devices(&mut self) -> Result<Vec<AttachedDevice>>;

    fn open(&mut self, device: &AttachedDevice) -> Result<Self::Device>;
}

/// An opened device. Dropping it releases the native resource.
pub trait RawDevice {
    fn button_objects(&mut self) -> Result<Vec<ButtonObject>>;

    /// Non-exclusive, background access scoped to `host`.
    fn set_cooperative_level(&mut self, host: HostWindow) -> Result<()>;

    fn set_data_format(&mut self, format: &DataFormat) -> Result<()>;

    fn set_buffer_size(&mut self, capacity: u32) -> Result<()>;

    fn acquire(&mut self) -> AcquireStatus;

    fn unacquire(&mut self);

    fn poll(&mut self);

    /// Append buffered events to `out`, oldest first.
    fn read_buffered(&mut self, out: &mut Vec<BufferedEvent>) -> Result<()>;
}

/// Installed system-wide listeners plus the event loop that services them.
pub trait HookSource {
    /// Service listener callbacks until `timeout` elapses.
    ///
    /// Returns `false` once the engine was asked to stop.
    fn pump(&mut self, timeout: Duration) -> bool;

    fn uninstall(self);
}

/// A native platform implementation.
pub trait Backend: Send + 'static {
    type Subsystem: InputSubsystem;
    type Hooks: HookSource;

    /// Connect to the raw-device API. Failure is fatal to the engine.
    fn connect(&mut self) -> Result<Self::Subsystem>;

    /// Install the keyboard and mouse listeners. Failure is fatal to the engine.
    ///
    /// `stop` wakes the event loop when the engine is asked to shut down.
    fn install_hooks(
        &mut self,
        listener: Arc<HookListener>,
        stop: Arc<StopSignal>,
    ) -> Result<Self::Hooks>;

    /// Elevate the calling thread's scheduling priority.
    fn raise_priority(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether the listeners can drop events before other applications see them.
    fn can_suppress(&self) -> bool;
}

#[cfg(target_os = "windows")]
pub type NativeBackend = crate::windows::WinBackend;

#[cfg(target_os = "linux")]
pub type NativeBackend = crate::linux::EvdevBackend;

#[cfg(target_os = "macos")]
pub type NativeBackend = crate::macos::RdevBackend;
