//! System-wide shortcut capture with polled device support and input interception.
//!
//! This crate watches every keyboard key, mouse button and joystick button on
//! the machine, regardless of which application has focus, and reports each
//! transition to a [`ShortcutDispatcher`] as a uniform [`ButtonId`]. While an
//! interception target is set (typically an in-game overlay), raw keyboard and
//! mouse input is taken away from the focused application and replayed onto
//! the target's surface instead.
//!
//! # Features
//!
//! - **One identifier space** - a key seen by the global hook and the same key
//!   seen through a polled device produce the same [`ButtonId`]
//! - **Hot-plug** - devices are re-enumerated whenever the host reports a
//!   hardware change, and unplugged devices drop out on their own
//! - **Suppression** - the dispatcher can consume an event so no other
//!   application sees it (Windows only)
//! - **Interception and replay** - modifier sides are merged and repeats are
//!   flagged, so the target sees ordinary window messages
//! - **Automatic cleanup** - the background thread stops when the handle is dropped
//! - **Cross-platform** - Windows (DirectInput + low-level hooks), Linux (evdev)
//!   and macOS (rdev) behind one API
//!
//! # Example
//!
//! ```no_run
//! use shortcut_capture::{ButtonId, EngineBuilder, HostWindow};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut handle = EngineBuilder::new()
//!         .dispatcher(|button: ButtonId, pressed: bool| {
//!             println!("{:?} {}", button, if pressed { "down" } else { "up" });
//!             false
//!         })
//!         .build()?
//!         .start()?;
//!
//!     // Device setup waits for the main window.
//!     handle.host_ready(HostWindow(0));
//!
//!     // Ask the engine to re-enumerate when the OS reports a device change.
//!     handle.notify_hardware_change();
//!
//!     // Stops automatically when `handle` is dropped.
//!     handle.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Linux Requirements
//!
//! On Linux, the user must have permission to read from `/dev/input/event*` devices.
//! This typically means running as root or being a member of the `input` group.

mod button;
pub mod codes;
mod config;
mod device;
mod engine;
mod event;
mod hook;
mod intercept;
mod platform;
mod poll;
mod replay;

#[cfg(test)]
mod mock;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

pub use button::{Button, ButtonId, DeviceId, MouseButton};
pub use config::EngineConfig;
pub use device::{ControlMap, DataFormat, Device, DeviceCatalog, DeviceRegistry, ObjectFormat};
pub use engine::{EngineBuilder, EngineHandle, EngineStatus, ReadyGate, ShortcutEngine, StopSignal};
pub use event::{channel, ButtonEvent, ChannelDispatcher, ShortcutDispatcher};
pub use hook::{HookListener, HookVerdict, KeyboardEvent, MouseEvent};
pub use intercept::{
    pack_pair, unpack_pair, EventKind, InterceptTarget, InterceptedEvent, Interception,
    KeyMessage, MouseMessage,
};
pub use platform::{
    AcquireStatus, AttachedDevice, Backend, BufferedEvent, ButtonObject, HookSource, HostWindow,
    InputSubsystem, RawDevice, SurfaceId,
};
pub use poll::{HardwareCounter, Poller, TickReport};
pub use replay::{Replayer, ShadowKeyState, SurfaceSink, SynthesizedEvent};

#[cfg(any(target_os = "windows", target_os = "linux", target_os = "macos"))]
pub use platform::NativeBackend;

#[cfg(target_os = "windows")]
pub use self::windows::PostMessageSink;
