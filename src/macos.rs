//! macOS implementation using rdev.
//!
//! rdev's listener observes events without being able to drop them, and it
//! cannot be stopped once started, so a single process-wide listener thread
//! feeds whichever tap is currently installed. There is no polled device
//! support on this platform.

use crate::codes::{WHEEL_DELTA, XBUTTON1, XBUTTON2};
use crate::device::DataFormat;
use crate::engine::StopSignal;
use crate::hook::{HookListener, KeyboardEvent, MouseEvent};
use crate::intercept::{KeyMessage, MouseMessage};
use crate::platform::{
    AcquireStatus, AttachedDevice, Backend, BufferedEvent, ButtonObject, HookSource, HostWindow,
    InputSubsystem, RawDevice,
};
use anyhow::{Context, Result};
use rdev::{listen, Event, EventType};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, Once, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Where the listener thread forwards events.
static TAP: Mutex<Option<Sender<Event>>> = Mutex::new(None);
static LISTENER: Once = Once::new();

/// Set-1 scan code, extended flag and virtual key for an rdev key.
fn key_codes(key: rdev::Key) -> Option<(u32, bool, u32)> {
    use rdev::Key::*;

    let codes = match key {
        Escape => (0x01, false, 0x1B),
        Num1 => (0x02, false, 0x31),
        Num2 => (0x03, false, 0x32),
        Num3 => (0x04, false, 0x33),
        Num4 => (0x05, false, 0x34),
        Num5 => (0x06, false, 0x35),
        Num6 => (0x07, false, 0x36),
        Num7 => (0x08, false, 0x37),
        Num8 => (0x09, false, 0x38),
        Num9 => (0x0A, false, 0x39),
        Num0 => (0x0B, false, 0x30),
        Minus => (0x0C, false, 0xBD),
        Equal => (0x0D, false, 0xBB),
        Backspace => (0x0E, false, 0x08),
        Tab => (0x0F, false, 0x09),
        KeyQ => (0x10, false, 0x51),
        KeyW => (0x11, false, 0x57),
        KeyE => (0x12, false, 0x45),
        KeyR => (0x13, false, 0x52),
        KeyT => (0x14, false, 0x54),
        KeyY => (0x15, false, 0x59),
        KeyU => (0x16, false, 0x55),
        KeyI => (0x17, false, 0x49),
        KeyO => (0x18, false, 0x4F),
        KeyP => (0x19, false, 0x50),
        LeftBracket => (0x1A, false, 0xDB),
        RightBracket => (0x1B, false, 0xDD),
        Return => (0x1C, false, 0x0D),
        ControlLeft => (0x1D, false, 0xA2),
        KeyA => (0x1E, false, 0x41),
        KeyS => (0x1F, false, 0x53),
        KeyD => (0x20, false, 0x44),
        KeyF => (0x21, false, 0x46),
        KeyG => (0x22, false, 0x47),
        KeyH => (0x23, false, 0x48),
        KeyJ => (0x24, false, 0x4A),
        KeyK => (0x25, false, 0x4B),
        KeyL => (0x26, false, 0x4C),
        SemiColon => (0x27, false, 0xBA),
        Quote => (0x28, false, 0xDE),
        BackQuote => (0x29, false, 0xC0),
        ShiftLeft => (0x2A, false, 0xA0),
        BackSlash => (0x2B, false, 0xDC),
        KeyZ => (0x2C, false, 0x5A),
        KeyX => (0x2D, false, 0x58),
        KeyC => (0x2E, false, 0x43),
        KeyV => (0x2F, false, 0x56),
        KeyB => (0x30, false, 0x42),
        KeyN => (0x31, false, 0x4E),
        KeyM => (0x32, false, 0x4D),
        Comma => (0x33, false, 0xBC),
        Dot => (0x34, false, 0xBE),
        Slash => (0x35, false, 0xBF),
        ShiftRight => (0x36, false, 0xA1),
        KpMultiply => (0x37, false, 0x6A),
        Alt => (0x38, false, 0xA4),
        Space => (0x39, false, 0x20),
        CapsLock => (0x3A, false, 0x14),
        F1 => (0x3B, false, 0x70),
        F2 => (0x3C, false, 0x71),
        F3 => (0x3D, false, 0x72),
        F4 => (0x3E, false, 0x73),
        F5 => (0x3F, false, 0x74),
        F6 => (0x40, false, 0x75),
        F7 => (0x41, false, 0x76),
        F8 => (0x42, false, 0x77),
        F9 => (0x43, false, 0x78),
        F10 => (0x44, false, 0x79),
        NumLock => (0x45, true, 0x90),
        ScrollLock => (0x46, false, 0x91),
        KpMinus => (0x4A, false, 0x6D),
        KpPlus => (0x4E, false, 0x6B),
        IntlBackslash => (0x56, false, 0xE2),
        F11 => (0x57, false, 0x7A),
        F12 => (0x58, false, 0x7B),
        KpReturn => (0x1C, true, 0x0D),
        ControlRight => (0x1D, true, 0xA3),
        KpDivide => (0x35, true, 0x6F),
        PrintScreen => (0x37, true, 0x2C),
        AltGr => (0x38, true, 0xA5),
        Pause => (0x45, false, 0x13),
        Home => (0x47, true, 0x24),
        UpArrow => (0x48, true, 0x26),
        PageUp => (0x49, true, 0x21),
        LeftArrow => (0x4B, true, 0x25),
        RightArrow => (0x4D, true, 0x27),
        End => (0x4F, true, 0x23),
        DownArrow => (0x50, true, 0x28),
        PageDown => (0x51, true, 0x22),
        Insert => (0x52, true, 0x2D),
        Delete => (0x53, true, 0x2E),
        MetaLeft => (0x5B, true, 0x5B),
        MetaRight => (0x5C, true, 0x5C),
        _ => return None,
    };
    Some(codes)
}

fn mouse_messages(button: rdev::Button) -> (MouseMessage, MouseMessage, u16) {
    match button {
        rdev::Button::Left => (MouseMessage::LeftDown, MouseMessage::LeftUp, 0),
        rdev::Button::Right => (MouseMessage::RightDown, MouseMessage::RightUp, 0),
        rdev::Button::Middle => (MouseMessage::MiddleDown, MouseMessage::MiddleUp, 0),
        rdev::Button::Unknown(n) if n % 2 == 0 => (MouseMessage::XDown, MouseMessage::XUp, XBUTTON2),
        rdev::Button::Unknown(_) => (MouseMessage::XDown, MouseMessage::XUp, XBUTTON1),
    }
}

/// Translated tap input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapEvent {
    Key(KeyboardEvent),
    Mouse(MouseEvent),
}

/// Turns rdev events into hook events. rdev reports absolute pointer
/// positions, so motion is the difference to the previous one.
#[derive(Debug, Default)]
struct Translator {
    last_position: Option<(f64, f64)>,
}

impl Translator {
    fn translate(&mut self, event: &EventType) -> Option<TapEvent> {
        match *event {
            EventType::KeyPress(key) | EventType::KeyRelease(key) => {
                let (scan, extended, vk) = key_codes(key)?;
                let message = if matches!(event, EventType::KeyPress(_)) {
                    KeyMessage::KeyDown
                } else {
                    KeyMessage::KeyUp
                };
                Some(TapEvent::Key(KeyboardEvent::new(message, vk, scan, extended)))
            }
            EventType::ButtonPress(button) => {
                let (down, _, x) = mouse_messages(button);
                Some(TapEvent::Mouse(MouseEvent::x_button(down, x)))
            }
            EventType::ButtonRelease(button) => {
                let (_, up, x) = mouse_messages(button);
                Some(TapEvent::Mouse(MouseEvent::x_button(up, x)))
            }
            EventType::MouseMove { x, y } => {
                let Some(previous) = self.last_position else {
                    self.last_position = Some((x, y));
                    return None;
                };
                let (dx, dy) = ((x - previous.0).round(), (y - previous.1).round());
                if dx == 0.0 && dy == 0.0 {
                    return None;
                }
                // Only the emitted whole pixels are consumed; the fraction carries over.
                self.last_position = Some((previous.0 + dx, previous.1 + dy));
                Some(TapEvent::Mouse(MouseEvent::moved(dx as i32, dy as i32)))
            }
            EventType::Wheel { delta_x, delta_y } => {
                let (message, delta) = if delta_y != 0 {
                    (MouseMessage::Wheel, delta_y)
                } else {
                    (MouseMessage::HWheel, delta_x)
                };
                let delta = (delta * i64::from(WHEEL_DELTA)) as i16;
                Some(TapEvent::Mouse(MouseEvent::wheel(message, delta)))
            }
        }
    }
}

fn start_listener() -> Result<()> {
    let mut result = Ok(());
    LISTENER.call_once(|| {
        result = thread::Builder::new()
            .name("shortcut-capture-rdev".to_string())
            .spawn(|| {
                let callback = |event: Event| {
                    let mut tap = TAP.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Some(tx) = tap.as_ref() {
                        if tx.send(event).is_err() {
                            *tap = None;
                        }
                    }
                };
                if let Err(e) = listen(callback) {
                    log::error!("Error listening to input events: {:?}", e);
                }
            })
            .map(|_| ())
            .context("Failed to spawn rdev listener thread");
    });
    result
}

/// The native backend for macOS.
#[derive(Debug, Default)]
pub struct RdevBackend;

impl Backend for RdevBackend {
    type Subsystem = NoDevices;
    type Hooks = RdevTap;

    fn connect(&mut self) -> Result<NoDevices> {
        Ok(NoDevices)
    }

    fn install_hooks(&mut self, listener: Arc<HookListener>, stop: Arc<StopSignal>) -> Result<RdevTap> {
        let (tx, rx) = mpsc::channel();
        *TAP.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        start_listener()?;
        Ok(RdevTap {
            rx,
            listener,
            stop,
            translator: Translator::default(),
        })
    }

    fn can_suppress(&self) -> bool {
        false
    }
}

/// Polled devices are not supported here; enumeration is always empty.
#[derive(Debug, Default)]
pub struct NoDevices;

/// Uninhabited: [`NoDevices`] never opens anything.
pub enum NoDevice {}

impl InputSubsystem for NoDevices {
    type Device = NoDevice;

    fn attached_devices(&mut self) -> Result<Vec<AttachedDevice>> {
        Ok(Vec::new())
    }

    fn open(&mut self, device: &AttachedDevice) -> Result<NoDevice> {
        anyhow::bail!("Cannot open {}: no polled device support", device.product_name)
    }
}

impl RawDevice for NoDevice {
    fn button_objects(&mut self) -> Result<Vec<ButtonObject>> {
        match *self {}
    }

    fn set_cooperative_level(&mut self, _host: HostWindow) -> Result<()> {
        match *self {}
    }

    fn set_data_format(&mut self, _format: &DataFormat) -> Result<()> {
        match *self {}
    }

    fn set_buffer_size(&mut self, _capacity: u32) -> Result<()> {
        match *self {}
    }

    fn acquire(&mut self) -> AcquireStatus {
        match *self {}
    }

    fn unacquire(&mut self) {
        match *self {}
    }

    fn poll(&mut self) {
        match *self {}
    }

    fn read_buffered(&mut self, _out: &mut Vec<BufferedEvent>) -> Result<()> {
        match *self {}
    }
}

/// Receives events from the shared rdev listener thread.
pub struct RdevTap {
    rx: Receiver<Event>,
    listener: Arc<HookListener>,
    stop: Arc<StopSignal>,
    translator: Translator,
}

impl RdevTap {
    fn deliver(&mut self, event: &Event) {
        match self.translator.translate(&event.event_type) {
            Some(TapEvent::Key(key)) => {
                self.listener.on_keyboard(&key);
            }
            Some(TapEvent::Mouse(mouse)) => {
                self.listener.on_mouse(&mouse);
            }
            None => {}
        }
    }
}

impl HookSource for RdevTap {
    fn pump(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.stop.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            match self.rx.recv_timeout(deadline - now) {
                Ok(event) => self.deliver(&event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("rdev listener went away");
                    return self.stop.wait_timeout(deadline - now);
                }
            }
        }
    }

    fn uninstall(self) {
        *TAP.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
