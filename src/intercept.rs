//! Interception mode: raw input detoured to a single target surface.
//!
//! While a target is set, the hook listener suppresses every keyboard and
//! mouse event and queues an [`InterceptedEvent`] instead. The queue is the
//! only state shared between the background thread (producer) and the
//! surface-owning thread (consumer, see [`crate::replay::Replayer`]).

use crate::button::MouseButton;
use crate::codes::*;
use crate::platform::SurfaceId;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// The active consumer of intercepted input, typically an in-game overlay.
pub trait InterceptTarget: Send + Sync {
    /// Surface that receives synthesized events.
    fn surface(&self) -> SurfaceId;

    /// Convert relative pointer motion into surface-local coordinates.
    ///
    /// Called on the surface-owning thread, once per replayed mouse event.
    fn move_mouse(&self, dx: i16, dy: i16) -> (i32, i32);
}

/// Keyboard message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMessage {
    KeyDown,
    KeyUp,
    SysKeyDown,
    SysKeyUp,
}

impl KeyMessage {
    pub fn raw(self) -> u32 {
        match self {
            KeyMessage::KeyDown => WM_KEYDOWN,
            KeyMessage::KeyUp => WM_KEYUP,
            KeyMessage::SysKeyDown => WM_SYSKEYDOWN,
            KeyMessage::SysKeyUp => WM_SYSKEYUP,
        }
    }

    pub fn from_raw(message: u32) -> Option<Self> {
        match message {
            WM_KEYDOWN => Some(KeyMessage::KeyDown),
            WM_KEYUP => Some(KeyMessage::KeyUp),
            WM_SYSKEYDOWN => Some(KeyMessage::SysKeyDown),
            WM_SYSKEYUP => Some(KeyMessage::SysKeyUp),
            _ => None,
        }
    }

    pub fn is_down(self) -> bool {
        matches!(self, KeyMessage::KeyDown | KeyMessage::SysKeyDown)
    }
}

/// Mouse message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseMessage {
    Move,
    LeftDown,
    LeftUp,
    RightDown,
    RightUp,
    MiddleDown,
    MiddleUp,
    XDown,
    XUp,
    Wheel,
    HWheel,
}

impl MouseMessage {
    pub fn raw(self) -> u32 {
        match self {
            MouseMessage::Move => WM_MOUSEMOVE,
            MouseMessage::LeftDown => WM_LBUTTONDOWN,
            MouseMessage::LeftUp => WM_LBUTTONUP,
            MouseMessage::RightDown => WM_RBUTTONDOWN,
            MouseMessage::RightUp => WM_RBUTTONUP,
            MouseMessage::MiddleDown => WM_MBUTTONDOWN,
            MouseMessage::MiddleUp => WM_MBUTTONUP,
            MouseMessage::XDown => WM_XBUTTONDOWN,
            MouseMessage::XUp => WM_XBUTTONUP,
            MouseMessage::Wheel => WM_MOUSEWHEEL,
            MouseMessage::HWheel => WM_MOUSEHWHEEL,
        }
    }

    pub fn from_raw(message: u32) -> Option<Self> {
        match message {
            WM_MOUSEMOVE => Some(MouseMessage::Move),
            WM_LBUTTONDOWN => Some(MouseMessage::LeftDown),
            WM_LBUTTONUP => Some(MouseMessage::LeftUp),
            WM_RBUTTONDOWN => Some(MouseMessage::RightDown),
            WM_RBUTTONUP => Some(MouseMessage::RightUp),
            WM_MBUTTONDOWN => Some(MouseMessage::MiddleDown),
            WM_MBUTTONUP => Some(MouseMessage::MiddleUp),
            WM_XBUTTONDOWN => Some(MouseMessage::XDown),
            WM_XBUTTONUP => Some(MouseMessage::XUp),
            WM_MOUSEWHEEL => Some(MouseMessage::Wheel),
            WM_MOUSEHWHEEL => Some(MouseMessage::HWheel),
            _ => None,
        }
    }

    /// The button this message reports and whether it went down.
    ///
    /// `x_button` is the extended button number carried by X messages.
    pub fn button(self, x_button: u16) -> Option<(MouseButton, bool)> {
        match self {
            MouseMessage::LeftDown => Some((MouseButton::Left, true)),
            MouseMessage::LeftUp => Some((MouseButton::Left, false)),
            MouseMessage::RightDown => Some((MouseButton::Right, true)),
            MouseMessage::RightUp => Some((MouseButton::Right, false)),
            MouseMessage::MiddleDown => Some((MouseButton::Middle, true)),
            MouseMessage::MiddleUp => Some((MouseButton::Middle, false)),
            MouseMessage::XDown => Some((MouseButton::X(x_button), true)),
            MouseMessage::XUp => Some((MouseButton::X(x_button), false)),
            MouseMessage::Move | MouseMessage::Wheel | MouseMessage::HWheel => None,
        }
    }
}

/// Keyboard or mouse message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Key(KeyMessage),
    Mouse(MouseMessage),
}

impl EventKind {
    pub fn raw(self) -> u32 {
        match self {
            EventKind::Key(m) => m.raw(),
            EventKind::Mouse(m) => m.raw(),
        }
    }

    pub fn from_raw(message: u32) -> Option<Self> {
        KeyMessage::from_raw(message)
            .map(EventKind::Key)
            .or_else(|| MouseMessage::from_raw(message).map(EventKind::Mouse))
    }
}

/// A raw event detoured from the hooks, waiting to be replayed.
///
/// Keyboard events carry the virtual key and the packed key-message flags.
/// Mouse events carry the X button or wheel delta and the relative motion,
/// `dx` in the low 16 bits and `dy` in the high 16 bits of `lparam`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptedEvent {
    pub target: SurfaceId,
    pub kind: EventKind,
    pub wparam: u32,
    pub lparam: u32,
}

/// Pack a signed pair into two 16-bit halves.
pub fn pack_pair(low: i32, high: i32) -> u32 {
    (low as u16 as u32) | ((high as u16 as u32) << 16)
}

/// Split a packed value into its two signed 16-bit halves.
pub fn unpack_pair(value: u32) -> (i16, i16) {
    ((value & 0xFFFF) as u16 as i16, (value >> 16) as u16 as i16)
}

/// The active interception target and the queue feeding the replay pipeline.
pub struct Interception {
    target: RwLock<Option<Arc<dyn InterceptTarget>>>,
    tx: Sender<InterceptedEvent>,
    rx: Mutex<Option<Receiver<InterceptedEvent>>>,
}

impl Default for Interception {
    fn default() -> Self {
        Self::new()
    }
}

impl Interception {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            target: RwLock::new(None),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Enter interception mode with `target`, or leave it with `None`.
    pub fn set_target(&self, target: Option<Arc<dyn InterceptTarget>>) {
        let active = target.is_some();
        *self.target.write().unwrap_or_else(PoisonError::into_inner) = target;
        log::debug!("Interception {}", if active { "enabled" } else { "disabled" });
    }

    pub fn target(&self) -> Option<Arc<dyn InterceptTarget>> {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_active(&self) -> bool {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn enqueue(&self, event: InterceptedEvent) {
        if self.tx.send(event).is_err() {
            log::trace!("Replay queue closed, dropping {:?}", event.kind);
        }
    }

    /// Take the consumer end of the queue. Only the first call succeeds.
    pub(crate) fn take_receiver(&self) -> Option<Receiver<InterceptedEvent>> {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Overlay;

    impl InterceptTarget for Overlay {
        fn surface(&self) -> SurfaceId {
            SurfaceId(7)
        }

        fn move_mouse(&self, _dx: i16, _dy: i16) -> (i32, i32) {
            (0, 0)
        }
    }

    #[test]
    fn test_pack_pair_keeps_sign() {
        let packed = pack_pair(5, -3);
        assert_eq!(packed, 0xFFFD_0005);
        assert_eq!(unpack_pair(packed), (5, -3));
    }

    #[test]
    fn test_message_round_trip() {
        assert_eq!(EventKind::from_raw(WM_SYSKEYUP), Some(EventKind::Key(KeyMessage::SysKeyUp)));
        assert_eq!(EventKind::from_raw(WM_XBUTTONDOWN), Some(EventKind::Mouse(MouseMessage::XDown)));
        assert_eq!(EventKind::from_raw(0x0000), None);
        assert_eq!(EventKind::Mouse(MouseMessage::Move).raw(), WM_MOUSEMOVE);
    }

    #[test]
    fn test_mouse_message_buttons() {
        assert_eq!(MouseMessage::LeftDown.button(0), Some((MouseButton::Left, true)));
        assert_eq!(MouseMessage::XUp.button(2), Some((MouseButton::X(2), false)));
        assert_eq!(MouseMessage::Move.button(0), None);
        assert_eq!(MouseMessage::Wheel.button(0), None);
    }

    #[test]
    fn test_target_toggle() {
        let interception = Interception::new();
        assert!(!interception.is_active());
        interception.set_target(Some(Arc::new(Overlay)));
        assert!(interception.is_active());
        assert_eq!(interception.target().map(|t| t.surface()), Some(SurfaceId(7)));
        interception.set_target(None);
        assert!(!interception.is_active());
    }

    #[test]
    fn test_queue_is_fifo_and_taken_once() {
        let interception = Interception::new();
        for wparam in 0..3 {
            interception.enqueue(InterceptedEvent {
                target: SurfaceId(1),
                kind: EventKind::Key(KeyMessage::KeyDown),
                wparam,
                lparam: 0,
            });
        }
        let rx = interception.take_receiver().unwrap();
        assert!(interception.take_receiver().is_none());
        let order: Vec<u32> = rx.try_iter().map(|e| e.wparam).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
