//! Decision logic of the system-wide keyboard and mouse listeners.
//!
//! Backends translate each native callback into a [`KeyboardEvent`] or
//! [`MouseEvent`] and ask the [`HookListener`] whether to let it through.
//! The listener runs on the operating system's delivery thread while all
//! system input waits on it, so it only encodes, dispatches and enqueues.

use crate::button::Button;
use crate::codes::{KF_EXTENDED, KF_PREVIOUS_DOWN, KF_REPEAT_COUNT_ONE, KF_TRANSITION_UP};
use crate::event::ShortcutDispatcher;
use crate::intercept::{pack_pair, EventKind, InterceptedEvent, Interception, KeyMessage, MouseMessage};
use anyhow::{bail, Result};
use std::sync::{Arc, PoisonError, RwLock};

/// A system-wide keyboard event as seen by the low-level hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardEvent {
    pub message: KeyMessage,
    pub vk_code: u32,
    pub scan_code: u32,
    pub extended: bool,
    pub up: bool,
}

impl KeyboardEvent {
    pub fn new(message: KeyMessage, vk_code: u32, scan_code: u32, extended: bool) -> Self {
        Self {
            message,
            vk_code,
            scan_code,
            extended,
            up: !message.is_down(),
        }
    }
}

/// A system-wide mouse event as seen by the low-level hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub message: MouseMessage,
    /// High word: X button number or wheel delta.
    pub mouse_data: u32,
    /// Motion relative to the current pointer position.
    pub delta: (i32, i32),
}

impl MouseEvent {
    pub fn new(message: MouseMessage) -> Self {
        Self {
            message,
            mouse_data: 0,
            delta: (0, 0),
        }
    }

    pub fn moved(dx: i32, dy: i32) -> Self {
        Self {
            delta: (dx, dy),
            ..Self::new(MouseMessage::Move)
        }
    }

    pub fn x_button(message: MouseMessage, button: u16) -> Self {
        Self {
            mouse_data: u32::from(button) << 16,
            ..Self::new(message)
        }
    }

    pub fn wheel(message: MouseMessage, delta: i16) -> Self {
        Self {
            mouse_data: u32::from(delta as u16) << 16,
            ..Self::new(message)
        }
    }

    fn high_word(&self) -> u16 {
        (self.mouse_data >> 16) as u16
    }
}

/// What the operating system should do with a hooked event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVerdict {
    /// Forward to the next listener and on to the focused application.
    PassThrough,
    /// Drop the event.
    Suppress,
}

impl HookVerdict {
    fn from_suppress(suppress: bool) -> Self {
        if suppress {
            HookVerdict::Suppress
        } else {
            HookVerdict::PassThrough
        }
    }
}

/// Turns hooked events into button transitions and interception traffic.
pub struct HookListener {
    dispatcher: Arc<dyn ShortcutDispatcher>,
    interception: Arc<Interception>,
}

impl HookListener {
    pub fn new(dispatcher: Arc<dyn ShortcutDispatcher>, interception: Arc<Interception>) -> Self {
        Self {
            dispatcher,
            interception,
        }
    }

    pub fn on_keyboard(&self, event: &KeyboardEvent) -> HookVerdict {
        let mut suppress = false;

        if let Some(target) = self.interception.target() {
            let mut lparam = KF_REPEAT_COUNT_ONE | ((event.scan_code & 0xFF) << 16);
            if event.extended {
                lparam |= KF_EXTENDED;
            }
            if event.up {
                lparam |= KF_PREVIOUS_DOWN | KF_TRANSITION_UP;
            }
            self.interception.enqueue(InterceptedEvent {
                target: target.surface(),
                kind: EventKind::Key(event.message),
                wparam: event.vk_code,
                lparam,
            });
            suppress = true;
        }

        let button = Button::key(event.scan_code, event.extended).id();
        let consumed = self.dispatcher.handle_button(button, !event.up);
        log::trace!(
            "Key {:?} scan {:#04x} consumed={} intercepted={}",
            event.message,
            event.scan_code,
            consumed,
            suppress
        );
        HookVerdict::from_suppress(consumed || suppress)
    }

    pub fn on_mouse(&self, event: &MouseEvent) -> HookVerdict {
        let mut suppress = false;

        if let Some(target) = self.interception.target() {
            self.interception.enqueue(InterceptedEvent {
                target: target.surface(),
                kind: EventKind::Mouse(event.message),
                wparam: u32::from(event.high_word()),
                lparam: pack_pair(event.delta.0, event.delta.1),
            });
            suppress = true;
        }

        let consumed = match event.message.button(event.high_word()) {
            Some((button, down)) => self
                .dispatcher
                .handle_button(Button::SystemMouse(button).id(), down),
            None => false,
        };
        HookVerdict::from_suppress(consumed || suppress)
    }
}

/// The listener reachable from free-function native callbacks.
static ACTIVE_LISTENER: RwLock<Option<Arc<HookListener>>> = RwLock::new(None);

/// Keeps a listener registered as the active one; clears the slot on drop.
#[cfg_attr(not(any(windows, test)), allow(dead_code))]
pub(crate) struct ActiveListener(());

/// Register `listener` as the process-wide active listener.
///
/// Fails if another engine already holds the slot.
#[cfg_attr(not(any(windows, test)), allow(dead_code))]
pub(crate) fn activate(listener: Arc<HookListener>) -> Result<ActiveListener> {
    let mut slot = ACTIVE_LISTENER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        bail!("Another capture engine already owns the global hooks");
    }
    *slot = Some(listener);
    Ok(ActiveListener(()))
}

/// Run `f` against the active listener, if any.
#[cfg_attr(not(any(windows, test)), allow(dead_code))]
pub(crate) fn with_active<R>(f: impl FnOnce(&HookListener) -> R) -> Option<R> {
    let listener = ACTIVE_LISTENER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    listener.map(|l| f(&l))
}

impl Drop for ActiveListener {
    fn drop(&mut self) {
        *ACTIVE_LISTENER
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
