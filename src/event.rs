//! Button transitions and the dispatch boundary.

use crate::button::ButtonId;
use std::sync::mpsc::{self, Receiver, Sender};

/// A decoded button transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub pressed: bool,
}

/// Decides what a captured button means.
///
/// Called for every transition from both the global hooks and the polled
/// devices. Calls from the hook path happen while the operating system waits
/// on the listener, so implementations must return quickly.
pub trait ShortcutDispatcher: Send + Sync {
    /// Returns `true` if the event was consumed and should be suppressed.
    fn handle_button(&self, button: ButtonId, pressed: bool) -> bool;

    /// Device control tables were rebuilt; rebuild anything derived from them.
    fn remap(&self) {}
}

impl<F> ShortcutDispatcher for F
where
    F: Fn(ButtonId, bool) -> bool + Send + Sync,
{
    fn handle_button(&self, button: ButtonId, pressed: bool) -> bool {
        self(button, pressed)
    }
}

/// Dispatcher that forwards every transition into a channel and never consumes.
pub struct ChannelDispatcher {
    tx: Sender<ButtonEvent>,
}

impl ShortcutDispatcher for ChannelDispatcher {
    fn handle_button(&self, button: ButtonId, pressed: bool) -> bool {
        // Receiver gone means nobody is listening; nothing to do.
        let _ = self.tx.send(ButtonEvent { button, pressed });
        false
    }
}

/// Create a [`ChannelDispatcher`] and the receiver it feeds.
pub fn channel() -> (ChannelDispatcher, Receiver<ButtonEvent>) {
    let (tx, rx) = mpsc::channel();
    (ChannelDispatcher { tx }, rx)
}
