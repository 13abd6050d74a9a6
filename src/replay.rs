//! Replay of intercepted input onto the target surface.
//!
//! Runs on the thread that owns the target surface. Each queued
//! [`InterceptedEvent`] is normalized against the [`ShadowKeyState`] and
//! delivered through a [`SurfaceSink`]:
//!
//! - left/right control, shift and alt collapse into one logical key, and a
//!   logical release is only emitted once both sides are up;
//! - a key-down for a key already down carries the "previous state" flag;
//! - mouse messages carry the modifier/button mask and the coordinates the
//!   interception target computed from the relative motion.

use crate::codes::*;
use crate::intercept::{
    pack_pair, unpack_pair, EventKind, InterceptedEvent, Interception, KeyMessage, MouseMessage,
};
use crate::platform::SurfaceId;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Which logical keys and mouse buttons are down, from the replay viewpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowKeyState {
    bits: [u64; 4],
}

impl ShadowKeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_down(&self, vk: u8) -> bool {
        self.bits[usize::from(vk >> 6)] & (1 << (vk & 63)) != 0
    }

    pub fn set(&mut self, vk: u8, down: bool) {
        let word = &mut self.bits[usize::from(vk >> 6)];
        if down {
            *word |= 1 << (vk & 63);
        } else {
            *word &= !(1 << (vk & 63));
        }
    }

    /// The table in native keyboard-state layout: 0x80 marks a key down.
    pub fn to_keyboard_state(&self) -> [u8; 256] {
        let mut state = [0u8; 256];
        for (vk, slot) in state.iter_mut().enumerate() {
            if self.is_down(vk as u8) {
                *slot = 0x80;
            }
        }
        state
    }

    /// Composite modifier/button mask for mouse messages.
    pub fn mouse_mask(&self) -> u32 {
        [
            (VK_CONTROL, MK_CONTROL),
            (VK_LBUTTON, MK_LBUTTON),
            (VK_MBUTTON, MK_MBUTTON),
            (VK_RBUTTON, MK_RBUTTON),
            (VK_SHIFT, MK_SHIFT),
            (VK_XBUTTON1, MK_XBUTTON1),
            (VK_XBUTTON2, MK_XBUTTON2),
        ]
        .iter()
        .filter(|(vk, _)| self.is_down(*vk))
        .fold(0, |mask, (_, bit)| mask | bit)
    }
}

/// A normalized event ready for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesizedEvent {
    pub target: SurfaceId,
    pub kind: EventKind,
    pub wparam: u32,
    pub lparam: u32,
}

/// Delivers synthesized events to the target surface's message queue.
pub trait SurfaceSink {
    /// Queue `event` for the surface. Delivery is asynchronous.
    fn post(&mut self, event: SynthesizedEvent) -> anyhow::Result<()>;

    /// The shadow table changed; mirror it into the thread's keyboard state.
    fn sync_key_state(&mut self, _state: &ShadowKeyState) {}
}

/// Left variant, right variant and logical code of a sided modifier.
fn modifier_sides(vk: u8) -> Option<(u8, u8, u8)> {
    match vk {
        VK_LCONTROL | VK_RCONTROL => Some((VK_LCONTROL, VK_RCONTROL, VK_CONTROL)),
        VK_LSHIFT | VK_RSHIFT => Some((VK_LSHIFT, VK_RSHIFT, VK_SHIFT)),
        VK_LMENU | VK_RMENU => Some((VK_LMENU, VK_RMENU, VK_MENU)),
        _ => None,
    }
}

fn mouse_button_vk(message: MouseMessage, x_button: u16) -> Option<(u8, bool)> {
    let x_vk = match x_button {
        XBUTTON1 => Some(VK_XBUTTON1),
        XBUTTON2 => Some(VK_XBUTTON2),
        _ => None,
    };
    match message {
        MouseMessage::LeftDown => Some((VK_LBUTTON, true)),
        MouseMessage::LeftUp => Some((VK_LBUTTON, false)),
        MouseMessage::RightDown => Some((VK_RBUTTON, true)),
        MouseMessage::RightUp => Some((VK_RBUTTON, false)),
        MouseMessage::MiddleDown => Some((VK_MBUTTON, true)),
        MouseMessage::MiddleUp => Some((VK_MBUTTON, false)),
        MouseMessage::XDown => x_vk.map(|vk| (vk, true)),
        MouseMessage::XUp => x_vk.map(|vk| (vk, false)),
        MouseMessage::Move | MouseMessage::Wheel | MouseMessage::HWheel => None,
    }
}

/// Consumer end of the interception queue.
pub struct Replayer<S> {
    rx: Receiver<InterceptedEvent>,
    interception: Arc<Interception>,
    shadow: ShadowKeyState,
    sink: S,
}

impl<S: SurfaceSink> Replayer<S> {
    pub(crate) fn new(rx: Receiver<InterceptedEvent>, interception: Arc<Interception>, sink: S) -> Self {
        Self {
            rx,
            interception,
            shadow: ShadowKeyState::new(),
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Replay everything queued so far, in arrival order.
    ///
    /// Returns how many events were delivered.
    pub fn drain(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.rx.try_recv() {
            if self.replay(event) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Replay one intercepted event. Returns whether anything was delivered.
    pub fn replay(&mut self, event: InterceptedEvent) -> bool {
        let synthesized = match event.kind {
            EventKind::Key(message) => self.replay_key(&event, message),
            EventKind::Mouse(message) => self.replay_mouse(&event, message),
        };
        let Some(synthesized) = synthesized else {
            return false;
        };

        log::trace!(
            "Replaying {:#06x} {:#06x} {:#010x} to {:?}",
            synthesized.kind.raw(),
            synthesized.wparam,
            synthesized.lparam,
            synthesized.target
        );
        match self.sink.post(synthesized) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Failed to deliver replayed input: {:#}", e);
                false
            }
        }
    }

    fn replay_key(&mut self, event: &InterceptedEvent, message: KeyMessage) -> Option<SynthesizedEvent> {
        let down = message.is_down();
        let mut lparam = event.lparam;

        let Ok(mut vk) = u8::try_from(event.wparam) else {
            return Some(SynthesizedEvent {
                target: event.target,
                kind: EventKind::Key(message),
                wparam: event.wparam,
                lparam,
            });
        };

        if let Some((left, right, logical)) = modifier_sides(vk) {
            self.shadow.set(vk, down);
            if !down && (self.shadow.is_down(left) || self.shadow.is_down(right)) {
                // Other side still held: the logical modifier stays down.
                self.sink.sync_key_state(&self.shadow);
                return None;
            }
            vk = logical;
        }

        if down {
            if self.shadow.is_down(vk) {
                lparam |= KF_PREVIOUS_DOWN;
            }
            self.shadow.set(vk, true);
        } else {
            self.shadow.set(vk, false);
        }
        self.sink.sync_key_state(&self.shadow);

        Some(SynthesizedEvent {
            target: event.target,
            kind: EventKind::Key(message),
            wparam: u32::from(vk),
            lparam,
        })
    }

    fn replay_mouse(&mut self, event: &InterceptedEvent, message: MouseMessage) -> Option<SynthesizedEvent> {
        let x_button = event.wparam as u16;
        if let Some((vk, down)) = mouse_button_vk(message, x_button) {
            self.shadow.set(vk, down);
            self.sink.sync_key_state(&self.shadow);
        }

        let Some(target) = self.interception.target() else {
            log::debug!("Interception ended, dropping replayed {:?}", message);
            return None;
        };

        let mut wparam = self.shadow.mouse_mask();
        if matches!(
            message,
            MouseMessage::XDown | MouseMessage::XUp | MouseMessage::Wheel | MouseMessage::HWheel
        ) {
            wparam |= (event.wparam & 0xFFFF) << 16;
        }

        let (dx, dy) = unpack_pair(event.lparam);
        let (x, y) = target.move_mouse(dx, dy);

        Some(SynthesizedEvent {
            target: event.target,
            kind: EventKind::Mouse(message),
            wparam,
            lparam: pack_pair(x, y),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::ButtonId;
    use crate::event::ShortcutDispatcher;
    use crate::hook::{HookListener, HookVerdict, KeyboardEvent, MouseEvent};
    use crate::intercept::InterceptTarget;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        posted: Vec<SynthesizedEvent>,
        syncs: usize,
        last_state: Option<[u8; 256]>,
    }

    impl SurfaceSink for RecordingSink {
        fn post(&mut self, event: SynthesizedEvent) -> anyhow::Result<()> {
            self.posted.push(event);
            Ok(())
        }

        fn sync_key_state(&mut self, state: &ShadowKeyState) {
            self.syncs += 1;
            self.last_state = Some(state.to_keyboard_state());
        }
    }

    #[derive(Default)]
    struct Overlay {
        moves: Mutex<Vec<(i16, i16)>>,
    }

    impl InterceptTarget for Overlay {
        fn surface(&self) -> SurfaceId {
            SurfaceId(0x99)
        }

        fn move_mouse(&self, dx: i16, dy: i16) -> (i32, i32) {
            self.moves.lock().unwrap().push((dx, dy));
            (100 + i32::from(dx), 200 + i32::from(dy))
        }
    }

    struct Setup {
        listener: HookListener,
        replayer: Replayer<RecordingSink>,
        overlay: Arc<Overlay>,
    }

    fn setup() -> Setup {
        let interception = Arc::new(Interception::new());
        let overlay = Arc::new(Overlay::default());
        interception.set_target(Some(overlay.clone()));
        let dispatcher: Arc<dyn ShortcutDispatcher> = Arc::new(|_: ButtonId, _: bool| false);
        let listener = HookListener::new(dispatcher, interception.clone());
        let rx = interception.take_receiver().unwrap();
        let replayer = Replayer::new(rx, interception, RecordingSink::default());
        Setup {
            listener,
            replayer,
            overlay,
        }
    }

    fn key(message: KeyMessage, vk: u8, scan: u32) -> KeyboardEvent {
        KeyboardEvent::new(message, u32::from(vk), scan, false)
    }

    #[test]
    fn test_shadow_bits() {
        let mut shadow = ShadowKeyState::new();
        shadow.set(0xFF, true);
        shadow.set(VK_SHIFT, true);
        assert!(shadow.is_down(0xFF));
        assert!(shadow.is_down(VK_SHIFT));
        assert!(!shadow.is_down(VK_CONTROL));
        shadow.set(0xFF, false);
        assert!(!shadow.is_down(0xFF));

        let table = shadow.to_keyboard_state();
        assert_eq!(table[usize::from(VK_SHIFT)], 0x80);
        assert_eq!(table[usize::from(VK_CONTROL)], 0);
    }

    #[test]
    fn test_non_extended_key_replays_once() {
        let mut s = setup();
        let verdict = s.listener.on_keyboard(&key(KeyMessage::KeyDown, 0x41, 0x1E));
        assert_eq!(verdict, HookVerdict::Suppress);

        assert_eq!(s.replayer.drain(), 1);
        let posted = &s.replayer.sink().posted;
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].target, SurfaceId(0x99));
        assert_eq!(posted[0].kind, EventKind::Key(KeyMessage::KeyDown));
        assert_eq!(posted[0].wparam, 0x41);
        assert_eq!(posted[0].lparam & KF_EXTENDED, 0);
        assert_eq!(posted[0].lparam & KF_PREVIOUS_DOWN, 0);
    }

    #[test]
    fn test_control_sides_merge() {
        let mut s = setup();
        for event in [
            key(KeyMessage::KeyDown, VK_LCONTROL, 0x1D),
            key(KeyMessage::KeyDown, VK_RCONTROL, 0x1D),
            key(KeyMessage::KeyUp, VK_LCONTROL, 0x1D),
        ] {
            s.listener.on_keyboard(&event);
        }
        assert_eq!(s.replayer.drain(), 2);
        {
            let sink = s.replayer.sink();
            assert!(sink.posted.iter().all(|e| e.wparam == u32::from(VK_CONTROL)));
            assert!(sink.posted.iter().all(|e| e.kind == EventKind::Key(KeyMessage::KeyDown)));
            let state = sink.last_state.unwrap();
            assert_eq!(state[usize::from(VK_CONTROL)], 0x80);
            assert_eq!(state[usize::from(VK_LCONTROL)], 0);
        }

        s.listener.on_keyboard(&key(KeyMessage::KeyUp, VK_RCONTROL, 0x1D));
        assert_eq!(s.replayer.drain(), 1);
        let sink = s.replayer.sink();
        let last = sink.posted.last().unwrap();
        assert_eq!(last.kind, EventKind::Key(KeyMessage::KeyUp));
        assert_eq!(last.wparam, u32::from(VK_CONTROL));
        assert_eq!(sink.last_state.unwrap()[usize::from(VK_CONTROL)], 0);
    }

    #[test]
    fn test_repeat_sets_previous_state() {
        let mut s = setup();
        s.listener.on_keyboard(&key(KeyMessage::KeyDown, 0x41, 0x1E));
        s.listener.on_keyboard(&key(KeyMessage::KeyDown, 0x41, 0x1E));
        s.listener.on_keyboard(&key(KeyMessage::KeyUp, 0x41, 0x1E));
        s.listener.on_keyboard(&key(KeyMessage::KeyDown, 0x41, 0x1E));
        s.replayer.drain();

        let flags: Vec<bool> = s
            .replayer
            .sink()
            .posted
            .iter()
            .filter(|e| e.kind == EventKind::Key(KeyMessage::KeyDown))
            .map(|e| e.lparam & KF_PREVIOUS_DOWN != 0)
            .collect();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn test_sys_key_up_clears_shadow() {
        let mut s = setup();
        s.listener.on_keyboard(&key(KeyMessage::SysKeyDown, VK_LMENU, 0x38));
        s.listener.on_keyboard(&key(KeyMessage::SysKeyUp, VK_LMENU, 0x38));
        assert_eq!(s.replayer.drain(), 2);
        assert_eq!(s.replayer.sink().last_state.unwrap()[usize::from(VK_MENU)], 0);
        assert_eq!(s.replayer.sink().posted[1].wparam, u32::from(VK_MENU));
    }

    #[test]
    fn test_motion_converts_once_with_mask() {
        let mut s = setup();
        s.listener.on_keyboard(&key(KeyMessage::KeyDown, VK_LSHIFT, 0x2A));
        s.listener.on_mouse(&MouseEvent::new(MouseMessage::LeftDown));
        s.replayer.drain();
        s.overlay.moves.lock().unwrap().clear();

        let verdict = s.listener.on_mouse(&MouseEvent::moved(5, -3));
        assert_eq!(verdict, HookVerdict::Suppress);
        assert_eq!(s.replayer.drain(), 1);

        assert_eq!(*s.overlay.moves.lock().unwrap(), vec![(5, -3)]);
        let motion = *s.replayer.sink().posted.last().unwrap();
        assert_eq!(motion.kind, EventKind::Mouse(MouseMessage::Move));
        assert_eq!(motion.lparam, pack_pair(105, 197));
        assert_eq!(motion.wparam, MK_SHIFT | MK_LBUTTON);
    }

    #[test]
    fn test_button_release_updates_mask() {
        let mut s = setup();
        s.listener.on_mouse(&MouseEvent::new(MouseMessage::RightDown));
        s.listener.on_mouse(&MouseEvent::new(MouseMessage::RightUp));
        s.replayer.drain();

        let posted = &s.replayer.sink().posted;
        assert_eq!(posted[0].wparam, MK_RBUTTON);
        assert_eq!(posted[1].wparam, 0);
    }

    #[test]
    fn test_x_button_carries_number() {
        let mut s = setup();
        s.listener.on_mouse(&MouseEvent::x_button(MouseMessage::XDown, XBUTTON2));
        s.replayer.drain();

        let event = s.replayer.sink().posted[0];
        assert_eq!(event.wparam, MK_XBUTTON2 | (u32::from(XBUTTON2) << 16));
    }

    #[test]
    fn test_mouse_dropped_without_target() {
        let mut s = setup();
        s.listener.on_mouse(&MouseEvent::moved(1, 1));
        s.replayer.interception.set_target(None);
        assert_eq!(s.replayer.drain(), 0);
        assert!(s.overlay.moves.lock().unwrap().is_empty());
    }
}
