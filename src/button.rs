//! Process-wide button identities shared by the hook and polling paths.
//!
//! Every physical control is reported to the dispatcher as a flattened
//! [`ButtonId`] pair of numeric code and device identity. Keyboard and mouse
//! codes use the same layout the device API uses for push buttons
//! (`instance << 8 | 0x4`), so a key seen by the global hook and the same key
//! seen through a polled device produce the same identifier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type bit marking a push button control.
const PUSH_BUTTON: u32 = 0x4;

/// Instance bit marking an extended (0xE0-prefixed) scan code.
const EXTENDED_KEY: u32 = 0x8000;

/// Stable identity of an input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// The system keyboard, fed by the global keyboard hook.
    pub const SYSTEM_KEYBOARD: DeviceId =
        DeviceId(Uuid::from_u128(0x6F1D2B61_D5A0_11CF_BFC7_444553540000));

    /// The system mouse, fed by the global mouse hook.
    pub const SYSTEM_MOUSE: DeviceId =
        DeviceId(Uuid::from_u128(0x6F1D2B60_D5A0_11CF_BFC7_444553540000));

    pub const fn from_u128(value: u128) -> Self {
        DeviceId(Uuid::from_u128(value))
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        DeviceId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// Whether this is one of the two identities served by the global hooks.
    pub fn is_system(&self) -> bool {
        *self == Self::SYSTEM_KEYBOARD || *self == Self::SYSTEM_MOUSE
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.braced())
    }
}

/// A system mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    /// Extended button, numbered from 1.
    X(u16),
}

impl MouseButton {
    /// Canonical button index used in the identifier code.
    pub fn index(self) -> u32 {
        match self {
            MouseButton::Left => 3,
            MouseButton::Right => 4,
            MouseButton::Middle => 5,
            MouseButton::X(n) => 5 + u32::from(n),
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            3 => Some(MouseButton::Left),
            4 => Some(MouseButton::Right),
            5 => Some(MouseButton::Middle),
            n if n > 5 => u16::try_from(n - 5).ok().map(MouseButton::X),
            _ => None,
        }
    }
}

impl std::fmt::Display for MouseButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MouseButton::Left => write!(f, "Left"),
            MouseButton::Right => write!(f, "Right"),
            MouseButton::Middle => write!(f, "Middle"),
            MouseButton::X(n) => write!(f, "X{}", n),
        }
    }
}

/// A decoded button source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    /// A key on the system keyboard, by hardware scan code.
    SystemKey { scan_code: u32, extended: bool },
    /// A button on the system mouse.
    SystemMouse(MouseButton),
    /// A control on a polled device, by the control-type code the device reported.
    Device { device: DeviceId, code: u32 },
}

impl Button {
    pub fn key(scan_code: u32, extended: bool) -> Self {
        Button::SystemKey {
            scan_code,
            extended,
        }
    }

    /// Flatten into the pair handed to the dispatcher.
    pub fn id(&self) -> ButtonId {
        match *self {
            Button::SystemKey {
                scan_code,
                extended,
            } => {
                let mut code = (scan_code << 8) | PUSH_BUTTON;
                if extended {
                    code |= EXTENDED_KEY;
                }
                ButtonId::new(code, DeviceId::SYSTEM_KEYBOARD)
            }
            Button::SystemMouse(button) => {
                ButtonId::new((button.index() << 8) | PUSH_BUTTON, DeviceId::SYSTEM_MOUSE)
            }
            Button::Device { device, code } => ButtonId::new(code, device),
        }
    }
}

/// The flattened `(code, device)` pair seen at the dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ButtonId {
    pub code: u32,
    pub device: DeviceId,
}

impl ButtonId {
    pub fn new(code: u32, device: DeviceId) -> Self {
        Self { code, device }
    }

    /// Recover the tagged form. Keyboard scan codes are limited to 7 bits,
    /// the eighth instance bit being the extended flag.
    pub fn decode(&self) -> Button {
        if self.device == DeviceId::SYSTEM_KEYBOARD {
            return Button::SystemKey {
                scan_code: (self.code >> 8) & 0x7F,
                extended: self.code & EXTENDED_KEY != 0,
            };
        }
        if self.device == DeviceId::SYSTEM_MOUSE {
            if let Some(button) = MouseButton::from_index(self.code >> 8) {
                return Button::SystemMouse(button);
            }
        }
        Button::Device {
            device: self.device,
            code: self.code,
        }
    }
}

impl From<Button> for ButtonId {
    fn from(button: Button) -> Self {
        button.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_code_layout() {
        let id = Button::key(0x1E, false).id();
        assert_eq!(id.code, 0x1E04);
        assert_eq!(id.device, DeviceId::SYSTEM_KEYBOARD);

        let id = Button::key(0x1D, true).id();
        assert_eq!(id.code, 0x9D04);
    }

    #[test]
    fn test_mouse_code_layout() {
        assert_eq!(Button::SystemMouse(MouseButton::Left).id().code, 0x304);
        assert_eq!(Button::SystemMouse(MouseButton::Right).id().code, 0x404);
        assert_eq!(Button::SystemMouse(MouseButton::Middle).id().code, 0x504);
        assert_eq!(Button::SystemMouse(MouseButton::X(2)).id().code, 0x704);
        assert_eq!(
            Button::SystemMouse(MouseButton::X(1)).id().device,
            DeviceId::SYSTEM_MOUSE
        );
    }

    #[test]
    fn test_device_code_passes_through() {
        let device = DeviceId::from_u128(42);
        let id = Button::Device { device, code: 0x0300_0C02 }.id();
        assert_eq!(id, ButtonId::new(0x0300_0C02, device));
    }

    #[test]
    fn test_decode_recovers_variant() {
        for button in [
            Button::key(0x1E, false),
            Button::key(0x48, true),
            Button::SystemMouse(MouseButton::Middle),
            Button::SystemMouse(MouseButton::X(1)),
            Button::Device {
                device: DeviceId::from_u128(7),
                code: 0x104,
            },
        ] {
            assert_eq!(button.id().decode(), button);
        }
    }

    #[test]
    fn test_identity_is_stable() {
        assert_eq!(Button::key(0x1E, false).id(), Button::key(0x1E, false).id());
        assert_ne!(Button::key(0x1D, false).id(), Button::key(0x1D, true).id());
    }

    #[test]
    fn test_system_identities() {
        assert!(DeviceId::SYSTEM_KEYBOARD.is_system());
        assert!(DeviceId::SYSTEM_MOUSE.is_system());
        assert!(!DeviceId::from_u128(1).is_system());
        assert_eq!(
            DeviceId::SYSTEM_KEYBOARD.to_string(),
            "{6f1d2b61-d5a0-11cf-bfc7-444553540000}"
        );
    }
}
