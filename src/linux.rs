//! Linux implementation using evdev.
//!
//! Joysticks and gamepads are exposed as polled devices. Keyboards and mice
//! are tapped passively: events are read from `/dev/input` alongside every
//! other consumer, so nothing can be suppressed.

use crate::button::DeviceId;
use crate::codes::{WHEEL_DELTA, XBUTTON1, XBUTTON2};
use crate::device::DataFormat;
use crate::engine::StopSignal;
use crate::hook::{HookListener, KeyboardEvent, MouseEvent};
use crate::intercept::{KeyMessage, MouseMessage};
use crate::platform::{
    AcquireStatus, AttachedDevice, Backend, BufferedEvent, ButtonObject, HookSource, HostWindow,
    InputSubsystem, RawDevice,
};
use anyhow::{anyhow, bail, Context, Result};
use evdev::Device;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_REL: u16 = 0x02;

const SYN_REPORT: u16 = 0x00;

const REL_X: u16 = 0x00;
const REL_Y: u16 = 0x01;
const REL_HWHEEL: u16 = 0x06;
const REL_WHEEL: u16 = 0x08;

const BTN_LEFT: u16 = 0x110;
const BTN_RIGHT: u16 = 0x111;
const BTN_MIDDLE: u16 = 0x112;
const BTN_SIDE: u16 = 0x113;
const BTN_EXTRA: u16 = 0x114;

/// Minimum interval between input device rescans after a read error.
const RESCAN_INTERVAL: Duration = Duration::from_secs(3);

/// Sleep between reads of the tapped devices.
const READ_INTERVAL: Duration = Duration::from_millis(10);

/// Whether `code` is a joystick, gamepad or extra trigger button.
fn is_joystick_button(code: u16) -> bool {
    (0x120..0x140).contains(&code) || (0x2c0..0x2e8).contains(&code)
}

/// PC set-1 scan code and extended flag for a Linux key code.
fn scan_code(code: u16) -> Option<(u32, bool)> {
    let mapped = match code {
        // Num Lock reports extended, Pause does not.
        69 => (0x45, true),
        119 => (0x45, false),
        // KEY_ESC ..= KEY_F12 line up with set 1.
        1..=88 => (u32::from(code), false),
        96 => (0x1C, true),
        97 => (0x1D, true),
        98 => (0x35, true),
        99 => (0x37, true),
        100 => (0x38, true),
        102 => (0x47, true),
        103 => (0x48, true),
        104 => (0x49, true),
        105 => (0x4B, true),
        106 => (0x4D, true),
        107 => (0x4F, true),
        108 => (0x50, true),
        109 => (0x51, true),
        110 => (0x52, true),
        111 => (0x53, true),
        125 => (0x5B, true),
        126 => (0x5C, true),
        127 => (0x5D, true),
        183..=193 => (0x64 + u32::from(code - 183), false),
        194 => (0x76, false),
        _ => return None,
    };
    Some(mapped)
}

/// Virtual-key code for a Linux key code, or 0 when there is none.
fn virtual_key(code: u16) -> u32 {
    const TOP_ROW: &[u8] = b"QWERTYUIOP";
    const HOME_ROW: &[u8] = b"ASDFGHJKL";
    const BOTTOM_ROW: &[u8] = b"ZXCVBNM";

    let vk: u8 = match code {
        1 => 0x1B,
        2..=10 => b'1' + (code - 2) as u8,
        11 => b'0',
        14 => 0x08,
        15 => 0x09,
        16..=25 => TOP_ROW[usize::from(code - 16)],
        28 | 96 => 0x0D,
        29 => 0xA2,
        30..=38 => HOME_ROW[usize::from(code - 30)],
        42 => 0xA0,
        44..=50 => BOTTOM_ROW[usize::from(code - 44)],
        54 => 0xA1,
        56 => 0xA4,
        57 => 0x20,
        58 => 0x14,
        59..=68 => 0x70 + (code - 59) as u8,
        87 => 0x7A,
        88 => 0x7B,
        97 => 0xA3,
        100 => 0xA5,
        102 => 0x24,
        103 => 0x26,
        104 => 0x21,
        105 => 0x25,
        106 => 0x27,
        107 => 0x23,
        108 => 0x28,
        109 => 0x22,
        110 => 0x2D,
        111 => 0x2E,
        125 => 0x5B,
        126 => 0x5C,
        _ => 0,
    };
    u32::from(vk)
}

/// Down and up messages plus X button number for a mouse button code.
fn mouse_button(code: u16) -> Option<(MouseMessage, MouseMessage, u16)> {
    match code {
        BTN_LEFT => Some((MouseMessage::LeftDown, MouseMessage::LeftUp, 0)),
        BTN_RIGHT => Some((MouseMessage::RightDown, MouseMessage::RightUp, 0)),
        BTN_MIDDLE => Some((MouseMessage::MiddleDown, MouseMessage::MiddleUp, 0)),
        BTN_SIDE => Some((MouseMessage::XDown, MouseMessage::XUp, XBUTTON1)),
        BTN_EXTRA => Some((MouseMessage::XDown, MouseMessage::XUp, XBUTTON2)),
        _ => None,
    }
}

/// Stable identity derived from the device's bus ids and `location`.
fn device_id(bus: u16, vendor: u16, product: u16, version: u16, location: &str) -> DeviceId {
    let name = format!("{:04x}:{:04x}:{:04x}:{:04x}@{}", bus, vendor, product, version, location);
    DeviceId::from_uuid(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
}

/// Where a device sits: its physical path plus unique name (Bluetooth pads
/// on one adapter share `phys` and differ only in `uniq`). Devices that
/// report neither fall back to their event node.
fn device_location(phys: &str, uniq: &str, path: &Path) -> String {
    match (phys.is_empty(), uniq.is_empty()) {
        (true, true) => path.display().to_string(),
        (_, true) => phys.to_string(),
        _ => format!("{}#{}", phys, uniq),
    }
}

/// Translated tap input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapEvent {
    Key(KeyboardEvent),
    Mouse(MouseEvent),
}

/// Turns raw evdev triples into hook events. Relative motion is
/// accumulated until the end of the report.
#[derive(Debug, Default)]
struct Translator {
    dx: i32,
    dy: i32,
}

impl Translator {
    fn translate(&mut self, ev_type: u16, code: u16, value: i32) -> Option<TapEvent> {
        match ev_type {
            EV_KEY => {
                if let Some((down, up, x)) = mouse_button(code) {
                    let message = if value != 0 { down } else { up };
                    return Some(TapEvent::Mouse(MouseEvent::x_button(message, x)));
                }
                let (scan, extended) = scan_code(code)?;
                let message = if value != 0 {
                    KeyMessage::KeyDown
                } else {
                    KeyMessage::KeyUp
                };
                Some(TapEvent::Key(KeyboardEvent::new(
                    message,
                    virtual_key(code),
                    scan,
                    extended,
                )))
            }
            EV_REL => match code {
                REL_X => {
                    self.dx += value;
                    None
                }
                REL_Y => {
                    self.dy += value;
                    None
                }
                REL_WHEEL => Some(TapEvent::Mouse(MouseEvent::wheel(
                    MouseMessage::Wheel,
                    (value * i32::from(WHEEL_DELTA)) as i16,
                ))),
                REL_HWHEEL => Some(TapEvent::Mouse(MouseEvent::wheel(
                    MouseMessage::HWheel,
                    (value * i32::from(WHEEL_DELTA)) as i16,
                ))),
                _ => None,
            },
            EV_SYN if code == SYN_REPORT && (self.dx != 0 || self.dy != 0) => {
                let moved = MouseEvent::moved(self.dx, self.dy);
                self.dx = 0;
                self.dy = 0;
                Some(TapEvent::Mouse(moved))
            }
            _ => None,
        }
    }
}

fn input_paths() -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir("/dev/input").context("Failed to read /dev/input")? {
        let path = entry?.path();
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false)
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn is_keyboard(device: &Device) -> bool {
    device
        .supported_keys()
        .map(|keys| keys.contains(evdev::Key::KEY_A))
        .unwrap_or(false)
}

fn is_mouse(device: &Device) -> bool {
    device
        .supported_relative_axes()
        .map(|axes| axes.contains(evdev::RelativeAxisType::REL_X))
        .unwrap_or(false)
}

fn joystick_buttons(device: &Device) -> Vec<u16> {
    device
        .supported_keys()
        .map(|keys| {
            keys.iter()
                .map(|k| k.code())
                .filter(|&c| is_joystick_button(c))
                .collect()
        })
        .unwrap_or_default()
}

/// Find every keyboard and mouse in /dev/input.
fn find_tapped_devices() -> Result<Vec<Device>> {
    let mut devices = Vec::new();
    for path in input_paths()? {
        if let Ok(device) = Device::open(&path) {
            if is_keyboard(&device) || is_mouse(&device) {
                log::debug!("Tapping {:?} at {:?}", device.name(), path);
                devices.push(device);
            }
        }
    }

    if devices.is_empty() {
        Err(anyhow!(
            "No keyboards or mice found. Make sure you're in the 'input' group or running as root."
        ))
    } else {
        Ok(devices)
    }
}

fn set_nonblocking(device: &Device) -> Result<()> {
    let fd = device.as_raw_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL).context("Failed to get fd flags")?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).context("Failed to set non-blocking")?;
    Ok(())
}

fn would_block(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EAGAIN) || e.raw_os_error() == Some(libc::EWOULDBLOCK)
}

/// Drop events queued before the device was (re)opened.
fn drain_events(devices: &mut [Device]) {
    for device in devices.iter_mut() {
        let device_name = device.name().map(String::from);
        loop {
            match device.fetch_events() {
                Ok(events) => {
                    if events.count() == 0 {
                        break;
                    }
                }
                Err(e) => {
                    if !would_block(&e) {
                        log::debug!("Error draining events from {:?}: {}", device_name, e);
                    }
                    break;
                }
            }
        }
    }
}

/// The native backend for Linux.
#[derive(Debug, Default)]
pub struct EvdevBackend;

impl Backend for EvdevBackend {
    type Subsystem = JoystickSubsystem;
    type Hooks = EvdevTap;

    fn connect(&mut self) -> Result<JoystickSubsystem> {
        std::fs::metadata("/dev/input").context("evdev is not available")?;
        Ok(JoystickSubsystem::default())
    }

    fn install_hooks(
        &mut self,
        listener: Arc<HookListener>,
        stop: Arc<StopSignal>,
    ) -> Result<EvdevTap> {
        let mut devices = find_tapped_devices()?;
        for device in &devices {
            set_nonblocking(device)?;
        }
        drain_events(&mut devices);
        log::info!("Tapping {} keyboard/mouse device(s)", devices.len());
        Ok(EvdevTap {
            devices,
            listener,
            stop,
            translator: Translator::default(),
            had_error: false,
            last_rescan: Instant::now(),
        })
    }

    fn can_suppress(&self) -> bool {
        false
    }
}

/// Joysticks and gamepads under /dev/input.
#[derive(Debug, Default)]
pub struct JoystickSubsystem {
    paths: HashMap<DeviceId, PathBuf>,
}

impl InputSubsystem for JoystickSubsystem {
    type Device = EvdevDevice;

    fn attached_devices(&mut self) -> Result<Vec<AttachedDevice>> {
        self.paths.clear();
        let mut attached = Vec::new();
        for path in input_paths()? {
            let Ok(device) = Device::open(&path) else {
                continue;
            };
            if is_keyboard(&device) || joystick_buttons(&device).is_empty() {
                continue;
            }
            let input = device.input_id();
            let ids = (input.bus_type().0, input.vendor(), input.product(), input.version());
            let location = device_location(
                device.physical_path().unwrap_or(""),
                device.unique_name().unwrap_or(""),
                &path,
            );
            let mut id = device_id(ids.0, ids.1, ids.2, ids.3, &location);
            if self.paths.contains_key(&id) {
                log::debug!("{} shares identity {} with another device", path.display(), id);
                id = device_id(ids.0, ids.1, ids.2, ids.3, &path.display().to_string());
            }
            self.paths.insert(id, path.clone());
            attached.push(AttachedDevice {
                id,
                product_name: device.name().unwrap_or("Unknown").to_string(),
                instance_name: path.display().to_string(),
            });
        }
        Ok(attached)
    }

    fn open(&mut self, device: &AttachedDevice) -> Result<EvdevDevice> {
        let path = self
            .paths
            .get(&device.id)
            .with_context(|| format!("{} is no longer attached", device.product_name))?;
        EvdevDevice::open(path)
    }
}

/// An opened joystick.
pub struct EvdevDevice {
    device: Device,
    buttons: Vec<u16>,
    /// Linux key code to (type code, offset) in the current data format.
    format: HashMap<u16, (u32, u32)>,
    capacity: usize,
    acquired: bool,
    lost: bool,
}

impl EvdevDevice {
    fn open(path: &Path) -> Result<Self> {
        let device =
            Device::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        set_nonblocking(&device)?;
        let mut buttons = joystick_buttons(&device);
        buttons.sort_unstable();
        Ok(Self {
            device,
            buttons,
            format: HashMap::new(),
            capacity: usize::MAX,
            acquired: false,
            lost: false,
        })
    }

    /// Type code of the button at `instance`.
    fn type_code(instance: usize) -> u32 {
        ((instance as u32) << 8) | 0x4
    }
}

impl RawDevice for EvdevDevice {
    fn button_objects(&mut self) -> Result<Vec<ButtonObject>> {
        Ok(self
            .buttons
            .iter()
            .enumerate()
            .map(|(instance, &code)| ButtonObject {
                type_code: Self::type_code(instance),
                name: format!("{:?}", evdev::Key::new(code)),
            })
            .collect())
    }

    fn set_cooperative_level(&mut self, _host: HostWindow) -> Result<()> {
        // evdev readers never exclude each other.
        Ok(())
    }

    fn set_data_format(&mut self, format: &DataFormat) -> Result<()> {
        let offsets: HashMap<u32, u32> = format
            .objects
            .iter()
            .map(|o| (o.type_code, o.offset))
            .collect();
        self.format = self
            .buttons
            .iter()
            .enumerate()
            .filter_map(|(instance, &code)| {
                let type_code = Self::type_code(instance);
                offsets.get(&type_code).map(|&offset| (code, (type_code, offset)))
            })
            .collect();
        Ok(())
    }

    fn set_buffer_size(&mut self, capacity: u32) -> Result<()> {
        self.capacity = capacity as usize;
        Ok(())
    }

    fn acquire(&mut self) -> AcquireStatus {
        if self.lost {
            AcquireStatus::Removed
        } else if self.acquired {
            AcquireStatus::AlreadyAcquired
        } else {
            self.acquired = true;
            AcquireStatus::Acquired
        }
    }

    fn unacquire(&mut self) {
        self.acquired = false;
    }

    fn poll(&mut self) {}

    fn read_buffered(&mut self, out: &mut Vec<BufferedEvent>) -> Result<()> {
        let events: Vec<evdev::InputEvent> = match self.device.fetch_events() {
            Ok(events) => events.collect(),
            Err(e) if would_block(&e) => return Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ENODEV) => {
                self.lost = true;
                bail!("Joystick was removed");
            }
            Err(e) => return Err(e).context("Failed to read joystick events"),
        };

        let mut items: Vec<BufferedEvent> = events
            .into_iter()
            .filter(|event| event.event_type().0 == EV_KEY && event.value() != 2)
            .filter_map(|event| {
                let &(_, offset) = self.format.get(&event.code())?;
                let data = if event.value() != 0 { 0x80 } else { 0 };
                Some(BufferedEvent { offset, data })
            })
            .collect();

        let dropped = keep_newest(&mut items, self.capacity);
        if dropped > 0 {
            log::warn!("Joystick buffer overflow, dropped {} oldest event(s)", dropped);
        }
        out.extend(items);
        Ok(())
    }
}

/// Trim `items` to its newest `capacity` entries, so the final state of
/// every button survives an overflow. Returns how many were dropped.
fn keep_newest<T>(items: &mut Vec<T>, capacity: usize) -> usize {
    let dropped = items.len().saturating_sub(capacity);
    items.drain(..dropped);
    dropped
}

/// Passive keyboard and mouse tap.
pub struct EvdevTap {
    devices: Vec<Device>,
    listener: Arc<HookListener>,
    stop: Arc<StopSignal>,
    translator: Translator,
    had_error: bool,
    last_rescan: Instant,
}

impl EvdevTap {
    fn rescan(&mut self) {
        log::info!("Input device error detected, rescanning devices...");
        match find_tapped_devices() {
            Ok(mut devices) => {
                // Give devices time to fully initialize (especially BT keyboards)
                thread::sleep(Duration::from_millis(100));
                match devices.iter().try_for_each(set_nonblocking) {
                    Ok(()) => {
                        log::info!("Input devices reconnected: found {} device(s)", devices.len());
                        drain_events(&mut devices);
                        self.devices = devices;
                        self.translator = Translator::default();
                        self.had_error = false;
                    }
                    Err(e) => log::warn!("Failed to set non-blocking on new devices: {}", e),
                }
            }
            Err(e) => log::warn!("Failed to rescan input devices: {}", e),
        }
        self.last_rescan = Instant::now();
    }

    fn read_all(&mut self) {
        let mut any_error = false;
        for device in self.devices.iter_mut() {
            let events: Vec<evdev::InputEvent> = match device.fetch_events() {
                Ok(events) => events.collect(),
                Err(e) => {
                    if !would_block(&e) {
                        log::debug!("Input read error: {}", e);
                        any_error = true;
                    }
                    continue;
                }
            };
            for event in events {
                match self
                    .translator
                    .translate(event.event_type().0, event.code(), event.value())
                {
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
        if any_error {
            self.had_error = true;
        }
    }
}

impl HookSource for EvdevTap {
    fn pump(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.had_error && self.last_rescan.elapsed() >= RESCAN_INTERVAL {
                self.rescan();
            }
            self.read_all();

            let now = Instant::now();
            if now >= deadline {
                return !self.stop.is_stopped();
            }
            if !self.stop.wait_timeout((deadline - now).min(READ_INTERVAL)) {
                return false;
            }
        }
    }

    fn uninstall(self) {
        log::debug!("Closing {} tapped device(s)", self.devices.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::Button;

    #[test]
    fn test_scan_codes() {
        // KEY_A
        assert_eq!(scan_code(30), Some((0x1E, false)));
        // KEY_RIGHTCTRL
        assert_eq!(scan_code(97), Some((0x1D, true)));
        assert_eq!(scan_code(69), Some((0x45, true)));
        assert_eq!(scan_code(119), Some((0x45, false)));
        assert_eq!(scan_code(194), Some((0x76, false)));
        assert_eq!(scan_code(BTN_LEFT), None);
    }

    #[test]
    fn test_virtual_keys() {
        assert_eq!(virtual_key(30), u32::from(b'A'));
        assert_eq!(virtual_key(16), u32::from(b'Q'));
        assert_eq!(virtual_key(50), u32::from(b'M'));
        assert_eq!(virtual_key(11), u32::from(b'0'));
        assert_eq!(virtual_key(59), 0x70);
        assert_eq!(virtual_key(240), 0);
    }

    #[test]
    fn test_key_translation_matches_encoder() {
        let mut t = Translator::default();
        let Some(TapEvent::Key(key)) = t.translate(EV_KEY, 30, 1) else {
            panic!("expected a key event");
        };
        assert_eq!(key.message, KeyMessage::KeyDown);
        assert_eq!(Button::key(key.scan_code, key.extended).id().code, 0x1E04);

        let Some(TapEvent::Key(key)) = t.translate(EV_KEY, 97, 0) else {
            panic!("expected a key event");
        };
        assert!(key.up);
        assert_eq!(Button::key(key.scan_code, key.extended).id().code, 0x9D04);
    }

    #[test]
    fn test_motion_accumulates_until_report() {
        let mut t = Translator::default();
        assert_eq!(t.translate(EV_REL, REL_X, 3), None);
        assert_eq!(t.translate(EV_REL, REL_X, 2), None);
        assert_eq!(t.translate(EV_REL, REL_Y, -3), None);
        assert_eq!(
            t.translate(EV_SYN, SYN_REPORT, 0),
            Some(TapEvent::Mouse(MouseEvent::moved(5, -3)))
        );
        assert_eq!(t.translate(EV_SYN, SYN_REPORT, 0), None);
    }

    #[test]
    fn test_mouse_buttons_and_wheel() {
        let mut t = Translator::default();
        assert_eq!(
            t.translate(EV_KEY, BTN_EXTRA, 1),
            Some(TapEvent::Mouse(MouseEvent::x_button(MouseMessage::XDown, XBUTTON2)))
        );
        assert_eq!(
            t.translate(EV_KEY, BTN_LEFT, 0),
            Some(TapEvent::Mouse(MouseEvent::x_button(MouseMessage::LeftUp, 0)))
        );
        assert_eq!(
            t.translate(EV_REL, REL_WHEEL, -1),
            Some(TapEvent::Mouse(MouseEvent::wheel(MouseMessage::Wheel, -120)))
        );
    }

    #[test]
    fn test_joystick_ranges() {
        // BTN_TRIGGER, BTN_SOUTH, BTN_TRIGGER_HAPPY1
        assert!(is_joystick_button(0x120));
        assert!(is_joystick_button(0x130));
        assert!(is_joystick_button(0x2c0));
        assert!(!is_joystick_button(BTN_LEFT));
        assert!(!is_joystick_button(30));
    }

    #[test]
    fn test_device_id_is_stable() {
        let a = device_id(3, 0x046d, 0xc215, 0x0111, "usb-0000:00:14.0-2/input0");
        let b = device_id(3, 0x046d, 0xc215, 0x0111, "usb-0000:00:14.0-2/input0");
        let c = device_id(3, 0x046d, 0xc215, 0x0111, "usb-0000:00:14.0-3/input0");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_system());
    }

    #[test]
    fn test_identical_pads_differ_by_unique_name() {
        let adapter = "00:1a:7d:da:71:13";
        let node = Path::new("/dev/input/event20");
        let first = device_location(adapter, "a0:5a:5c:01:02:03", node);
        let second = device_location(adapter, "a0:5a:5c:04:05:06", node);
        assert_ne!(
            device_id(5, 0x054c, 0x09cc, 0x8100, &first),
            device_id(5, 0x054c, 0x09cc, 0x8100, &second)
        );
        assert_eq!(device_location(adapter, "", node), adapter);
    }

    #[test]
    fn test_overflow_keeps_newest_events() {
        let mut items = vec![
            BufferedEvent { offset: 0, data: 0x80 },
            BufferedEvent { offset: 1, data: 0x80 },
            BufferedEvent { offset: 0, data: 0 },
            BufferedEvent { offset: 1, data: 0 },
        ];
        assert_eq!(keep_newest(&mut items, 2), 2);
        assert_eq!(
            items,
            vec![BufferedEvent { offset: 0, data: 0 }, BufferedEvent { offset: 1, data: 0 }]
        );
        assert_eq!(keep_newest(&mut items, 8), 0);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_anonymous_device_uses_event_node() {
        let a = device_location("", "", Path::new("/dev/input/event5"));
        let b = device_location("", "", Path::new("/dev/input/event6"));
        assert_eq!(a, "/dev/input/event5");
        assert_ne!(device_id(3, 1, 2, 3, &a), device_id(3, 1, 2, 3, &b));
    }
}
