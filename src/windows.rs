//! Windows implementation using DirectInput and low-level hooks.
//!
//! Polled devices come from DirectInput 8. Keyboard and mouse events come
//! from `WH_KEYBOARD_LL` and `WH_MOUSE_LL` hooks serviced by the engine's
//! background thread, whose message loop doubles as the polling timer.
//!
//! # Safety
//!
//! `unsafe` is confined to Windows API calls. Each block states what the
//! call relies on.

use crate::button::DeviceId;
use crate::device::DataFormat;
use crate::engine::StopSignal;
use crate::hook::{self, ActiveListener, HookListener, HookVerdict, KeyboardEvent, MouseEvent};
use crate::intercept::{KeyMessage, MouseMessage};
use crate::platform::{
    AcquireStatus, AttachedDevice, Backend, BufferedEvent, ButtonObject, HookSource, HostWindow,
    InputSubsystem, RawDevice, SurfaceId,
};
use crate::replay::{ShadowKeyState, SurfaceSink, SynthesizedEvent};
use anyhow::{Context, Result};
use std::ffi::c_void;
use std::mem::size_of;
use std::sync::Arc;
use std::time::Duration;
use windows::core::{Interface, GUID, HRESULT};
use windows::Win32::Devices::HumanInterfaceDevice::{
    DirectInput8Create, IDirectInput8W, IDirectInputDevice8W, DIDATAFORMAT, DIDEVICEINSTANCEW,
    DIDEVICEOBJECTDATA, DIDEVICEOBJECTINSTANCEW, DIOBJECTDATAFORMAT, DIPROPDWORD, DIPROPHEADER,
};
use windows::Win32::Foundation::{BOOL, HINSTANCE, HWND, LPARAM, LRESULT, POINT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::{
    GetCurrentThread, GetCurrentThreadId, SetThreadPriority, THREAD_PRIORITY_TIME_CRITICAL,
};
use windows::Win32::UI::Input::KeyboardAndMouse::SetKeyboardState;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetCursorPos, GetMessageW, KillTimer, PeekMessageW,
    PostMessageW, PostThreadMessageW, SetTimer, SetWindowsHookExW, TranslateMessage,
    UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, KBDLLHOOKSTRUCT_FLAGS, LLKHF_EXTENDED,
    MSG, MSLLHOOKSTRUCT, PM_NOREMOVE, WH_KEYBOARD_LL, WH_MOUSE_LL, WM_QUIT, WM_TIMER,
};

const DIRECTINPUT_VERSION: u32 = 0x0800;
const DI8DEVCLASS_ALL: u32 = 0;
const DIEDFL_ATTACHEDONLY: u32 = 0x0000_0001;
const DIDFT_BUTTON: u32 = 0x0000_000C;
const DIDF_ABSAXIS: u32 = 0x0000_0001;
const DISCL_NONEXCLUSIVE: u32 = 0x0000_0002;
const DISCL_BACKGROUND: u32 = 0x0000_0008;
const DIPH_DEVICE: u32 = 0;
const DIENUM_CONTINUE: BOOL = BOOL(1);

const DIERR_UNPLUGGED: HRESULT = HRESULT(0x8004_0209_u32 as i32);
const DIERR_OTHERAPPHASPRIO: HRESULT = HRESULT(0x8007_0005_u32 as i32);
const DIERR_GENERIC: HRESULT = HRESULT(0x8000_4005_u32 as i32);

/// `MAKEDIPROP(1)`: property identifiers are small integers cast to GUID pointers.
fn diprop_buffersize() -> *const GUID {
    1usize as *const GUID
}

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

fn hwnd(handle: isize) -> HWND {
    HWND(handle as *mut c_void)
}

/// The native backend for Windows.
#[derive(Debug, Default)]
pub struct WinBackend;

impl Backend for WinBackend {
    type Subsystem = DirectInput;
    type Hooks = LowLevelHooks;

    fn connect(&mut self) -> Result<DirectInput> {
        DirectInput::create()
    }

    fn install_hooks(
        &mut self,
        listener: Arc<HookListener>,
        stop: Arc<StopSignal>,
    ) -> Result<LowLevelHooks> {
        LowLevelHooks::install(listener, stop)
    }

    fn raise_priority(&mut self) -> Result<()> {
        // SAFETY: the pseudo handle of the current thread is always valid.
        unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_TIME_CRITICAL) }
            .context("SetThreadPriority failed")
    }

    fn can_suppress(&self) -> bool {
        true
    }
}

/// Connection to DirectInput 8.
pub struct DirectInput {
    di: IDirectInput8W,
}

impl DirectInput {
    fn create() -> Result<Self> {
        // SAFETY: a null module name asks for the executable's own handle.
        let module = unsafe { GetModuleHandleW(None) }.context("GetModuleHandleW failed")?;
        let mut raw: *mut c_void = std::ptr::null_mut();
        // SAFETY: `raw` receives an IDirectInput8W on success, as requested by its IID.
        unsafe {
            DirectInput8Create(
                HINSTANCE(module.0),
                DIRECTINPUT_VERSION,
                &IDirectInput8W::IID,
                &mut raw,
                None,
            )
        }
        .context("DirectInput8Create failed")?;
        // SAFETY: creation succeeded, so `raw` is an owned IDirectInput8W reference.
        let di = unsafe { IDirectInput8W::from_raw(raw) };
        Ok(Self { di })
    }
}

unsafe extern "system" fn enum_devices_cb(
    instance: *mut DIDEVICEINSTANCEW,
    context: *mut c_void,
) -> BOOL {
    // SAFETY: DirectInput passes a valid instance and our own context pointer.
    let instance = &*instance;
    let found = &mut *(context as *mut Vec<AttachedDevice>);
    found.push(AttachedDevice {
        id: DeviceId::from_u128(instance.guidInstance.to_u128()),
        product_name: wide_to_string(&instance.tszProductName),
        instance_name: wide_to_string(&instance.tszInstanceName),
    });
    DIENUM_CONTINUE
}

unsafe extern "system" fn enum_objects_cb(
    object: *mut DIDEVICEOBJECTINSTANCEW,
    context: *mut c_void,
) -> BOOL {
    // SAFETY: DirectInput passes a valid object and our own context pointer.
    let object = &*object;
    let found = &mut *(context as *mut Vec<ButtonObject>);
    found.push(ButtonObject {
        type_code: object.dwType,
        name: wide_to_string(&object.tszName),
    });
    DIENUM_CONTINUE
}

impl InputSubsystem for DirectInput {
    type Device = DirectInputDevice;

    fn attached_devices(&mut self) -> Result<Vec<AttachedDevice>> {
        let mut found: Vec<AttachedDevice> = Vec::new();
        // SAFETY: `found` outlives the synchronous enumeration.
        unsafe {
            self.di.EnumDevices(
                DI8DEVCLASS_ALL,
                Some(enum_devices_cb),
                &mut found as *mut _ as *mut c_void,
                DIEDFL_ATTACHEDONLY,
            )
        }
        .context("EnumDevices failed")?;
        Ok(found)
    }

    fn open(&mut self, device: &AttachedDevice) -> Result<DirectInputDevice> {
        let guid = GUID::from_u128(device.id.as_u128());
        let mut created: Option<IDirectInputDevice8W> = None;
        // SAFETY: `created` receives the device interface on success.
        unsafe { self.di.CreateDevice(&guid, &mut created, None) }
            .with_context(|| format!("CreateDevice failed for {}", device.product_name))?;
        let device = created.context("CreateDevice returned no device")?;
        Ok(DirectInputDevice {
            device,
            items: Vec::new(),
        })
    }
}

/// An opened DirectInput device. Released when dropped.
pub struct DirectInputDevice {
    device: IDirectInputDevice8W,
    items: Vec<DIDEVICEOBJECTDATA>,
}

impl RawDevice for DirectInputDevice {
    fn button_objects(&mut self) -> Result<Vec<ButtonObject>> {
        let mut found: Vec<ButtonObject> = Vec::new();
        // SAFETY: `found` outlives the synchronous enumeration.
        unsafe {
            self.device.EnumObjects(
                Some(enum_objects_cb),
                &mut found as *mut _ as *mut c_void,
                DIDFT_BUTTON,
            )
        }
        .context("EnumObjects failed")?;
        Ok(found)
    }

    fn set_cooperative_level(&mut self, host: HostWindow) -> Result<()> {
        // SAFETY: DirectInput validates the window handle.
        unsafe {
            self.device
                .SetCooperativeLevel(hwnd(host.0), DISCL_NONEXCLUSIVE | DISCL_BACKGROUND)
        }
        .context("SetCooperativeLevel failed")
    }

    fn set_data_format(&mut self, format: &DataFormat) -> Result<()> {
        let mut objects: Vec<DIOBJECTDATAFORMAT> = format
            .objects
            .iter()
            .map(|o| DIOBJECTDATAFORMAT {
                pguid: std::ptr::null(),
                dwOfs: o.offset,
                dwType: o.type_code,
                dwFlags: 0,
            })
            .collect();
        let native = DIDATAFORMAT {
            dwSize: size_of::<DIDATAFORMAT>() as u32,
            dwObjSize: size_of::<DIOBJECTDATAFORMAT>() as u32,
            dwFlags: DIDF_ABSAXIS,
            dwDataSize: format.data_size,
            dwNumObjs: objects.len() as u32,
            rgodf: objects.as_mut_ptr(),
        };
        // SAFETY: DirectInput copies the format; `objects` lives until it returns.
        unsafe { self.device.SetDataFormat(&native) }.context("SetDataFormat failed")
    }

    fn set_buffer_size(&mut self, capacity: u32) -> Result<()> {
        let mut prop = DIPROPDWORD {
            diph: DIPROPHEADER {
                dwSize: size_of::<DIPROPDWORD>() as u32,
                dwHeaderSize: size_of::<DIPROPHEADER>() as u32,
                dwObj: 0,
                dwHow: DIPH_DEVICE,
            },
            dwData: capacity,
        };
        // SAFETY: `prop` is a complete DIPROPDWORD whose header sizes describe it.
        unsafe { self.device.SetProperty(diprop_buffersize(), &mut prop.diph) }
            .context("Setting the buffer size failed")?;
        self.items = vec![DIDEVICEOBJECTDATA::default(); capacity as usize];
        Ok(())
    }

    fn acquire(&mut self) -> AcquireStatus {
        // SAFETY: plain COM call on an owned interface.
        match unsafe { self.device.Acquire() } {
            Ok(()) => AcquireStatus::Acquired,
            Err(e) if e.code() == DIERR_OTHERAPPHASPRIO => AcquireStatus::OtherHasPriority,
            Err(e) if e.code() == DIERR_UNPLUGGED || e.code() == DIERR_GENERIC => {
                AcquireStatus::Removed
            }
            Err(e) => AcquireStatus::Other(e.code().0),
        }
    }

    fn unacquire(&mut self) {
        // SAFETY: plain COM call on an owned interface.
        if let Err(e) = unsafe { self.device.Unacquire() } {
            log::trace!("Unacquire failed: {}", e);
        }
    }

    fn poll(&mut self) {
        // Devices that need no polling report success without effect.
        // SAFETY: plain COM call on an owned interface.
        let _ = unsafe { self.device.Poll() };
    }

    fn read_buffered(&mut self, out: &mut Vec<BufferedEvent>) -> Result<()> {
        let mut count = self.items.len() as u32;
        // SAFETY: `items` holds `count` writable records of the stated size.
        unsafe {
            self.device.GetDeviceData(
                size_of::<DIDEVICEOBJECTDATA>() as u32,
                self.items.as_mut_ptr(),
                &mut count,
                0,
            )
        }
        .context("GetDeviceData failed")?;
        out.extend(
            self.items
                .iter()
                .take(count as usize)
                .map(|item| BufferedEvent {
                    offset: item.dwOfs,
                    data: item.dwData,
                }),
        );
        Ok(())
    }
}

unsafe extern "system" fn keyboard_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code != HC_ACTION as i32 {
        return CallNextHookEx(None, n_code, w_param, l_param);
    }
    let Some(message) = KeyMessage::from_raw(w_param.0 as u32) else {
        return CallNextHookEx(None, n_code, w_param, l_param);
    };

    // SAFETY: l_param points to a KBDLLHOOKSTRUCT when n_code == HC_ACTION.
    let kbs = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
    let extended = (kbs.flags & LLKHF_EXTENDED) != KBDLLHOOKSTRUCT_FLAGS(0);
    let event = KeyboardEvent::new(message, kbs.vkCode, kbs.scanCode, extended);

    if hook::with_active(|l| l.on_keyboard(&event)) == Some(HookVerdict::Suppress) {
        return LRESULT(1);
    }
    CallNextHookEx(None, n_code, w_param, l_param)
}

unsafe extern "system" fn mouse_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code != HC_ACTION as i32 {
        return CallNextHookEx(None, n_code, w_param, l_param);
    }
    let Some(message) = MouseMessage::from_raw(w_param.0 as u32) else {
        return CallNextHookEx(None, n_code, w_param, l_param);
    };

    // SAFETY: l_param points to a MSLLHOOKSTRUCT when n_code == HC_ACTION.
    let mhs = &*(l_param.0 as *const MSLLHOOKSTRUCT);
    // The cursor has not moved yet; the difference is this event's motion.
    let mut cursor = POINT::default();
    let delta = match GetCursorPos(&mut cursor) {
        Ok(()) => (mhs.pt.x - cursor.x, mhs.pt.y - cursor.y),
        Err(_) => (0, 0),
    };
    let event = MouseEvent {
        message,
        mouse_data: mhs.mouseData,
        delta,
    };

    if hook::with_active(|l| l.on_mouse(&event)) == Some(HookVerdict::Suppress) {
        return LRESULT(1);
    }
    CallNextHookEx(None, n_code, w_param, l_param)
}

/// Installed low-level hooks plus the message loop of the thread that owns them.
pub struct LowLevelHooks {
    keyboard: HHOOK,
    mouse: HHOOK,
    timer: Option<(usize, Duration)>,
    stop: Arc<StopSignal>,
    _active: ActiveListener,
}

impl LowLevelHooks {
    fn install(listener: Arc<HookListener>, stop: Arc<StopSignal>) -> Result<Self> {
        let active = hook::activate(listener)?;

        // Make sure this thread has a message queue before anyone posts to it.
        let mut msg = MSG::default();
        // SAFETY: peeking without removal has no side effect besides queue creation.
        unsafe {
            let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
        }

        // SAFETY: the hook procedures are 'static and this thread pumps messages.
        let keyboard = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0) }
            .context("Failed to install keyboard hook")?;
        // SAFETY: as above.
        let mouse = match unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), None, 0) } {
            Ok(mouse) => mouse,
            Err(e) => {
                // SAFETY: `keyboard` was installed above and is not used again.
                unsafe {
                    let _ = UnhookWindowsHookEx(keyboard);
                }
                return Err(e).context("Failed to install mouse hook");
            }
        };

        // SAFETY: querying the current thread id has no preconditions.
        let thread_id = unsafe { GetCurrentThreadId() };
        stop.set_waker(move || {
            // SAFETY: posting WM_QUIT to a thread with a message queue.
            if let Err(e) = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) } {
                log::debug!("Failed to wake capture thread: {}", e);
            }
        });

        Ok(Self {
            keyboard,
            mouse,
            timer: None,
            stop,
            _active: active,
        })
    }

    fn ensure_timer(&mut self, interval: Duration) {
        if matches!(self.timer, Some((_, current)) if current == interval) {
            return;
        }
        if let Some((id, _)) = self.timer.take() {
            // SAFETY: `id` came from SetTimer on this thread.
            unsafe {
                let _ = KillTimer(None, id);
            }
        }
        let millis = u32::try_from(interval.as_millis()).unwrap_or(u32::MAX).max(1);
        // SAFETY: a thread timer without a callback only posts WM_TIMER.
        let id = unsafe { SetTimer(None, 0, millis, None) };
        if id == 0 {
            log::warn!("SetTimer failed; polling will only run on input");
        } else {
            self.timer = Some((id, interval));
        }
    }
}

impl HookSource for LowLevelHooks {
    fn pump(&mut self, timeout: Duration) -> bool {
        if self.stop.is_stopped() {
            return false;
        }
        self.ensure_timer(timeout);
        let timer_id = self.timer.map(|(id, _)| id);

        let mut msg = MSG::default();
        loop {
            // SAFETY: standard Win32 GetMessage/DispatchMessage loop pattern.
            let result = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            match result.0 {
                0 => return false,
                -1 => {
                    log::error!("GetMessageW failed");
                    return false;
                }
                _ => {}
            }
            if msg.message == WM_QUIT {
                return false;
            }
            if msg.message == WM_TIMER && Some(msg.wParam.0) == timer_id {
                return !self.stop.is_stopped();
            }
            // SAFETY: `msg` was filled in by GetMessageW.
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    fn uninstall(mut self) {
        if let Some((id, _)) = self.timer.take() {
            // SAFETY: `id` came from SetTimer on this thread.
            unsafe {
                let _ = KillTimer(None, id);
            }
        }
        // SAFETY: both hooks were installed by this thread and are removed once.
        unsafe {
            let _ = UnhookWindowsHookEx(self.keyboard);
            let _ = UnhookWindowsHookEx(self.mouse);
        }
        log::info!("Global input hooks removed");
    }
}

/// Delivers replayed input through the target window's message queue.
///
/// Must live on the thread that owns the target window so that the keyboard
/// state it mirrors is the one that window's message handlers read.
#[derive(Debug, Default)]
pub struct PostMessageSink;

impl SurfaceSink for PostMessageSink {
    fn post(&mut self, event: SynthesizedEvent) -> Result<()> {
        let SurfaceId(target) = event.target;
        // SAFETY: PostMessageW validates the window handle.
        unsafe {
            PostMessageW(
                hwnd(target),
                event.kind.raw(),
                WPARAM(event.wparam as usize),
                LPARAM(event.lparam as isize),
            )
        }
        .context("PostMessageW failed")
    }

    fn sync_key_state(&mut self, state: &ShadowKeyState) {
        let table = state.to_keyboard_state();
        // SAFETY: the table is exactly 256 bytes.
        if let Err(e) = unsafe { SetKeyboardState(&table) } {
            log::trace!("SetKeyboardState failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_to_string_stops_at_nul() {
        let mut wide = [0u16; 8];
        for (slot, c) in wide.iter_mut().zip("Pad".encode_utf16()) {
            *slot = c;
        }
        assert_eq!(wide_to_string(&wide), "Pad");
        assert_eq!(wide_to_string(&[0x41, 0x42]), "AB");
    }

    #[test]
    fn test_system_guids_match() {
        let keyboard = GUID::from_u128(DeviceId::SYSTEM_KEYBOARD.as_u128());
        assert_eq!(keyboard.data1, 0x6F1D2B61);
        let mouse = GUID::from_u128(DeviceId::SYSTEM_MOUSE.as_u128());
        assert_eq!(mouse.data1, 0x6F1D2B60);
    }
}
