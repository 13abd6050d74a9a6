//! Scriptable in-memory backend for tests.

use crate::button::DeviceId;
use crate::device::DataFormat;
use crate::engine::StopSignal;
use crate::hook::{HookListener, HookVerdict, KeyboardEvent, MouseEvent};
use crate::platform::{
    AcquireStatus, AttachedDevice, Backend, BufferedEvent, ButtonObject, HookSource, HostWindow,
    InputSubsystem, RawDevice,
};
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    pub id: DeviceId,
    pub name: String,
    pub buttons: usize,
}

impl MockDeviceSpec {
    pub fn new(id: u128, name: &str, buttons: usize) -> Self {
        Self::with_id(DeviceId::from_u128(id), name, buttons)
    }

    pub fn with_id(id: DeviceId, name: &str, buttons: usize) -> Self {
        Self {
            id,
            name: name.to_string(),
            buttons,
        }
    }

    /// Control-type code of the button at `index`.
    pub fn button_code(index: usize) -> u32 {
        ((index as u32 + 1) << 8) | 0x4
    }
}

#[derive(Debug, Clone, Copy)]
pub enum HookInput {
    Key(KeyboardEvent),
    Mouse(MouseEvent),
}

#[derive(Default)]
struct WorldState {
    attached: Vec<MockDeviceSpec>,
    log: Vec<String>,
    fail_open: HashSet<DeviceId>,
    fail_read: HashSet<DeviceId>,
    fail_enumerate: bool,
    acquire_script: HashMap<DeviceId, VecDeque<AcquireStatus>>,
    pending: HashMap<DeviceId, VecDeque<(u32, u32)>>,
    fail_connect: bool,
    fail_hooks: bool,
    hook_inputs: VecDeque<HookInput>,
    verdicts: Vec<HookVerdict>,
}

/// Shared state standing in for the operating system.
#[derive(Clone, Default)]
pub struct World(Arc<Mutex<WorldState>>);

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, WorldState> {
        self.0.lock().unwrap()
    }

    fn record(&self, line: String) {
        self.state().log.push(line);
    }

    pub fn attach(&self, spec: MockDeviceSpec) {
        self.state().attached.push(spec);
    }

    pub fn detach(&self, id: DeviceId) {
        self.state().attached.retain(|d| d.id != id);
    }

    pub fn set_buttons(&self, id: DeviceId, buttons: usize) {
        for spec in self.state().attached.iter_mut().filter(|d| d.id == id) {
            spec.buttons = buttons;
        }
    }

    pub fn fail_open(&self, id: DeviceId) {
        self.state().fail_open.insert(id);
    }

    pub fn fail_next_read(&self, id: DeviceId) {
        self.state().fail_read.insert(id);
    }

    pub fn fail_next_enumerate(&self) {
        self.state().fail_enumerate = true;
    }

    pub fn fail_connect(&self) {
        self.state().fail_connect = true;
    }

    pub fn fail_hooks(&self) {
        self.state().fail_hooks = true;
    }

    pub fn script_acquire(&self, id: DeviceId, status: AcquireStatus) {
        self.state()
            .acquire_script
            .entry(id)
            .or_default()
            .push_back(status);
    }

    pub fn push_event(&self, id: DeviceId, button: usize, data: u32) {
        self.state()
            .pending
            .entry(id)
            .or_default()
            .push_back((MockDeviceSpec::button_code(button), data));
    }

    pub fn inject(&self, input: HookInput) {
        self.state().hook_inputs.push_back(input);
    }

    pub fn verdicts(&self) -> Vec<HookVerdict> {
        self.state().verdicts.clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    pub fn logged(&self, line: &str) -> bool {
        self.state().log.iter().any(|l| l == line)
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.state()
            .log
            .iter()
            .filter(|l| l.starts_with(prefix))
            .count()
    }

    /// Position of the first log line equal to `line`.
    pub fn position(&self, line: &str) -> Option<usize> {
        self.state().log.iter().position(|l| l == line)
    }
}

pub struct MockSubsystem {
    world: World,
}

impl MockSubsystem {
    pub fn new(world: World) -> Self {
        Self { world }
    }
}

impl InputSubsystem for MockSubsystem {
    type Device = MockDevice;

    fn attached_devices(&mut self) -> Result<Vec<AttachedDevice>> {
        self.world.record("enumerate".to_string());
        if std::mem::take(&mut self.world.state().fail_enumerate) {
            bail!("enumeration failed");
        }
        Ok(self
            .world
            .state()
            .attached
            .iter()
            .map(|spec| AttachedDevice {
                id: spec.id,
                product_name: spec.name.clone(),
                instance_name: format!("{} #1", spec.name),
            })
            .collect())
    }

    fn open(&mut self, device: &AttachedDevice) -> Result<MockDevice> {
        if self.world.state().fail_open.contains(&device.id) {
            bail!("device refused to open");
        }
        self.world.record(format!("open {}", device.product_name));
        Ok(MockDevice {
            id: device.id,
            name: device.product_name.clone(),
            world: self.world.clone(),
            offsets: HashMap::new(),
            acquired: false,
        })
    }
}

pub struct MockDevice {
    id: DeviceId,
    name: String,
    world: World,
    offsets: HashMap<u32, u32>,
    acquired: bool,
}

impl MockDevice {
    fn attached(&self) -> bool {
        self.world.state().attached.iter().any(|d| d.id == self.id)
    }
}

impl RawDevice for MockDevice {
    fn button_objects(&mut self) -> Result<Vec<ButtonObject>> {
        let state = self.world.state();
        let Some(spec) = state.attached.iter().find(|d| d.id == self.id) else {
            bail!("device is gone");
        };
        Ok((0..spec.buttons)
            .map(|i| ButtonObject {
                type_code: MockDeviceSpec::button_code(i),
                name: format!("Button {}", i),
            })
            .collect())
    }

    fn set_cooperative_level(&mut self, host: HostWindow) -> Result<()> {
        self.world.record(format!("cooperative {} {}", self.name, host.0));
        Ok(())
    }

    fn set_data_format(&mut self, format: &DataFormat) -> Result<()> {
        self.offsets = format
            .objects
            .iter()
            .map(|o| (o.type_code, o.offset))
            .collect();
        self.world
            .record(format!("format {} {}", self.name, format.objects.len()));
        Ok(())
    }

    fn set_buffer_size(&mut self, capacity: u32) -> Result<()> {
        self.world.record(format!("buffer {} {}", self.name, capacity));
        Ok(())
    }

    fn acquire(&mut self) -> AcquireStatus {
        self.world.record(format!("acquire {}", self.name));
        let scripted = self
            .world
            .state()
            .acquire_script
            .get_mut(&self.id)
            .and_then(VecDeque::pop_front);
        if let Some(status) = scripted {
            return status;
        }
        if !self.attached() {
            return AcquireStatus::Removed;
        }
        if self.acquired {
            AcquireStatus::AlreadyAcquired
        } else {
            self.acquired = true;
            AcquireStatus::Acquired
        }
    }

    fn unacquire(&mut self) {
        self.acquired = false;
        self.world.record(format!("unacquire {}", self.name));
    }

    fn poll(&mut self) {}

    fn read_buffered(&mut self, out: &mut Vec<BufferedEvent>) -> Result<()> {
        let mut state = self.world.state();
        if state.fail_read.remove(&self.id) {
            bail!("read failed");
        }
        let pending = state.pending.remove(&self.id).unwrap_or_default();
        out.extend(pending.into_iter().filter_map(|(type_code, data)| {
            self.offsets
                .get(&type_code)
                .map(|&offset| BufferedEvent { offset, data })
        }));
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.world.record(format!("release {}", self.name));
    }
}

pub struct MockBackend {
    world: World,
}

impl MockBackend {
    pub fn new(world: World) -> Self {
        Self { world }
    }
}

impl Backend for MockBackend {
    type Subsystem = MockSubsystem;
    type Hooks = MockHooks;

    fn connect(&mut self) -> Result<MockSubsystem> {
        self.world.record("connect".to_string());
        if self.world.state().fail_connect {
            bail!("subsystem unavailable");
        }
        Ok(MockSubsystem::new(self.world.clone()))
    }

    fn install_hooks(
        &mut self,
        listener: Arc<HookListener>,
        stop: Arc<StopSignal>,
    ) -> Result<MockHooks> {
        if self.world.state().fail_hooks {
            bail!("hooks refused");
        }
        self.world.record("install hooks".to_string());
        Ok(MockHooks {
            world: self.world.clone(),
            listener,
            stop,
        })
    }

    fn raise_priority(&mut self) -> Result<()> {
        self.world.record("raise priority".to_string());
        Ok(())
    }

    fn can_suppress(&self) -> bool {
        true
    }
}

pub struct MockHooks {
    world: World,
    listener: Arc<HookListener>,
    stop: Arc<StopSignal>,
}

impl HookSource for MockHooks {
    fn pump(&mut self, timeout: Duration) -> bool {
        let inputs: Vec<HookInput> = self.world.state().hook_inputs.drain(..).collect();
        for input in inputs {
            let verdict = match input {
                HookInput::Key(event) => self.listener.on_keyboard(&event),
                HookInput::Mouse(event) => self.listener.on_mouse(&event),
            };
            self.world.state().verdicts.push(verdict);
        }
        self.stop.wait_timeout(timeout)
    }

    fn uninstall(self) {
        self.world.record("uninstall hooks".to_string());
    }
}
