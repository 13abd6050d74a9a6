//! Engine builder, background thread and the handle that controls it.

use crate::button::ButtonId;
use crate::config::EngineConfig;
use crate::device::{DeviceCatalog, DeviceRegistry};
use crate::event::ShortcutDispatcher;
use crate::hook::HookListener;
use crate::intercept::{InterceptTarget, Interception};
use crate::platform::{Backend, HookSource, HostWindow};
use crate::poll::{HardwareCounter, Poller};
use crate::replay::{Replayer, SurfaceSink};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Waker = Box<dyn Fn() + Send>;

/// Shutdown request shared between the handle and the background thread.
///
/// Backends whose event loop blocks in native code register a waker that
/// nudges the loop when a stop is requested.
#[derive(Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
    waker: Mutex<Option<Waker>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
        if let Some(wake) = self
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            wake();
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `timeout`. Returns `false` if a stop was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .cond
            .wait_timeout_while(stopped, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        !*stopped
    }

    /// Register the function that interrupts the event loop.
    ///
    /// Runs immediately if a stop was already requested.
    pub fn set_waker(&self, waker: impl Fn() + Send + 'static) {
        *self.waker.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(waker));
        if self.is_stopped() {
            self.request();
        }
    }
}

#[derive(Default)]
struct GateState {
    host: Option<HostWindow>,
    cancelled: bool,
}

/// Holds the background thread until the host window exists.
#[derive(Default)]
pub struct ReadyGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl ReadyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the waiter with `host`. Later calls keep the first window.
    pub fn open(&self, host: HostWindow) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.host.get_or_insert(host);
        self.cond.notify_all();
    }

    /// Release the waiter without a window.
    pub fn cancel(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancelled = true;
        self.cond.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .host
            .is_some()
    }

    /// Block until opened or cancelled. `None` means cancelled first.
    pub fn wait(&self) -> Option<HostWindow> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self
            .cond
            .wait_while(state, |s| s.host.is_none() && !s.cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        if state.cancelled {
            None
        } else {
            state.host
        }
    }
}

/// Lifecycle of the background thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Starting,
    /// Connected to the input subsystem, waiting for the host window.
    WaitingForHost,
    Running,
    /// Initialization failed; capture is disabled for this session.
    Failed(String),
    Stopped,
}

impl EngineStatus {
    fn is_settled(&self) -> bool {
        matches!(
            self,
            EngineStatus::Running | EngineStatus::Failed(_) | EngineStatus::Stopped
        )
    }
}

struct Shared {
    status: Mutex<EngineStatus>,
    status_changed: Condvar,
    gate: ReadyGate,
    stop: Arc<StopSignal>,
    interception: Arc<Interception>,
    hardware: HardwareCounter,
    remap: Arc<AtomicBool>,
    catalog: DeviceCatalog,
}

impl Shared {
    fn set_status(&self, status: EngineStatus) {
        log::debug!("Capture engine status: {:?}", status);
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
        self.status_changed.notify_all();
    }

    fn status(&self) -> EngineStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn wait_for(&self, timeout: Duration, done: impl Fn(&EngineStatus) -> bool) -> EngineStatus {
        let status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        let (status, _) = self
            .status_changed
            .wait_timeout_while(status, timeout, |s| !done(s))
            .unwrap_or_else(PoisonError::into_inner);
        status.clone()
    }
}

/// Builder for a [`ShortcutEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    dispatcher: Option<Arc<dyn ShortcutDispatcher>>,
    host: Option<HostWindow>,
    hardware: Option<HardwareCounter>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Receiver of every button transition. Required.
    pub fn dispatcher(mut self, dispatcher: impl ShortcutDispatcher + 'static) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    pub fn shared_dispatcher(mut self, dispatcher: Arc<dyn ShortcutDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Host window known up front; skips waiting for [`EngineHandle::host_ready`].
    pub fn host_window(mut self, host: HostWindow) -> Self {
        self.host = Some(host);
        self
    }

    /// Share a counter the host already bumps on device notifications.
    pub fn hardware_counter(mut self, counter: HardwareCounter) -> Self {
        self.hardware = Some(counter);
        self
    }

    pub fn build(self) -> Result<ShortcutEngine> {
        let dispatcher = self
            .dispatcher
            .context("A shortcut dispatcher is required")?;
        Ok(ShortcutEngine {
            config: self.config,
            dispatcher,
            host: self.host,
            hardware: self.hardware.unwrap_or_default(),
        })
    }
}

/// A configured engine, ready to start its background thread.
pub struct ShortcutEngine {
    config: EngineConfig,
    dispatcher: Arc<dyn ShortcutDispatcher>,
    host: Option<HostWindow>,
    hardware: HardwareCounter,
}

impl ShortcutEngine {
    /// Start capturing with the platform's native backend.
    #[cfg(any(target_os = "windows", target_os = "linux", target_os = "macos"))]
    pub fn start(self) -> Result<EngineHandle> {
        self.start_with(crate::platform::NativeBackend::default())
    }

    /// Start capturing (unsupported platform stub).
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    pub fn start(self) -> Result<EngineHandle> {
        anyhow::bail!("Global shortcut capture is not supported on this platform")
    }

    /// Start capturing with `backend` on a new background thread.
    pub fn start_with<B: Backend>(self, backend: B) -> Result<EngineHandle> {
        let can_suppress = backend.can_suppress();
        let shared = Arc::new(Shared {
            status: Mutex::new(EngineStatus::Starting),
            status_changed: Condvar::new(),
            gate: ReadyGate::new(),
            stop: Arc::new(StopSignal::new()),
            interception: Arc::new(Interception::new()),
            hardware: self.hardware,
            remap: Arc::new(AtomicBool::new(false)),
            catalog: DeviceCatalog::new(),
        });
        if let Some(host) = self.host {
            shared.gate.open(host);
        }

        let thread = {
            let shared = Arc::clone(&shared);
            let dispatcher = self.dispatcher;
            let config = self.config.clone();
            thread::Builder::new()
                .name(self.config.thread_name.clone())
                .spawn(move || run(backend, shared, dispatcher, config))
                .context("Failed to spawn capture thread")?
        };

        Ok(EngineHandle {
            shared,
            thread: Some(thread),
            can_suppress,
        })
    }
}

fn run<B: Backend>(
    mut backend: B,
    shared: Arc<Shared>,
    dispatcher: Arc<dyn ShortcutDispatcher>,
    config: EngineConfig,
) {
    let status = match capture(&mut backend, &shared, dispatcher, &config) {
        Ok(()) => EngineStatus::Stopped,
        Err(e) => {
            log::error!("Global shortcut capture disabled: {:#}", e);
            EngineStatus::Failed(format!("{:#}", e))
        }
    };
    shared.set_status(status);
}

fn capture<B: Backend>(
    backend: &mut B,
    shared: &Shared,
    dispatcher: Arc<dyn ShortcutDispatcher>,
    config: &EngineConfig,
) -> Result<()> {
    let subsystem = backend
        .connect()
        .context("Failed to connect to the input subsystem")?;

    shared.set_status(EngineStatus::WaitingForHost);
    let Some(host) = shared.gate.wait() else {
        log::debug!("Stopped before the host window was ready");
        return Ok(());
    };

    let mut registry = DeviceRegistry::new(subsystem, host, config.buffer_size, shared.catalog.clone());
    let listener = Arc::new(HookListener::new(
        Arc::clone(&dispatcher),
        Arc::clone(&shared.interception),
    ));
    let mut hooks = backend
        .install_hooks(listener, Arc::clone(&shared.stop))
        .context("Failed to install input hooks")?;
    log::info!("Global input hooks installed");
    shared.set_status(EngineStatus::Running);

    if config.raise_priority {
        if let Err(e) = backend.raise_priority() {
            log::warn!("Failed to raise capture thread priority: {:#}", e);
        }
    }

    let mut poller = Poller::new(
        shared.hardware.clone(),
        Arc::clone(&shared.remap),
        config.press_mask,
    );
    let interval = config.poll_interval();
    while hooks.pump(interval) {
        poller.tick(&mut registry, dispatcher.as_ref());
    }

    hooks.uninstall();
    registry.shutdown();
    log::info!("Global shortcut capture stopped");
    Ok(())
}

/// Control surface of a running engine.
///
/// The background thread stops and is joined when the handle is dropped.
///
/// # Example
///
/// ```no_run
/// use shortcut_capture::{EngineBuilder, HostWindow};
/// use std::time::Duration;
///
/// let (dispatcher, events) = shortcut_capture::channel();
/// let handle = EngineBuilder::new()
///     .dispatcher(dispatcher)
///     .build()
///     .unwrap()
///     .start()
///     .unwrap();
///
/// // Once the main window exists:
/// handle.host_ready(HostWindow(0));
///
/// while let Ok(event) = events.recv_timeout(Duration::from_secs(5)) {
///     println!("{} {}", handle.button_name(event.button), event.pressed);
/// }
/// ```
pub struct EngineHandle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    can_suppress: bool,
}

impl EngineHandle {
    pub fn status(&self) -> EngineStatus {
        self.shared.status()
    }

    pub fn is_running(&self) -> bool {
        self.status() == EngineStatus::Running
    }

    /// Block until the engine is running, has failed or has stopped.
    pub fn wait_started(&self, timeout: Duration) -> EngineStatus {
        self.shared.wait_for(timeout, EngineStatus::is_settled)
    }

    /// The host's main window now exists; device setup may proceed.
    pub fn host_ready(&self, host: HostWindow) {
        self.shared.gate.open(host);
    }

    /// Counter to bump on device arrival/removal notifications.
    pub fn hardware_counter(&self) -> HardwareCounter {
        self.shared.hardware.clone()
    }

    pub fn notify_hardware_change(&self) {
        self.shared.hardware.notify();
    }

    /// Rebuild every device's control table on the next tick.
    pub fn request_remap(&self) {
        self.shared.remap.store(true, Ordering::SeqCst);
    }

    /// Enter interception mode with `target`, or leave it with `None`.
    pub fn set_intercept(&self, target: Option<Arc<dyn InterceptTarget>>) {
        self.shared.interception.set_target(target);
    }

    pub fn is_intercepting(&self) -> bool {
        self.shared.interception.is_active()
    }

    /// The consumer of intercepted input, to be driven on the thread that
    /// owns the target surface. Only the first call returns a replayer.
    pub fn replayer<S: SurfaceSink>(&self, sink: S) -> Option<Replayer<S>> {
        let rx = self.shared.interception.take_receiver()?;
        Some(Replayer::new(rx, Arc::clone(&self.shared.interception), sink))
    }

    pub fn button_name(&self, button: ButtonId) -> String {
        self.shared.catalog.button_name(button)
    }

    pub fn catalog(&self) -> DeviceCatalog {
        self.shared.catalog.clone()
    }

    /// Whether hooked events can be hidden from other applications.
    pub fn can_suppress(&self) -> bool {
        self.can_suppress
    }

    /// Stop the background thread and wait for it to clean up.
    pub fn stop(&mut self) {
        self.shared.stop.request();
        self.shared.gate.cancel();
        if let Some(thread) = self.thread.take() {
            let started = Instant::now();
            if thread.join().is_err() {
                log::error!("Capture thread panicked");
            }
            log::debug!("Capture thread joined after {:?}", started.elapsed());
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
