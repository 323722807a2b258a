use std::path::Path;

use crate::channel::{ControlChannel, ControlCommand, ControlReceiver, ControlSender};
use crate::config::ShellConfig;
use crate::session::{ApplicationSession, LifecycleState};
use crate::window::{WindowHost, WindowManager};
use crate::worker::{Termination, WorkerLaunch, WorkerLauncher};

/// What the host should do after the last window went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitDecision {
    Quit,
    StayResident,
}

/// Sequences startup and shutdown of the window and the backend worker.
///
/// Startup requests the worker before the window and does not wait for either
/// to become healthy. Shutdown always terminates the worker before the host
/// is allowed to exit.
pub struct LifecycleController<H: WindowHost, L: WorkerLauncher> {
    session: ApplicationSession<H::Window, L::Handle>,
    windows: WindowManager<H>,
    launcher: L,
    launch: WorkerLaunch,
    channel: ControlChannel,
    receiver: Option<ControlReceiver>,
    quit_on_windows_closed: bool,
}

impl<H: WindowHost, L: WorkerLauncher> LifecycleController<H, L> {
    pub fn new(
        windows: WindowManager<H>,
        launcher: L,
        launch: WorkerLaunch,
        quit_on_windows_closed: bool,
    ) -> Self {
        Self {
            session: ApplicationSession::new(),
            windows,
            launcher,
            launch,
            channel: ControlChannel::new(),
            receiver: None,
            quit_on_windows_closed,
        }
    }

    pub fn from_config(config: &ShellConfig, base_dir: &Path, host: H, launcher: L) -> Self {
        let windows = WindowManager::new(host, config.window.clone(), config.load_target());
        Self::new(
            windows,
            launcher,
            config.worker.launch(base_dir),
            config.quit_on_windows_closed,
        )
    }

    pub fn state(&self) -> LifecycleState {
        self.session.state()
    }

    pub fn session(&self) -> &ApplicationSession<H::Window, L::Handle> {
        &self.session
    }

    pub fn windows(&self) -> &WindowManager<H> {
        &self.windows
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn quit_on_windows_closed(&self) -> bool {
        self.quit_on_windows_closed
    }

    /// Handed to the UI side. Commands sent before [`Self::on_ready`] are dropped.
    pub fn control_sender(&self) -> ControlSender {
        self.channel.sender()
    }

    /// Host runtime is ready: open the control channel, request the worker,
    /// then create the window.
    pub fn on_ready(&mut self) {
        if self.state() != LifecycleState::Uninitialized {
            log::warn!("Ignoring ready signal in state {:?}", self.state());
            return;
        }
        self.session.set_state(LifecycleState::Starting);
        self.receiver = Some(self.channel.establish());

        // A missing worker must not hold back the window
        let worker = self.launcher.start(&self.launch);
        if worker.is_none() {
            log::warn!("Continuing without backend worker");
        }
        self.session.set_worker(worker);

        if let Err(e) = self.windows.create_window(&mut self.session) {
            log::error!("Failed to create window: {}", e);
        }
        self.session.set_state(LifecycleState::Running);
    }

    /// Apply every command queued on the control channel.
    pub fn pump(&mut self) -> usize {
        let commands = match &self.receiver {
            Some(receiver) => receiver.drain(),
            None => return 0,
        };
        for &command in &commands {
            self.handle_command(command);
        }
        commands.len()
    }

    pub fn handle_command(&self, command: ControlCommand) {
        log::debug!("Control command: {}", command);
        match command {
            ControlCommand::Minimize => self.windows.minimize(&self.session),
            ControlCommand::MaximizeToggle => self.windows.toggle_maximize(&self.session),
            ControlCommand::Close => self.windows.close(&self.session),
        }
    }

    /// App reactivated (dock click). Recreate the window only if there is none.
    pub fn on_reactivate(&mut self) {
        if self.state() != LifecycleState::Running || self.session.has_window() {
            return;
        }
        if let Err(e) = self.windows.create_window(&mut self.session) {
            log::error!("Failed to recreate window: {}", e);
        }
    }

    pub fn on_window_destroyed(&mut self) -> QuitDecision {
        self.windows.window_destroyed(&mut self.session);
        if self.session.has_window() || !self.quit_on_windows_closed {
            return QuitDecision::StayResident;
        }
        self.request_quit();
        QuitDecision::Quit
    }

    pub fn request_quit(&mut self) {
        match self.state() {
            LifecycleState::Terminating | LifecycleState::Terminated => {}
            state => {
                log::info!("Quit requested in state {:?}", state);
                self.session.set_state(LifecycleState::Terminating);
            }
        }
    }

    /// Host is about to exit. Terminates the worker, then releases the session.
    /// Safe to call repeatedly and before startup finished.
    pub fn on_will_quit(&mut self) -> Termination {
        if self.state() == LifecycleState::Terminated {
            return Termination::NotRunning;
        }
        self.request_quit();

        let termination = match self.session.take_worker() {
            Some(handle) => {
                log::info!("Shutting down backend worker");
                self.launcher.terminate(handle)
            }
            None => Termination::NotRunning,
        };

        self.session.take_window();
        self.receiver = None;
        self.session.set_state(LifecycleState::Terminated);
        termination
    }
}

impl<H: WindowHost, L: WorkerLauncher> Drop for LifecycleController<H, L> {
    fn drop(&mut self) {
        // Never leave the worker orphaned
        if self.session.has_worker() {
            self.on_will_quit();
        }
    }
}
