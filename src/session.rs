/// Where a session is in its start/run/shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Starting,
    Running,
    Terminating,
    Terminated,
}

/// One run of the application. Holds at most one window and one worker.
///
/// Owned by the lifecycle controller and lent to the window manager, so all
/// mutation happens on the host's event loop.
#[derive(Debug)]
pub struct ApplicationSession<W, K> {
    window: Option<W>,
    worker: Option<K>,
    state: LifecycleState,
}

impl<W, K> Default for ApplicationSession<W, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W, K> ApplicationSession<W, K> {
    pub fn new() -> Self {
        Self {
            window: None,
            worker: None,
            state: LifecycleState::Uninitialized,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: LifecycleState) {
        if self.state != state {
            log::debug!("Session {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    pub fn window(&self) -> Option<&W> {
        self.window.as_ref()
    }

    pub fn has_window(&self) -> bool {
        self.window.is_some()
    }

    pub(crate) fn set_window(&mut self, window: W) {
        self.window = Some(window);
    }

    pub(crate) fn take_window(&mut self) -> Option<W> {
        self.window.take()
    }

    pub fn worker(&self) -> Option<&K> {
        self.worker.as_ref()
    }

    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    pub(crate) fn set_worker(&mut self, worker: Option<K>) {
        self.worker = worker;
    }

    pub(crate) fn take_worker(&mut self) -> Option<K> {
        self.worker.take()
    }

    /// Terminated and holding neither a window nor a worker.
    pub fn is_released(&self) -> bool {
        self.state == LifecycleState::Terminated && self.window.is_none() && self.worker.is_none()
    }
}
