use crate::config::{LoadTarget, WindowConfig};
use crate::error::{Result, ShellError};
use crate::session::ApplicationSession;

/// The operations the shell needs from a native window.
pub trait SurfaceWindow {
    fn minimize(&self) -> Result<()>;
    fn maximize(&self) -> Result<()>;
    fn unmaximize(&self) -> Result<()>;
    fn is_maximized(&self) -> Result<bool>;
    /// Request close. Destruction is reported back through
    /// [`WindowManager::window_destroyed`].
    fn close(&self) -> Result<()>;
}

/// Builds native windows for the host windowing subsystem.
pub trait WindowHost {
    type Window: SurfaceWindow;

    fn create(&self, config: &WindowConfig, target: &LoadTarget) -> Result<Self::Window>;
}

/// Owns creation of the session's single window and applies control commands to it.
pub struct WindowManager<H: WindowHost> {
    host: H,
    config: WindowConfig,
    target: LoadTarget,
}

impl<H: WindowHost> WindowManager<H> {
    pub fn new(host: H, config: WindowConfig, target: LoadTarget) -> Self {
        Self {
            host,
            config,
            target,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn target(&self) -> &LoadTarget {
        &self.target
    }

    pub fn create_window<K>(&self, session: &mut ApplicationSession<H::Window, K>) -> Result<()> {
        if session.has_window() {
            return Err(ShellError::WindowExists);
        }
        self.config.validate()?;

        let window = self.host.create(&self.config, &self.target)?;
        log::info!(
            "Created window `{}` {}x{} loading {:?}",
            self.config.label,
            self.config.width,
            self.config.height,
            self.target
        );
        session.set_window(window);
        Ok(())
    }

    pub fn minimize<K>(&self, session: &ApplicationSession<H::Window, K>) {
        if let Some(window) = session.window() {
            if let Err(e) = window.minimize() {
                log::warn!("Failed to minimize window: {}", e);
            }
        }
    }

    /// Maximize if restored, restore if maximized.
    pub fn toggle_maximize<K>(&self, session: &ApplicationSession<H::Window, K>) {
        let Some(window) = session.window() else {
            return;
        };
        let result = window.is_maximized().and_then(|maximized| {
            if maximized {
                window.unmaximize().map(|_| false)
            } else {
                window.maximize().map(|_| true)
            }
        });
        match result {
            Ok(maximized) => log::debug!("Window maximized: {}", maximized),
            Err(e) => log::warn!("Failed to toggle maximize: {}", e),
        }
    }

    pub fn close<K>(&self, session: &ApplicationSession<H::Window, K>) {
        if let Some(window) = session.window() {
            if let Err(e) = window.close() {
                log::warn!("Failed to close window: {}", e);
            }
        }
    }

    /// Forget the window after the host destroyed it. Never recreates it.
    pub fn window_destroyed<K>(&self, session: &mut ApplicationSession<H::Window, K>) {
        if session.take_window().is_some() {
            log::info!("Window `{}` destroyed", self.config.label);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, FakeHost};
    use super::*;

    type Session = ApplicationSession<testing::FakeWindow, ()>;

    fn manager() -> WindowManager<FakeHost> {
        WindowManager::new(
            FakeHost::default(),
            WindowConfig::default(),
            LoadTarget::Url("http://localhost:5173".to_string()),
        )
    }

    #[test]
    fn commands_without_window_are_noops() {
        let windows = manager();
        let mut session = Session::new();
        for _ in 0..3 {
            windows.minimize(&session);
            windows.toggle_maximize(&session);
            windows.close(&session);
        }
        windows.window_destroyed(&mut session);
        assert_eq!(windows.host().created_count(), 0);
        assert!(!session.has_window());
    }

    #[test]
    fn second_window_is_rejected() {
        let windows = manager();
        let mut session = Session::new();
        windows.create_window(&mut session).unwrap();
        let err = windows.create_window(&mut session).unwrap_err();
        assert!(matches!(err, ShellError::WindowExists));
        assert_eq!(windows.host().created_count(), 1);
    }

    #[test]
    fn toggle_maximize_twice_restores() {
        let windows = manager();
        let mut session = Session::new();
        windows.create_window(&mut session).unwrap();
        let state = windows.host().last();

        windows.toggle_maximize(&session);
        assert!(state.maximized.get());
        windows.toggle_maximize(&session);
        assert!(!state.maximized.get());
        assert_eq!(*state.calls.borrow(), [Call::Maximize, Call::Unmaximize]);
    }

    #[test]
    fn toggle_starting_maximized() {
        let windows = manager();
        let mut session = Session::new();
        windows.create_window(&mut session).unwrap();
        let state = windows.host().last();
        state.maximized.set(true);

        windows.toggle_maximize(&session);
        windows.toggle_maximize(&session);
        assert!(state.maximized.get());
    }

    #[test]
    fn minimize_and_close_reach_window() {
        let windows = manager();
        let mut session = Session::new();
        windows.create_window(&mut session).unwrap();
        windows.minimize(&session);
        windows.close(&session);
        assert_eq!(*windows.host().last().calls.borrow(), [Call::Minimize, Call::Close]);
    }

    #[test]
    fn destroyed_window_is_cleared_not_recreated() {
        let windows = manager();
        let mut session = Session::new();
        windows.create_window(&mut session).unwrap();
        windows.window_destroyed(&mut session);
        assert!(!session.has_window());
        assert_eq!(windows.host().created_count(), 1);

        windows.create_window(&mut session).unwrap();
        assert_eq!(windows.host().created_count(), 2);
    }

    #[test]
    fn invalid_config_never_reaches_host() {
        let config = WindowConfig {
            width: 0,
            ..WindowConfig::default()
        };
        let windows = WindowManager::new(FakeHost::default(), config, LoadTarget::File("index.html".into()));
        let mut session = Session::new();
        assert!(matches!(
            windows.create_window(&mut session),
            Err(ShellError::Config(_))
        ));
        assert_eq!(windows.host().created_count(), 0);
    }
}
