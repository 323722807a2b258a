use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tauri::window::Color;
use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindow, WebviewWindowBuilder};

use crate::config::{Decorations, LoadTarget, RunMode, ShellConfig, WindowConfig};
use crate::error::{Result, ShellError};
use crate::lifecycle::LifecycleController;
use crate::window::{SurfaceWindow, WindowHost};
use crate::worker::ProcessSupervisor;

pub type DesktopController = LifecycleController<TauriWindowHost, ProcessSupervisor>;
pub type SharedController = Arc<Mutex<DesktopController>>;

/// Builds the main webview window through Tauri.
pub struct TauriWindowHost {
    app: AppHandle,
    devtools: bool,
}

impl TauriWindowHost {
    pub fn new(app: AppHandle, devtools: bool) -> Self {
        Self { app, devtools }
    }
}

impl WindowHost for TauriWindowHost {
    type Window = WebviewWindow;

    fn create(&self, config: &WindowConfig, target: &LoadTarget) -> Result<WebviewWindow> {
        let url = match target {
            LoadTarget::Url(url) => WebviewUrl::External(url.parse().map_err(|e| {
                ShellError::Config(format!("invalid dev url `{}`: {}", url, e))
            })?),
            LoadTarget::File(path) => WebviewUrl::App(path.clone()),
        };

        let (r, g, b, a) = config.background_rgba();
        let builder = WebviewWindowBuilder::new(&self.app, config.label.as_str(), url)
            .title(config.title.as_str())
            .inner_size(f64::from(config.width), f64::from(config.height))
            .decorations(config.decorations == Decorations::Bordered)
            .background_color(Color(r, g, b, a));

        #[cfg(target_os = "macos")]
        let builder = if config.hidden_title_bar {
            builder
                .title_bar_style(tauri::TitleBarStyle::Overlay)
                .hidden_title(true)
        } else {
            builder
        };

        let window = builder.build()?;

        if self.devtools {
            #[cfg(debug_assertions)]
            window.open_devtools();
            #[cfg(not(debug_assertions))]
            log::warn!("Devtools requested but unavailable in release builds");
        }

        Ok(window)
    }
}

impl SurfaceWindow for WebviewWindow {
    fn minimize(&self) -> Result<()> {
        Ok(WebviewWindow::minimize(self)?)
    }

    fn maximize(&self) -> Result<()> {
        Ok(WebviewWindow::maximize(self)?)
    }

    fn unmaximize(&self) -> Result<()> {
        Ok(WebviewWindow::unmaximize(self)?)
    }

    fn is_maximized(&self) -> Result<bool> {
        Ok(WebviewWindow::is_maximized(self)?)
    }

    fn close(&self) -> Result<()> {
        Ok(WebviewWindow::close(self)?)
    }
}

/// Directory that relative worker paths and `shell.json` resolve against.
/// Dev builds run from the source tree; installed builds from the bundle's resources.
pub fn install_dir(app: &AppHandle, mode: RunMode) -> PathBuf {
    if let Ok(dir) = std::env::var("ADA_HOME") {
        return PathBuf::from(dir);
    }
    match mode {
        RunMode::Development => PathBuf::from(env!("CARGO_MANIFEST_DIR")),
        RunMode::Production => app.path().resource_dir().unwrap_or_else(|e| {
            log::warn!("No resource dir ({}), falling back to working directory", e);
            PathBuf::from(".")
        }),
    }
}

pub fn build_controller(app: &AppHandle) -> DesktopController {
    let mode = RunMode::from_env_value(std::env::var("ADA_ENV").ok().as_deref());
    let base_dir = install_dir(app, mode);
    let config = ShellConfig::load(Some(&base_dir));
    log::info!("Starting ADA shell in {:?} mode from {}", config.mode, base_dir.display());

    let host = TauriWindowHost::new(app.clone(), config.devtools_enabled());
    let supervisor =
        ProcessSupervisor::default().with_grace(Duration::from_millis(config.shutdown_grace_ms));
    LifecycleController::from_config(&config, &base_dir, host, supervisor)
}
