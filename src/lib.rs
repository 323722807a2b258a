//! ADA desktop shell.
//!
//! Hosts the single UI window and supervises the Python backend worker.
//!
//! Module structure:
//! - lifecycle: startup/shutdown sequencing
//! - worker: backend process supervision
//! - window: the main window and its control commands
//! - channel: UI -> host control messages
//! - session, config, error: shared state and plumbing
//! - geometry: wireframe data contract for the CAD viewer

pub mod channel;
pub mod config;
pub mod error;
pub mod geometry;
pub mod lifecycle;
pub mod session;
pub mod window;
pub mod worker;

#[cfg(feature = "desktop")]
pub mod desktop;

pub use channel::{ControlChannel, ControlCommand, ControlSender};
pub use config::{LoadTarget, RunMode, ShellConfig};
pub use error::ShellError;
pub use lifecycle::{LifecycleController, QuitDecision};
pub use session::{ApplicationSession, LifecycleState};
pub use window::{SurfaceWindow, WindowHost, WindowManager};
pub use worker::{ProcessSupervisor, Termination, WorkerHandle, WorkerLaunch, WorkerLauncher};

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tauri::{Listener, Manager, RunEvent, WindowEvent};

    tauri::Builder::default()
        .setup(|app| {
            let level = if cfg!(debug_assertions) {
                log::LevelFilter::Info
            } else {
                log::LevelFilter::Warn
            };
            app.handle()
                .plugin(tauri_plugin_log::Builder::default().level(level).build())?;

            let controller: desktop::SharedController =
                Arc::new(Mutex::new(desktop::build_controller(app.handle())));
            app.manage(controller.clone());

            // Listeners go in before startup; the channel drops anything
            // emitted until on_ready opens it.
            let sender = controller.lock().control_sender();
            for command in ControlCommand::ALL {
                let sender = sender.clone();
                let controller = controller.clone();
                app.listen(command.event_name(), move |_event| {
                    if sender.send(command) {
                        controller.lock().pump();
                    }
                });
            }

            controller.lock().on_ready();
            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Destroyed = event {
                let Some(controller) = window.try_state::<desktop::SharedController>() else {
                    return;
                };
                let mut controller = controller.lock();
                if window.label() != controller.windows().config().label {
                    return;
                }
                let decision = controller.on_window_destroyed();
                log::info!("Main window closed: {:?}", decision);
            }
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| {
            let Some(controller) = app_handle.try_state::<desktop::SharedController>() else {
                return;
            };
            match event {
                RunEvent::ExitRequested { code, api, .. } => {
                    let mut controller = controller.lock();
                    if code.is_none() && !controller.quit_on_windows_closed() {
                        api.prevent_exit();
                    } else {
                        controller.request_quit();
                    }
                }
                RunEvent::Exit => {
                    // Worker must be gone before the process exits
                    let termination = controller.lock().on_will_quit();
                    log::info!("App shutting down - backend worker: {:?}", termination);
                }
                #[cfg(target_os = "macos")]
                RunEvent::Reopen { .. } => controller.lock().on_reactivate(),
                _ => {}
            }
        });
}
