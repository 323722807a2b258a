use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::mpsc;
use std::sync::Arc;
use thiserror::Error;

/// Window-control message sent by the UI. Carries no payload and gets no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlCommand {
    #[serde(rename = "window-minimize")]
    Minimize,
    #[serde(rename = "window-maximize")]
    MaximizeToggle,
    #[serde(rename = "window-close")]
    Close,
}

impl ControlCommand {
    pub const ALL: [ControlCommand; 3] = [
        ControlCommand::Minimize,
        ControlCommand::MaximizeToggle,
        ControlCommand::Close,
    ];

    /// Event name the UI emits for this command.
    pub fn event_name(self) -> &'static str {
        match self {
            ControlCommand::Minimize => "window-minimize",
            ControlCommand::MaximizeToggle => "window-maximize",
            ControlCommand::Close => "window-close",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown control command `{0}`")]
pub struct UnknownCommand(pub String);

impl FromStr for ControlCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlCommand::ALL
            .into_iter()
            .find(|c| c.event_name() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// UI-side end of the control channel. Cheap to clone into event listeners.
#[derive(Clone, Default)]
pub struct ControlSender {
    inner: Arc<Mutex<Option<mpsc::Sender<ControlCommand>>>>,
}

impl ControlSender {
    /// Returns false if the command was dropped: either the channel is not
    /// established yet or the receiver is gone.
    pub fn send(&self, command: ControlCommand) -> bool {
        match &*self.inner.lock() {
            Some(tx) => tx.send(command).is_ok(),
            None => {
                log::debug!("Dropping {}: control channel not established", command);
                false
            }
        }
    }

    pub fn send_named(&self, name: &str) -> bool {
        match name.parse() {
            Ok(command) => self.send(command),
            Err(e) => {
                log::warn!("{}", e);
                false
            }
        }
    }
}

/// Host-side end. Drained on the event loop.
pub struct ControlReceiver {
    rx: mpsc::Receiver<ControlCommand>,
}

impl ControlReceiver {
    /// Commands queued since the last call, in send order. Never blocks.
    pub fn drain(&self) -> Vec<ControlCommand> {
        self.rx.try_iter().collect()
    }
}

/// In-process, one-way path for window-control commands from UI to host.
#[derive(Default)]
pub struct ControlChannel {
    sender: ControlSender,
}

impl ControlChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> ControlSender {
        self.sender.clone()
    }

    pub fn is_established(&self) -> bool {
        self.sender.inner.lock().is_some()
    }

    /// Start accepting commands. Anything sent earlier was already dropped.
    /// Establishing again replaces the previous receiver.
    pub fn establish(&self) -> ControlReceiver {
        let (tx, rx) = mpsc::channel();
        *self.sender.inner.lock() = Some(tx);
        ControlReceiver { rx }
    }
}
