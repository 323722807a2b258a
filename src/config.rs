use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, ShellError};
use crate::worker::WorkerLaunch;

pub const DEFAULT_DEV_URL: &str = "http://localhost:5173";
pub const CONFIG_FILE_NAME: &str = "shell.json";

/// Selects where the window loads its content from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    /// Anything other than `production` means development. When the variable is
    /// unset the build profile decides.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("production") => RunMode::Production,
            Some(_) => RunMode::Development,
            None if cfg!(debug_assertions) => RunMode::Development,
            None => RunMode::Production,
        }
    }
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::from_env_value(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadTarget {
    /// Dev server endpoint
    Url(String),
    /// Packaged entry page, relative to the installed frontend assets
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decorations {
    Bordered,
    /// No native chrome; the UI draws its own title bar and controls.
    Frameless,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub label: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub decorations: Decorations,
    pub hidden_title_bar: bool,
    pub background_color: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            label: "main".to_string(),
            title: "ADA".to_string(),
            width: 1920,
            height: 1080,
            decorations: Decorations::Frameless,
            hidden_title_bar: true,
            background_color: "#000000".to_string(),
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ShellError::Config(format!(
                "window dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if parse_hex_color(&self.background_color).is_none() {
            return Err(ShellError::Config(format!(
                "invalid background color `{}`",
                self.background_color
            )));
        }
        Ok(())
    }

    pub fn background_rgba(&self) -> (u8, u8, u8, u8) {
        parse_hex_color(&self.background_color).unwrap_or((0, 0, 0, 255))
    }
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(value: &str) -> Option<(u8, u8, u8, u8)> {
    let hex = value.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => {
            let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
            Some((nibble(0)?, nibble(1)?, nibble(2)?, 255))
        }
        6 => Some((byte(0)?, byte(2)?, byte(4)?, 255)),
        8 => Some((byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Resolved from PATH at spawn time
    pub executable: String,
    pub script: PathBuf,
    /// Defaults to the script's parent directory
    pub working_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            executable: "python".to_string(),
            script: PathBuf::from("backend").join("server.py"),
            working_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Resolve relative paths against the installation directory. The script
    /// path handed to the worker is always absolute.
    pub fn launch(&self, base_dir: &Path) -> WorkerLaunch {
        let base_dir = &absolute_dir(base_dir);
        let script = if self.script.is_absolute() {
            self.script.clone()
        } else {
            base_dir.join(&self.script)
        };
        let working_dir = match &self.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base_dir.join(dir),
            None => script
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| base_dir.to_path_buf()),
        };
        WorkerLaunch {
            executable: self.executable.clone(),
            script,
            working_dir,
        }
    }
}

fn absolute_dir(dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        return dir.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(dir),
        Err(e) => {
            log::warn!("Cannot resolve {} against working directory: {}", dir.display(), e);
            dir.to_path_buf()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub mode: RunMode,
    pub window: WindowConfig,
    pub worker: WorkerConfig,
    pub dev_url: String,
    pub entry: PathBuf,
    pub quit_on_windows_closed: bool,
    /// 0 means fire-and-forget termination
    pub shutdown_grace_ms: u64,
    pub open_devtools: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            window: WindowConfig::default(),
            worker: WorkerConfig::default(),
            dev_url: DEFAULT_DEV_URL.to_string(),
            entry: PathBuf::from("index.html"),
            // macOS apps stay alive without windows
            quit_on_windows_closed: !cfg!(target_os = "macos"),
            shutdown_grace_ms: 0,
            open_devtools: true,
        }
    }
}

impl ShellConfig {
    /// Defaults, then `shell.json` in `dir` if present, then environment overrides.
    /// A malformed file is logged and skipped.
    pub fn load(dir: Option<&Path>) -> Self {
        let mut config = match dir.map(|d| d.join(CONFIG_FILE_NAME)) {
            Some(path) if path.exists() => match Self::from_file(&path) {
                Ok(config) => {
                    log::info!("Loaded shell config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::error!("Ignoring {}: {}", path.display(), e);
                    Self::default()
                }
            },
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.window.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("ADA_ENV") {
            self.mode = RunMode::from_env_value(Some(&mode));
        }
        if let Some(executable) = lookup("ADA_WORKER_EXECUTABLE") {
            self.worker.executable = executable;
        }
        if let Some(script) = lookup("ADA_WORKER_SCRIPT") {
            self.worker.script = PathBuf::from(script);
        }
        if let Some(url) = lookup("ADA_DEV_URL") {
            self.dev_url = url;
        }
        if let Some(flag) = lookup("ADA_QUIT_ON_WINDOWS_CLOSED") {
            match parse_flag(&flag) {
                Some(value) => self.quit_on_windows_closed = value,
                None => log::warn!("Ignoring ADA_QUIT_ON_WINDOWS_CLOSED={}", flag),
            }
        }
    }

    /// Inspector is wanted only while pointing at the dev server.
    pub fn devtools_enabled(&self) -> bool {
        self.open_devtools && self.mode == RunMode::Development
    }

    pub fn load_target(&self) -> LoadTarget {
        match self.mode {
            RunMode::Development => LoadTarget::Url(self.dev_url.clone()),
            RunMode::Production => LoadTarget::File(self.entry.clone()),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
