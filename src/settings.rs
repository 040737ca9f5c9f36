use crate::logging::SETTINGS_NAMESPACE;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

const SETTINGS_ENV: &str = "DESKTOP_CLOCK_SETTINGS";
const SETTINGS_DIR: &str = "desktop-clock";
const SETTINGS_FILE: &str = "settings.yml";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Settings document is not a mapping")]
    NotAMapping,
}

/// An opaque RGB colour as stored in the settings file (`"#rrggbb"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    pub fn parse_hex(text: &str) -> Option<Self> {
        let hex = text.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A type that can be read from and written to a raw settings value.
pub trait SettingValue: Sized {
    /// Converts a stored value, or `None` when it has the wrong shape.
    fn coerce(raw: &Value) -> Option<Self>;

    fn to_raw(&self) -> Value;
}

impl SettingValue for bool {
    fn coerce(raw: &Value) -> Option<Self> {
        match raw {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn to_raw(&self) -> Value {
        Value::Bool(*self)
    }
}

impl SettingValue for i64 {
    fn coerce(raw: &Value) -> Option<Self> {
        match raw {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn to_raw(&self) -> Value {
        Value::Number((*self).into())
    }
}

impl SettingValue for String {
    fn coerce(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn to_raw(&self) -> Value {
        Value::String(self.clone())
    }
}

impl SettingValue for Rgb {
    fn coerce(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(s) => Rgb::parse_hex(s),
            Value::Sequence(_) => serde_yaml::from_value::<[u8; 3]>(raw.clone())
                .ok()
                .map(|[r, g, b]| Rgb::new(r, g, b)),
            Value::Mapping(_) => serde_yaml::from_value(raw.clone()).ok(),
            _ => None,
        }
    }

    fn to_raw(&self) -> Value {
        Value::String(self.to_hex())
    }
}

/// A settings key bound to the type its value must coerce to.
pub struct SettingKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> SettingKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for SettingKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SettingKey<T> {}

/// The key schema shared by the clock and its settings collaborators.
pub mod keys {
    use super::{Rgb, SettingKey};

    pub const FONT_FAMILY: SettingKey<String> = SettingKey::new("font_family");
    pub const BASE_SIZE: SettingKey<i64> = SettingKey::new("base_size");
    pub const FONT_OPACITY: SettingKey<i64> = SettingKey::new("font_opacity");
    pub const CUSTOM_COLOR: SettingKey<Rgb> = SettingKey::new("custom_color");
    pub const THEME: SettingKey<String> = SettingKey::new("theme");
    pub const SHOW_DATE: SettingKey<bool> = SettingKey::new("show_date");
    pub const SHOW_WEEK: SettingKey<bool> = SettingKey::new("show_week");
    pub const SHOW_SECONDS: SettingKey<bool> = SettingKey::new("show_seconds");
    pub const FIXED_POS: SettingKey<bool> = SettingKey::new("fixed_pos");
    pub const STAY_ON_TOP: SettingKey<bool> = SettingKey::new("stay_on_top");
    pub const COUNTDOWN_MINUTES: SettingKey<i64> = SettingKey::new("countdown_minutes");
    pub const POS_X: SettingKey<i64> = SettingKey::new("pos_x");
    pub const POS_Y: SettingKey<i64> = SettingKey::new("pos_y");
    pub const CLOCK_VISIBLE: SettingKey<bool> = SettingKey::new("clock_visible");
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, Value>,
}

impl SettingsStore {
    /// A store with no backing file; it never yields a snapshot.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: BTreeMap::new(),
        }
    }

    /// `$DESKTOP_CLOCK_SETTINGS`, else `<config dir>/desktop-clock/settings.yml`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(SETTINGS_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SETTINGS_DIR)
            .join(SETTINGS_FILE)
    }

    /// Opens the store at `path`. A missing file is an empty store; an
    /// unreadable or corrupt one is logged and also treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(store) => store,
            Err(e) => {
                warn!(target: SETTINGS_NAMESPACE, "{e}; falling back to defaults");
                Self {
                    path: Some(path),
                    values: BTreeMap::new(),
                }
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let values = match std::fs::read_to_string(path) {
            Ok(text) => parse_document(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: SETTINGS_NAMESPACE, "No settings file at {}", path.display());
                BTreeMap::new()
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        debug!(target: SETTINGS_NAMESPACE, "Loaded {} settings from {}", values.len(), path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
            values,
        })
    }

    #[cfg(test)]
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SettingsError> {
        Ok(Self {
            path: None,
            values: parse_document(yaml)?,
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the stored value for `key`, or `default` when the key is
    /// absent or its value does not coerce to `T`.
    pub fn get<T: SettingValue>(&self, key: SettingKey<T>, default: T) -> T {
        let Some(raw) = self.values.get(key.name()) else {
            return default;
        };
        match T::coerce(raw) {
            Some(value) => value,
            None => {
                warn!(
                    target: SETTINGS_NAMESPACE,
                    "Setting '{}' has unusable value {:?}; using default",
                    key.name(),
                    raw
                );
                default
            }
        }
    }

    pub fn set<T: SettingValue>(&mut self, key: SettingKey<T>, value: T) {
        self.values.insert(key.name().to_string(), value.to_raw());
    }

    pub fn to_yaml(&self) -> Result<String, SettingsError> {
        Ok(serde_yaml::to_string(&self.values)?)
    }

    /// Serialises the current values for a deferred write.
    pub fn snapshot(&self) -> Result<Option<SettingsSnapshot>, SettingsError> {
        let Some(path) = self.path.clone() else {
            return Ok(None);
        };
        Ok(Some(SettingsSnapshot {
            path,
            yaml: self.to_yaml()?,
        }))
    }

    /// Writes the store to its backing file, blocking.
    #[cfg(test)]
    pub fn sync(&self) -> Result<(), SettingsError> {
        let Some(snapshot) = self.snapshot()? else {
            return Ok(());
        };
        snapshot.write_blocking()
    }
}

fn parse_document(text: &str) -> Result<BTreeMap<String, Value>, SettingsError> {
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    match serde_yaml::from_str::<Value>(text)? {
        Value::Null => Ok(BTreeMap::new()),
        Value::Mapping(mapping) => Ok(mapping
            .into_iter()
            .filter_map(|(k, v)| match k {
                Value::String(name) => Some((name, v)),
                other => {
                    warn!(target: SETTINGS_NAMESPACE, "Ignoring non-string settings key {:?}", other);
                    None
                }
            })
            .collect()),
        _ => Err(SettingsError::NotAMapping),
    }
}

/// Serialised settings waiting to be written to disk.
///
/// Writes go to a sibling `.tmp` file which is then renamed over the
/// settings file, so an interrupted write never leaves a truncated file.
pub struct SettingsSnapshot {
    path: PathBuf,
    yaml: String,
}

impl SettingsSnapshot {
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(SETTINGS_FILE));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    pub fn write_blocking(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| self.write_error(source))?;
        }
        let staging = self.staging_path();
        std::fs::write(&staging, &self.yaml).map_err(|source| self.write_error(source))?;
        std::fs::rename(&staging, &self.path).map_err(|source| self.write_error(source))?;
        debug!(target: SETTINGS_NAMESPACE, "Settings flushed to {}", self.path.display());
        Ok(())
    }

    pub async fn write(self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.write_error(source))?;
        }
        let staging = self.staging_path();
        tokio::fs::write(&staging, &self.yaml)
            .await
            .map_err(|source| self.write_error(source))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|source| self.write_error(source))?;
        debug!(target: SETTINGS_NAMESPACE, "Settings flushed to {}", self.path.display());
        Ok(())
    }

    fn write_error(&self, source: std::io::Error) -> SettingsError {
        SettingsError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

/// Writes snapshots one at a time on a background task. Snapshots queued
/// while a write is in flight collapse into the newest one.
pub struct SettingsWriter {
    queue: mpsc::UnboundedSender<SettingsSnapshot>,
    finished: std_mpsc::Receiver<()>,
}

impl SettingsWriter {
    pub fn spawn(runtime: &Handle) -> Self {
        let (queue, pending) = mpsc::unbounded_channel();
        let (done, finished) = std_mpsc::channel();
        runtime.spawn(async move {
            drain_queue(pending).await;
            let _ = done.send(());
        });
        Self { queue, finished }
    }

    pub fn submit(&self, snapshot: SettingsSnapshot) {
        if self.queue.send(snapshot).is_err() {
            warn!(target: SETTINGS_NAMESPACE, "Settings writer has stopped; dropping snapshot");
        }
    }

    /// Queues `last`, closes the queue and blocks until everything queued is
    /// on disk. Returns false if the writer did not finish within `timeout`.
    pub fn finish(self, last: Option<SettingsSnapshot>, timeout: Duration) -> bool {
        if let Some(snapshot) = last {
            self.submit(snapshot);
        }
        let Self { queue, finished } = self;
        drop(queue);
        finished.recv_timeout(timeout).is_ok()
    }
}

async fn drain_queue(mut pending: mpsc::UnboundedReceiver<SettingsSnapshot>) {
    while let Some(mut snapshot) = pending.recv().await {
        while let Ok(newer) = pending.try_recv() {
            snapshot = newer;
        }
        if let Err(e) = snapshot.write().await {
            warn!(target: SETTINGS_NAMESPACE, "Could not save settings: {}", e);
        }
    }
    debug!(target: SETTINGS_NAMESPACE, "Settings writer stopped");
}
