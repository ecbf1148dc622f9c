//! Typed user configuration and the lock that guards settings edits.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLock, RwLockWriteGuard, TryLockError};

use serde::{Deserialize, Serialize};

use crate::api::client::Endpoint;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub general: GeneralConfig,
    pub api: ApiConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub main_pos: Option<(i32, i32)>,
    pub main_size: (u32, u32),
    pub settings_pos: Option<(i32, i32)>,
    pub settings_size: (u32, u32),
    pub active_theme: Option<String>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            main_pos: None,
            main_size: (391, 252),
            settings_pos: None,
            settings_size: (495, 293),
            active_theme: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub iconify_on_close: bool,
    pub systray_on_start: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            iconify_on_close: true,
            systray_on_start: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// AES-256 key, 32 bytes of UTF-8.
    pub key: Option<String>,
    pub interval_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            key: None,
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ApiConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub ring: String,
    pub open_app: bool,
    pub system: bool,
    pub timeout: bool,
    pub timeout_secs: Option<u32>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            ring: "Bongo".into(),
            open_app: true,
            system: true,
            timeout: false,
            timeout_secs: None,
        }
    }
}

/// Process-wide configuration handle.
///
/// Readers take short snapshots. The settings editor holds a [`SettingsEdit`]
/// for the whole edit, and the poll loop skips ticks while it is held.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> Config {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// `None` while a settings edit is in progress.
    pub fn try_snapshot(&self) -> Option<Config> {
        match self.inner.try_read() {
            Ok(guard) => Some(guard.clone()),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner().clone()),
        }
    }

    pub fn edit(&self) -> SettingsEdit<'_> {
        let guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        SettingsEdit { guard }
    }

    pub fn replace(&self, config: Config) {
        *self.edit() = config;
    }
}

/// Exclusive access to the configuration while settings are being edited.
pub struct SettingsEdit<'a> {
    guard: RwLockWriteGuard<'a, Config>,
}

impl Deref for SettingsEdit<'_> {
    type Target = Config;

    fn deref(&self) -> &Config {
        &self.guard
    }
}

impl DerefMut for SettingsEdit<'_> {
    fn deref_mut(&mut self) -> &mut Config {
        &mut self.guard
    }
}
