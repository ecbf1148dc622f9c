use std::ffi::OsString;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;

use crate::config::Config;
use crate::logging::{Level, LogSink};

const APP_DIR: &str = "rmSMS";
const CONFIG_FILE: &str = "rmSMS.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("config file is corrupt: {0}")]
    Corrupt(String),

    #[error("unable to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTarget {
    Primary,
    Backup,
}

/// Config file location: `$RMSMS_CONFIG`, else the user's config dir.
pub fn default_config_path() -> Option<PathBuf> {
    config_path_from_lookup(|key| std::env::var(key).ok())
}

fn config_path_from_lookup<F>(mut lookup: F) -> Option<PathBuf>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(path) = lookup("RMSMS_CONFIG").filter(|v| !v.trim().is_empty()) {
        return Some(PathBuf::from(path.trim()));
    }
    let base = BaseDirs::new()?;
    Some(base.config_dir().join(APP_DIR).join(CONFIG_FILE))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// On-disk configuration with a last-known-good backup and a quarantine slot.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    backup: PathBuf,
    corrupt: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            backup: with_suffix(&path, ".bck"),
            corrupt: with_suffix(&path, ".corrupt"),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub fn corrupt_path(&self) -> &Path {
        &self.corrupt
    }

    /// First run: write `defaults` when there is no primary file yet.
    pub fn ensure_exists<S: LogSink + ?Sized>(&self, defaults: &Config, sink: &S) {
        if !self.path.is_file() {
            let _ = self.save(defaults, SaveTarget::Primary, sink);
        }
    }

    /// Load the configuration, falling back to the backup and then to defaults.
    ///
    /// Always leaves a backup of the returned configuration on disk.
    pub fn load<S: LogSink + ?Sized>(&self, sink: &S) -> Config {
        let config = match read_config(&self.path) {
            Ok(config) => config,
            Err(ConfigError::Corrupt(_)) => {
                sink.log(
                    &format!(
                        "Configuration file {} is corrupt. \
                         Will attempt to load backup configuration.",
                        self.path.display()
                    ),
                    Level::Error,
                    None,
                );
                self.recover_from_backup(sink)
            }
            Err(err) => {
                sink.log(
                    &format!(
                        "Unable to parse Configuration file {}. \
                         Will use default configuration. Error trace:\n{err}",
                        self.path.display()
                    ),
                    Level::Error,
                    None,
                );
                Config::default()
            }
        };
        let _ = self.save(&config, SaveTarget::Backup, sink);
        config
    }

    fn recover_from_backup<S: LogSink + ?Sized>(&self, sink: &S) -> Config {
        if !self.backup.is_file() {
            sink.log(
                &format!(
                    "Backup configuration file {} not detected. Will use default configuration.",
                    self.backup.display()
                ),
                Level::Error,
                None,
            );
            return Config::default();
        }
        let config = match read_config(&self.backup) {
            Ok(config) => config,
            Err(err) => {
                sink.log(
                    &format!(
                        "Backup configuration file {} is corrupt. \
                         Will use default configuration. Error trace:\n{err}",
                        self.backup.display()
                    ),
                    Level::Error,
                    None,
                );
                return Config::default();
            }
        };
        sink.log(
            &format!(
                "Backup configuration file loaded successfully. Renamed old configuration to {}.",
                self.corrupt.display()
            ),
            Level::Warning,
            None,
        );
        if let Err(err) = self.quarantine() {
            sink.log(
                &format!(
                    "Unable to restore configuration file {} from backup. Error trace:\n{err}",
                    self.path.display()
                ),
                Level::Error,
                None,
            );
        }
        config
    }

    fn quarantine(&self) -> io::Result<()> {
        match fs::remove_file(&self.corrupt) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        fs::rename(&self.path, &self.corrupt)?;
        fs::copy(&self.backup, &self.path)?;
        Ok(())
    }

    /// Write `config` to the primary or backup file via a temp file + rename.
    ///
    /// Failures are logged here; callers may ignore the result.
    pub fn save<S: LogSink + ?Sized>(
        &self,
        config: &Config,
        target: SaveTarget,
        sink: &S,
    ) -> Result<(), ConfigError> {
        let path = match target {
            SaveTarget::Primary => &self.path,
            SaveTarget::Backup => &self.backup,
        };
        let res = write_config(path, config);
        if let Err(err) = &res {
            let msg = match err {
                ConfigError::Io(e) if e.kind() == ErrorKind::PermissionDenied => format!(
                    "Access Denied - Unable to save configuration file {}.",
                    path.display()
                ),
                other => format!(
                    "Unable to save configuration file {}. Error trace:\n{other}",
                    path.display()
                ),
            };
            sink.log(&msg, Level::Error, None);
        }
        res
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|e| ConfigError::Corrupt(e.to_string()))?;
    toml::from_str::<Config>(&text).map_err(|e| ConfigError::Corrupt(e.to_string()))
}

fn write_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(config)?;
    let tmp = with_suffix(path, ".tmp");
    fs::write(&tmp, text)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::testing::RecordingSink;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("rmSMS.toml"))
    }

    fn custom_config() -> Config {
        let mut cfg = Config::default();
        cfg.api.url = "https://sms.example.org/feed".into();
        cfg.api.username = "alice".into();
        cfg.api.interval_ms = 10_000;
        cfg.window.main_pos = Some((10, 20));
        cfg
    }

    #[test]
    fn derives_sibling_paths() {
        let store = ConfigStore::new("/tmp/x/rmSMS.toml");
        assert_eq!(store.backup_path(), Path::new("/tmp/x/rmSMS.toml.bck"));
        assert_eq!(store.corrupt_path(), Path::new("/tmp/x/rmSMS.toml.corrupt"));
    }

    #[test]
    fn save_then_load_round_trips_and_writes_backup() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let sink = RecordingSink::default();

        store.save(&custom_config(), SaveTarget::Primary, &sink).unwrap();
        let loaded = store.load(&sink);

        assert_eq!(loaded, custom_config());
        assert_eq!(read_config(store.backup_path()).unwrap(), custom_config());
        assert!(sink.is_empty());
    }

    #[test]
    fn ensure_exists_writes_defaults_only_once() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let sink = RecordingSink::default();

        store.ensure_exists(&Config::default(), &sink);
        assert_eq!(read_config(store.path()).unwrap(), Config::default());

        store.save(&custom_config(), SaveTarget::Primary, &sink).unwrap();
        store.ensure_exists(&Config::default(), &sink);
        assert_eq!(read_config(store.path()).unwrap(), custom_config());
    }

    #[test]
    fn corrupt_primary_recovers_from_backup_and_quarantines() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let sink = RecordingSink::default();

        store.save(&custom_config(), SaveTarget::Backup, &sink).unwrap();
        fs::write(store.path(), "this is [[ not toml").unwrap();

        let loaded = store.load(&sink);

        assert_eq!(loaded, custom_config());
        assert_eq!(
            fs::read_to_string(store.corrupt_path()).unwrap(),
            "this is [[ not toml"
        );
        assert_eq!(read_config(store.path()).unwrap(), custom_config());
        assert_eq!(read_config(store.backup_path()).unwrap(), custom_config());
        assert_eq!(sink.levels(), vec![Level::Error, Level::Warning]);
    }

    #[test]
    fn non_utf8_primary_counts_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let sink = RecordingSink::default();

        store.save(&custom_config(), SaveTarget::Backup, &sink).unwrap();
        fs::write(store.path(), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        assert_eq!(store.load(&sink), custom_config());
        assert!(store.corrupt_path().is_file());
    }

    #[test]
    fn both_corrupt_falls_back_to_defaults_with_fresh_backup() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let sink = RecordingSink::default();

        fs::write(store.path(), "garbage = [").unwrap();
        fs::write(store.backup_path(), "more garbage = {").unwrap();

        let loaded = store.load(&sink);

        assert_eq!(loaded, Config::default());
        assert_eq!(read_config(store.backup_path()).unwrap(), Config::default());
        assert!(!store.corrupt_path().exists());
        assert_eq!(sink.levels(), vec![Level::Error, Level::Error]);
    }

    #[test]
    fn corrupt_primary_without_backup_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let sink = RecordingSink::default();

        fs::write(store.path(), "garbage = [").unwrap();

        assert_eq!(store.load(&sink), Config::default());
        assert!(store.backup_path().is_file());
        assert!(sink.messages()[1].contains("not detected"));
    }

    #[test]
    fn missing_primary_logs_and_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let sink = RecordingSink::default();

        assert_eq!(store.load(&sink), Config::default());
        assert_eq!(sink.levels(), vec![Level::Error]);
        assert!(sink.messages()[0].starts_with("Unable to parse Configuration file"));
        assert!(store.backup_path().is_file());
    }

    #[test]
    fn failed_save_is_logged_not_raised() {
        let dir = TempDir::new().unwrap();
        // Parent "directory" is a regular file, so every write fails.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let store = ConfigStore::new(blocker.join("rmSMS.toml"));
        let sink = RecordingSink::default();

        assert!(store.save(&Config::default(), SaveTarget::Primary, &sink).is_err());
        assert_eq!(sink.levels(), vec![Level::Error]);
    }

    #[test]
    fn env_override_wins_for_config_path() {
        let path = config_path_from_lookup(|key| {
            (key == "RMSMS_CONFIG").then(|| "/srv/rmsms.toml".to_string())
        });
        assert_eq!(path, Some(PathBuf::from("/srv/rmsms.toml")));
    }
}
