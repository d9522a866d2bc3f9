//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::ConfigError;
use crate::groups::{ERRORS_DIR, is_valid_folder};

/// Host configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Root of the per-tenant mailbox tree.
    pub ipc_dir: PathBuf,
    /// libSQL database file holding tasks and group registrations.
    pub db_path: PathBuf,
    /// Folder name of the privileged main tenant.
    pub main_folder: String,
    /// Delay between the end of one poll cycle and the start of the next.
    pub poll_interval: Duration,
    /// Upper bound on any single external dispatch (send, sync, action).
    pub dispatch_timeout: Duration,
    /// Timezone cron schedules and naive `once` timestamps are evaluated in.
    pub timezone: Tz,
    /// Display name prefixed to relayed messages.
    pub assistant_name: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            ipc_dir: data_dir.join("ipc"),
            db_path: data_dir.join("ipc-host.db"),
            main_folder: "main".to_string(),
            poll_interval: Duration::from_millis(1000),
            dispatch_timeout: Duration::from_secs(30),
            timezone: chrono_tz::UTC,
            assistant_name: "Andy".to_string(),
        }
    }
}

impl HostConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (env in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let data_dir = lookup("IPC_HOST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        let ipc_dir = lookup("IPC_HOST_IPC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("ipc"));

        let db_path = lookup("IPC_HOST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("ipc-host.db"));

        let main_folder = lookup("IPC_HOST_MAIN_FOLDER").unwrap_or(defaults.main_folder);
        if !is_valid_folder(&main_folder) || main_folder == ERRORS_DIR {
            return Err(ConfigError::InvalidValue {
                key: "IPC_HOST_MAIN_FOLDER".to_string(),
                message: format!("'{main_folder}' is not a usable folder name"),
            });
        }

        let poll_interval = match lookup("IPC_HOST_POLL_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(parse_positive("IPC_HOST_POLL_INTERVAL_MS", &raw)?),
            None => defaults.poll_interval,
        };

        let dispatch_timeout = match lookup("IPC_HOST_DISPATCH_TIMEOUT_SECS") {
            Some(raw) => {
                Duration::from_secs(parse_positive("IPC_HOST_DISPATCH_TIMEOUT_SECS", &raw)?)
            }
            None => defaults.dispatch_timeout,
        };

        let timezone = match lookup("IPC_HOST_TIMEZONE").or_else(|| lookup("TZ")) {
            Some(name) => name.parse::<Tz>().map_err(|e| ConfigError::InvalidValue {
                key: "IPC_HOST_TIMEZONE".to_string(),
                message: format!("'{name}': {e}"),
            })?,
            None => defaults.timezone,
        };

        let assistant_name = lookup("ASSISTANT_NAME").unwrap_or(defaults.assistant_name);

        Ok(Self {
            ipc_dir,
            db_path,
            main_folder,
            poll_interval,
            dispatch_timeout,
            timezone,
            assistant_name,
        })
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a positive integer, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = HostConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.main_folder, "main");
        assert_eq!(config.ipc_dir, PathBuf::from("./data/ipc"));
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.timezone, chrono_tz::UTC);
    }

    #[test]
    fn data_dir_drives_derived_paths() {
        let config = HostConfig::from_lookup(lookup_from(&[("IPC_HOST_DATA_DIR", "/srv/host")]))
            .unwrap();
        assert_eq!(config.ipc_dir, PathBuf::from("/srv/host/ipc"));
        assert_eq!(config.db_path, PathBuf::from("/srv/host/ipc-host.db"));
    }

    #[test]
    fn timezone_parsed_from_tz() {
        let config =
            HostConfig::from_lookup(lookup_from(&[("TZ", "Europe/Berlin")])).unwrap();
        assert_eq!(config.timezone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn bad_timezone_rejected() {
        let err = HostConfig::from_lookup(lookup_from(&[("TZ", "Mars/Olympus")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let result =
            HostConfig::from_lookup(lookup_from(&[("IPC_HOST_POLL_INTERVAL_MS", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn errors_cannot_be_main_folder() {
        let result = HostConfig::from_lookup(lookup_from(&[("IPC_HOST_MAIN_FOLDER", "errors")]));
        assert!(result.is_err());
    }
}
