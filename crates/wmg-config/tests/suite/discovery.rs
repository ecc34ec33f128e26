use std::ffi::OsString;
use std::sync::Mutex;

use tempfile::tempdir;
use wmg_config::{
    discover_config_path, load_config, ConfigError, WmgConfig, WMG_API_KEY_ENV_VAR,
    WMG_CONFIG_ENV_VAR, WMG_MODEL_ENV_VAR,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

struct EnvVarGuard {
    key: &'static str,
    prev: Option<OsString>,
}

impl EnvVarGuard {
    fn set(key: &'static str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        let prev = std::env::var_os(key);
        std::env::set_var(key, value);
        Self { key, prev }
    }

    fn unset(key: &'static str) -> Self {
        let prev = std::env::var_os(key);
        std::env::remove_var(key);
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => std::env::set_var(self.key, v),
            None => std::env::remove_var(self.key),
        }
    }
}

#[test]
fn discovers_wmg_toml_in_working_directory() {
    let _lock = ENV_LOCK.lock().expect("ENV_LOCK mutex poisoned");
    let _env = EnvVarGuard::unset(WMG_CONFIG_ENV_VAR);

    let dir = tempdir().unwrap();
    assert_eq!(discover_config_path(dir.path()), None);

    let config_path = dir.path().join("wmg.toml");
    std::fs::write(&config_path, "[logging]\nlevel = \"debug\"\n").unwrap();
    assert_eq!(discover_config_path(dir.path()), Some(config_path));
}

#[test]
fn env_var_path_wins_over_working_directory_file() {
    let _lock = ENV_LOCK.lock().expect("ENV_LOCK mutex poisoned");

    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("wmg.toml"), "").unwrap();
    let other = dir.path().join("other.toml");
    std::fs::write(&other, "[ai.provider]\nmodel = \"from-env-file\"\n").unwrap();

    let _env = EnvVarGuard::set(WMG_CONFIG_ENV_VAR, &other);
    let _key = EnvVarGuard::unset(WMG_API_KEY_ENV_VAR);
    let _model = EnvVarGuard::unset(WMG_MODEL_ENV_VAR);

    assert_eq!(discover_config_path(dir.path()), Some(other));
    let config = load_config(None, dir.path()).expect("config loads");
    assert_eq!(config.ai.provider.model, "from-env-file");
}

#[test]
fn load_config_applies_api_key_from_environment() {
    let _lock = ENV_LOCK.lock().expect("ENV_LOCK mutex poisoned");
    let _env = EnvVarGuard::unset(WMG_CONFIG_ENV_VAR);
    let _model = EnvVarGuard::unset(WMG_MODEL_ENV_VAR);
    let _key = EnvVarGuard::set(WMG_API_KEY_ENV_VAR, "sk-env-key");

    let dir = tempdir().unwrap();
    let config = load_config(None, dir.path()).expect("defaults load");
    assert_eq!(config.ai.require_api_key().unwrap(), "sk-env-key");
}

#[test]
fn explicit_path_that_does_not_exist_is_an_io_error() {
    let _lock = ENV_LOCK.lock().expect("ENV_LOCK mutex poisoned");
    let _env = EnvVarGuard::unset(WMG_CONFIG_ENV_VAR);

    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let err = load_config(Some(&missing), dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err:?}");
}

#[test]
fn invalid_values_in_file_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wmg.toml");
    std::fs::write(&path, "[ai.provider]\ntimeout_ms = 0\n").unwrap();

    let err = WmgConfig::load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "{err:?}");
}
