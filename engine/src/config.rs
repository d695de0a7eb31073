use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, eyre},
};
use serde::{Deserialize, Serialize};

use crate::polling::{Cadence, TaskFamily};

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";
pub const API_KEY_VAR: &str = "DASHSCOPE_API_KEY";
const CONFIG_FILE: &str = "bailian.ron";

/// Settings kept in `bailian.ron` in the local config dir. Every field is
/// optional in the file; missing ones fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub short_tasks: PollSettings,
    pub long_tasks: PollSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub max_wait_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            short_tasks: Cadence::SHORT.into(),
            long_tasks: Cadence::LONG.into(),
        }
    }
}

impl Config {
    /// A zero interval would poll the API nonstop.
    pub fn validate(&self) -> Result<()> {
        for (name, settings) in [
            ("short_tasks", self.short_tasks),
            ("long_tasks", self.long_tasks),
        ] {
            if settings.interval_secs == 0 {
                return Err(eyre!("{name}.interval_secs must be at least 1"));
            }
        }
        Ok(())
    }

    pub fn cadence(&self, family: TaskFamily) -> Cadence {
        match family {
            TaskFamily::Short => self.short_tasks.into(),
            TaskFamily::Long => self.long_tasks.into(),
        }
    }
}

impl From<PollSettings> for Cadence {
    fn from(s: PollSettings) -> Self {
        Cadence::new(
            Duration::from_secs(s.interval_secs),
            Duration::from_secs(s.max_wait_secs),
        )
    }
}

impl From<Cadence> for PollSettings {
    fn from(c: Cadence) -> Self {
        Self {
            interval_secs: c.interval.as_secs(),
            max_wait_secs: c.max_wait.as_secs(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(dirs::config_local_dir()
        .ok_or(eyre!("Couldn't get config dir"))?
        .join(CONFIG_FILE))
}

/// Loads the config file if there is one.
pub fn load_config() -> Result<Option<Config>> {
    let path = config_path()?;
    if !path.exists() {
        Ok(None)
    } else {
        load_config_file(&path).map(Some)
    }
}

pub fn load_config_file(path: &Path) -> Result<Config> {
    let src = fs::read_to_string(path)?;
    let config: Config =
        ron::from_str(&src).wrap_err_with(|| format!("Invalid config file {}", path.display()))?;
    config
        .validate()
        .wrap_err_with(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}

pub fn save_config_file(path: &Path, config: &Config) -> Result<()> {
    let src = ron::ser::to_string_pretty(config, ron::ser::PrettyConfig::default())?;
    Ok(fs::write(path, src)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "(long_tasks: (interval_secs: 10, max_wait_secs: 1200))").unwrap();

        let config = load_config_file(&path).unwrap();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.cadence(TaskFamily::Short), Cadence::SHORT);
        assert_eq!(
            config.cadence(TaskFamily::Long),
            Cadence::new(Duration::from_secs(10), Duration::from_secs(1200))
        );
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = Config {
            base_url: "http://localhost:8080/api/v1".into(),
            ..Default::default()
        };

        save_config_file(&path, &config).unwrap();

        assert_eq!(load_config_file(&path).unwrap(), config);
    }

    #[test]
    fn zero_interval_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "(short_tasks: (interval_secs: 0, max_wait_secs: 300))").unwrap();

        let err = load_config_file(&path).unwrap_err();

        assert!(format!("{err}").starts_with("Invalid config file"));
        assert!(
            err.chain()
                .any(|cause| cause.to_string() == "short_tasks.interval_secs must be at least 1")
        );
    }

    #[test]
    fn garbage_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "not ron at all {").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(format!("{err}").starts_with("Invalid config file"));
    }
}
