//! User configuration.
//!
//! Read from `config.toml` in the platform config directory, or from the
//! file given with `--config`. Every problem becomes a warning and the
//! defaults are used instead.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576; // 1 MiB

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Grid file used when none is given on the command line
    pub data_file: PathBuf,
    /// Seconds between change checks
    pub tick_seconds: u64,
    /// Shell that runs each cell with `-c`
    pub shell: String,
    /// Commands allowed to run at once
    pub max_parallel: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_file: PathBuf::from("./shellgrid.csv"),
            tick_seconds: 5,
            shell: "bash".to_string(),
            max_parallel: 8,
        }
    }
}

pub fn load_config(config_file: Option<&PathBuf>) -> (Config, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();
    let config_path = config_file.cloned().or_else(user_config_path);

    let Some(path) = config_path else {
        return (Config::default(), warnings);
    };
    if !path.exists() {
        if config_file.is_some() {
            warnings.push(format!("Config file not found: {}", path.display()));
        }
        return (Config::default(), warnings);
    }

    let mut config = match std::fs::metadata(&path) {
        Ok(meta) if meta.len() > MAX_CONFIG_FILE_BYTES => {
            warnings.push(format!(
                "Refusing to read {}: file too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_CONFIG_FILE_BYTES
            ));
            Config::default()
        }
        Ok(_) => match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warnings.push(format!("Failed to parse {}: {}", path.display(), err));
                    Config::default()
                }
            },
            Err(err) => {
                warnings.push(format!("Failed to read {}: {}", path.display(), err));
                Config::default()
            }
        },
        Err(err) => {
            warnings.push(format!(
                "Failed to read metadata for {}: {}",
                path.display(),
                err
            ));
            Config::default()
        }
    };

    let defaults = Config::default();
    if config.tick_seconds == 0 {
        warnings.push(format!(
            "tick_seconds must be positive, using {}",
            defaults.tick_seconds
        ));
        config.tick_seconds = defaults.tick_seconds;
    }
    if config.max_parallel == 0 {
        warnings.push(format!(
            "max_parallel must be positive, using {}",
            defaults.max_parallel
        ));
        config.max_parallel = defaults.max_parallel;
    }
    if config.shell.trim().is_empty() {
        warnings.push(format!("shell must not be empty, using {}", defaults.shell));
        config.shell = defaults.shell;
    }

    (config, warnings)
}

fn user_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "shellgrid")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}
