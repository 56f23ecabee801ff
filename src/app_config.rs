//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use gridstage_core::transfer::DEFAULT_CHECKSUM_ALGORITHM;
use gridstage_core::{DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY};

/// Default pin lifetime in seconds.
pub const DEFAULT_PIN_LIFETIME_SECS: u64 = 600;
/// Default bring-online timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
/// Default stream count for copies.
pub const DEFAULT_NBSTREAMS: u32 = 1;

/// `key = value` file configuration for gridstage defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Default pin lifetime in seconds.
    pub pin_lifetime: Option<u64>,
    /// Default bring-online timeout in seconds.
    pub timeout: Option<u64>,
    /// First delay of the `--poll` loop, in seconds.
    pub poll_initial_delay_secs: Option<u64>,
    /// Ceiling of the `--poll` delay, in seconds.
    pub poll_max_delay_secs: Option<u64>,
    /// Default number of streams for copies.
    pub nbstreams: Option<u32>,
    /// Default checksum algorithm for `copy -K`.
    pub checksum_algorithm: Option<String>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_range("pin_lifetime", self.pin_lifetime, 1, 604_800)?;
        validate_range("timeout", self.timeout, 1, 86_400)?;
        validate_range(
            "poll_initial_delay_secs",
            self.poll_initial_delay_secs,
            1,
            3600,
        )?;
        validate_range("poll_max_delay_secs", self.poll_max_delay_secs, 1, 86_400)?;
        validate_range("nbstreams", self.nbstreams.map(u64::from), 1, 64)?;

        if let (Some(initial), Some(max)) = (self.poll_initial_delay_secs, self.poll_max_delay_secs)
            && initial > max
        {
            bail!(
                "Invalid config: `poll_initial_delay_secs` ({initial}) exceeds `poll_max_delay_secs` ({max})"
            );
        }
        if let Some(algorithm) = &self.checksum_algorithm
            && algorithm.is_empty()
        {
            bail!("Invalid config value for `checksum_algorithm`: empty string");
        }
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log level used when neither `RUST_LOG` nor `-v`/`-q` is given.
    #[must_use]
    pub fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/gridstage/config.toml`
/// 2. `$HOME/.config/gridstage/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("gridstage")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("gridstage")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "pin_lifetime" => {
                cfg.pin_lifetime = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "timeout" => {
                cfg.timeout = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "poll_initial_delay_secs" => {
                cfg.poll_initial_delay_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "poll_max_delay_secs" => {
                cfg.poll_max_delay_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "nbstreams" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("nbstreams out of range for u32"))?;
                cfg.nbstreams = Some(n);
            }
            "checksum_algorithm" => {
                cfg.checksum_algorithm = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!(
                        "Invalid `verbosity` value '{}' on line {}",
                        parsed,
                        line_index + 1
                    )
                })?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

/// Settings after applying CLI > file > built-in precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub pin_lifetime: Duration,
    pub timeout: Duration,
    pub poll_initial_delay: Duration,
    pub poll_max_delay: Duration,
    pub nbstreams: u32,
    pub checksum_algorithm: String,
    pub verbosity: VerbositySetting,
}

impl Settings {
    /// Built-in defaults overlaid with the file config, if any.
    #[must_use]
    pub fn from_file(file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();
        Self {
            pin_lifetime: Duration::from_secs(
                file.pin_lifetime.unwrap_or(DEFAULT_PIN_LIFETIME_SECS),
            ),
            timeout: Duration::from_secs(file.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            poll_initial_delay: file
                .poll_initial_delay_secs
                .map_or(DEFAULT_INITIAL_DELAY, Duration::from_secs),
            poll_max_delay: file
                .poll_max_delay_secs
                .map_or(DEFAULT_MAX_DELAY, Duration::from_secs),
            nbstreams: file.nbstreams.unwrap_or(DEFAULT_NBSTREAMS),
            checksum_algorithm: file
                .checksum_algorithm
                .unwrap_or_else(|| DEFAULT_CHECKSUM_ALGORITHM.to_string()),
            verbosity: file.verbosity.unwrap_or(VerbositySetting::Default),
        }
    }
}
