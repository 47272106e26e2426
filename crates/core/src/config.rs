use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_REFRESH_HZ: u32 = 60;
pub const DEFAULT_RASTER_WIDTH: u32 = 320;
pub const DEFAULT_SPEECH_LANG: &str = "en-US";
/// Half of a 256-point analysis frame.
pub const DEFAULT_ANALYSER_WINDOW: usize = 128;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;
pub const ENV_REFRESH_HZ: &str = "AFFECTSCOPE_REFRESH_HZ";
pub const ENV_RASTER_WIDTH: &str = "AFFECTSCOPE_RASTER_WIDTH";
pub const ENV_SPEECH_LANG: &str = "AFFECTSCOPE_SPEECH_LANG";

/// Display refresh cadence the sampling loops follow.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshRate {
    pub hz: u32,
}

impl RefreshRate {
    pub fn new(hz: u32) -> Result<Self, ConfigError> {
        if hz == 0 {
            return Err(ConfigError::ZeroRefreshRate);
        }
        Ok(Self { hz })
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.hz))
    }
}

impl Default for RefreshRate {
    fn default() -> Self {
        Self {
            hz: DEFAULT_REFRESH_HZ,
        }
    }
}

/// Fixed width rasters are downsampled to before pixel analysis.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RasterWidth(u32);

impl RasterWidth {
    pub fn new(px: u32) -> Result<Self, ConfigError> {
        if px == 0 {
            return Err(ConfigError::ZeroRasterWidth);
        }
        Ok(Self(px))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for RasterWidth {
    fn default() -> Self {
        Self(DEFAULT_RASTER_WIDTH)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeechLang(String);

impl SpeechLang {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptySpeechLang);
        }
        Ok(Self(v))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SpeechLang {
    fn default() -> Self {
        Self(DEFAULT_SPEECH_LANG.to_owned())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeechSettings {
    pub lang: SpeechLang,
    pub continuous: bool,
    pub interim_results: bool,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            lang: SpeechLang::default(),
            continuous: true,
            interim_results: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    pub refresh: RefreshRate,
    pub raster_width: RasterWidth,
    pub speech: SpeechSettings,
    pub analyser_window: usize,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh: RefreshRate::default(),
            raster_width: RasterWidth::default(),
            speech: SpeechSettings::default(),
            analyser_window: DEFAULT_ANALYSER_WINDOW,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by whatever the environment provides.
    pub fn from_env(env: &impl Env) -> Result<Self, ConfigError> {
        let refresh = RefreshRate::new(resolve_u32(None, ENV_REFRESH_HZ, env, DEFAULT_REFRESH_HZ)?)?;
        let raster_width =
            RasterWidth::new(resolve_u32(None, ENV_RASTER_WIDTH, env, DEFAULT_RASTER_WIDTH)?)?;
        let lang = SpeechLang::new(resolve_string_with_default(
            None,
            ENV_SPEECH_LANG,
            env,
            DEFAULT_SPEECH_LANG,
        ))?;

        Ok(Self {
            refresh,
            raster_width,
            speech: SpeechSettings {
                lang,
                ..SpeechSettings::default()
            },
            ..Self::default()
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("refresh rate must be > 0 Hz")]
    ZeroRefreshRate,
    #[error("raster width must be > 0 px")]
    ZeroRasterWidth,
    #[error("speech language must not be empty")]
    EmptySpeechLang,
    #[error("{key} must be a non-negative integer, got {value:?}")]
    InvalidNumber { key: String, value: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_u32(
    cli_value: Option<u32>,
    env_key: &str,
    env: &impl Env,
    default: u32,
) -> Result<u32, ConfigError> {
    match cli_value {
        Some(v) => Ok(v),
        None => match env.var(env_key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: env_key.to_owned(),
                    value: raw,
                }),
            None => Ok(default),
        },
    }
}
