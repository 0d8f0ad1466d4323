use std::path::Path;
use std::time::Duration;

use crate::config::raw::WeaveConfigRaw;
use crate::error::ConfigError;
use crate::optimizer::OptimizerSettings;
use crate::stats::{DEFAULT_DEBOUNCE, MAX_DEBOUNCE, MIN_DEBOUNCE};

/// Validated container configuration.
///
/// ```
/// use fibre_weave::config::WeaveConfig;
/// use std::time::Duration;
///
/// let config = WeaveConfig::from_yaml_str(
///   "optimization:\n  enabled: true\n  debounce: 100ms\n  promotion_threshold: 3\n",
/// )
/// .unwrap();
/// assert!(config.optimization_enabled);
/// assert_eq!(config.debounce_interval, Duration::from_millis(100));
/// assert_eq!(config.optimizer.promotion_threshold, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaveConfig {
  pub optimization_enabled: bool,
  pub debounce_interval: Duration,
  pub optimizer: OptimizerSettings,
  pub default_timeout: Option<Duration>,
}

impl Default for WeaveConfig {
  fn default() -> Self {
    Self {
      optimization_enabled: cfg!(debug_assertions),
      debounce_interval: DEFAULT_DEBOUNCE,
      optimizer: OptimizerSettings::default(),
      default_timeout: None,
    }
  }
}

impl WeaveConfig {
  pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
    let raw: WeaveConfigRaw =
      serde_yaml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Self::from_raw(raw)
  }

  pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
    let raw: WeaveConfigRaw =
      serde_json::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Self::from_raw(raw)
  }

  /// Loads a file, parsed as JSON when its extension is `.json` and as YAML
  /// otherwise.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)?;
    let is_json = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
      Self::from_json_str(&source)
    } else {
      Self::from_yaml_str(&source)
    }
  }

  /// Validates the raw form, filling defaults for anything left out.
  pub fn from_raw(raw: WeaveConfigRaw) -> Result<Self, ConfigError> {
    let defaults = Self::default();
    let optimization = raw.optimization;

    let debounce_interval = match optimization.debounce {
      Some(text) => {
        let interval = parse_duration("optimization.debounce", &text)?;
        if interval < MIN_DEBOUNCE || interval > MAX_DEBOUNCE {
          return Err(ConfigError::InvalidValue {
            field: "optimization.debounce".to_string(),
            message: format!(
              "'{}' is outside the allowed range of {:?} to {:?}.",
              text, MIN_DEBOUNCE, MAX_DEBOUNCE
            ),
          });
        }
        interval
      }
      None => defaults.debounce_interval,
    };

    let promotion_threshold = positive(
      "optimization.promotion_threshold",
      optimization.promotion_threshold,
      defaults.optimizer.promotion_threshold,
    )?;
    let domain_hop_threshold = positive(
      "optimization.domain_hop_threshold",
      optimization.domain_hop_threshold,
      defaults.optimizer.domain_hop_threshold,
    )?;

    let default_timeout = match raw.resolution.default_timeout {
      Some(text) => {
        let timeout = parse_duration("resolution.default_timeout", &text)?;
        if timeout.is_zero() {
          return Err(ConfigError::InvalidValue {
            field: "resolution.default_timeout".to_string(),
            message: "Timeout cannot be zero.".to_string(),
          });
        }
        Some(timeout)
      }
      None => None,
    };

    Ok(Self {
      optimization_enabled: optimization.enabled.unwrap_or(defaults.optimization_enabled),
      debounce_interval,
      optimizer: OptimizerSettings {
        promotion_threshold,
        domain_hop_threshold,
      },
      default_timeout,
    })
  }
}

fn parse_duration(field: &str, text: &str) -> Result<Duration, ConfigError> {
  humantime::parse_duration(text).map_err(|e| ConfigError::InvalidValue {
    field: field.to_string(),
    message: format!("'{}' is not a valid duration: {}", text, e),
  })
}

fn positive(field: &str, value: Option<u64>, default: u64) -> Result<u64, ConfigError> {
  match value {
    Some(0) => Err(ConfigError::InvalidValue {
      field: field.to_string(),
      message: "Threshold must be greater than zero.".to_string(),
    }),
    Some(value) => Ok(value),
    None => Ok(default),
  }
}
