use serde::Deserialize;

// --- Top Level Config ---
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct WeaveConfigRaw {
  #[serde(default)]
  pub optimization: OptimizationConfigRaw,
  #[serde(default)]
  pub resolution: ResolutionConfigRaw,
}

// --- Optimizer ---
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct OptimizationConfigRaw {
  /// Defaults to on in debug builds, off in release builds.
  #[serde(default)]
  pub enabled: Option<bool>,
  /// Humantime duration, e.g. `"250ms"`.
  #[serde(default)]
  pub debounce: Option<String>,
  #[serde(default)]
  pub promotion_threshold: Option<u64>,
  #[serde(default)]
  pub domain_hop_threshold: Option<u64>,
}

// --- Resolution ---
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ResolutionConfigRaw {
  /// Humantime duration bounding every resolution that does not pass its
  /// own timeout.
  #[serde(default)]
  pub default_timeout: Option<String>,
}
