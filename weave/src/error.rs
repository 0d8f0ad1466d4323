use std::time::Duration;

use thiserror::Error;

use crate::graph::CyclePath;
use crate::key::TypeKey;

/// Boxed error reported by a factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by resolution. The engine never retries on its own;
/// callers decide whether a failure is fatal.
#[derive(Debug, Error)]
pub enum WeaveError {
  #[error("no registration found for {key}")]
  DependencyNotFound { key: TypeKey },

  #[error("circular dependency detected: {path}")]
  CircularDependency { path: CyclePath },

  #[error("timed out after {timeout:?} waiting to resolve {key}")]
  ResolutionTimeout { key: TypeKey, timeout: Duration },

  #[error("{key} cannot be resolved as {requested}")]
  TypeMismatch {
    key: TypeKey,
    requested: &'static str,
  },

  #[error("factory for {key} failed: {source}")]
  FactoryFailed {
    key: TypeKey,
    #[source]
    source: BoxError,
  },

  /// A failure raised from inside a factory before the engine knows which
  /// key it belongs to. The engine rewrites it into `FactoryFailed`.
  #[error("{0}")]
  Custom(BoxError),
}

impl WeaveError {
  /// Wraps an arbitrary error so a factory can report it with `?`.
  pub fn custom<E>(error: E) -> Self
  where
    E: Into<BoxError>,
  {
    WeaveError::Custom(error.into())
  }

  /// Whether a fallback may stand in for the failed resolution.
  ///
  /// Cycles, timeouts and type mismatches are never papered over.
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self,
      WeaveError::DependencyNotFound { .. }
        | WeaveError::FactoryFailed { .. }
        | WeaveError::Custom(_)
    )
  }

  /// The key named by the error, if any.
  pub fn key(&self) -> Option<&TypeKey> {
    match self {
      WeaveError::DependencyNotFound { key }
      | WeaveError::ResolutionTimeout { key, .. }
      | WeaveError::TypeMismatch { key, .. }
      | WeaveError::FactoryFailed { key, .. } => Some(key),
      WeaveError::CircularDependency { path } => path.first(),
      WeaveError::Custom(_) => None,
    }
  }

  pub(crate) fn attach_key(self, key: &TypeKey) -> Self {
    match self {
      WeaveError::Custom(source) => WeaveError::FactoryFailed {
        key: key.clone(),
        source,
      },
      other => other,
    }
  }
}

/// A specialized `Result` type for `fibre_weave` operations.
pub type Result<T, E = WeaveError> = std::result::Result<T, E>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to read configuration file: {0}")]
  Read(#[from] std::io::Error),

  #[error("Failed to parse configuration: {0}")]
  Parse(String),

  #[error("Invalid configuration value for '{field}': {message}")]
  InvalidValue { field: String, message: String },
}
