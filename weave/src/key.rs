//! Contract identity used as the registry and cache key.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::scope::ScopeId;

/// Identifies a registered contract.
///
/// A key is the `TypeId` of the contract plus an optional registration name,
/// so the same type can be bound several times under different names. The
/// contract's type name is carried along for diagnostics only; equality,
/// hashing and ordering never look at it.
///
/// ```
/// use fibre_weave::TypeKey;
///
/// trait Clock: Send + Sync {}
///
/// assert_eq!(TypeKey::of::<String>(), TypeKey::of::<String>());
/// assert_ne!(TypeKey::of::<String>(), TypeKey::named::<String>("greeting"));
/// assert_ne!(TypeKey::of::<dyn Clock>(), TypeKey::of::<String>());
/// ```
#[derive(Clone)]
pub struct TypeKey {
  type_id: TypeId,
  name: Option<Arc<str>>,
  type_name: &'static str,
}

impl TypeKey {
  /// The key of an unnamed binding for `T`.
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      name: None,
      type_name: std::any::type_name::<T>(),
    }
  }

  /// The key of a binding for `T` registered under `name`.
  pub fn named<T: ?Sized + Any>(name: &str) -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      name: Some(Arc::from(name)),
      type_name: std::any::type_name::<T>(),
    }
  }

  pub(crate) fn with_name<T: ?Sized + Any>(name: Option<&str>) -> Self {
    match name {
      Some(n) => Self::named::<T>(n),
      None => Self::of::<T>(),
    }
  }

  pub fn type_id(&self) -> TypeId {
    self.type_id
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  /// Fully qualified name of the contract type.
  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  /// True when this key identifies a binding of `T` (under any name).
  pub fn is<T: ?Sized + Any>(&self) -> bool {
    self.type_id == TypeId::of::<T>()
  }
}

impl PartialEq for TypeKey {
  fn eq(&self, other: &Self) -> bool {
    self.type_id == other.type_id && self.name == other.name
  }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.type_id.hash(state);
    self.name.hash(state);
  }
}

impl PartialOrd for TypeKey {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for TypeKey {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .type_id
      .cmp(&other.type_id)
      .then_with(|| self.name.cmp(&other.name))
  }
}

impl fmt::Debug for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.name {
      Some(name) => write!(f, "Key({}, Name({}))", self.type_name, name),
      None => write!(f, "Key({})", self.type_name),
    }
  }
}

impl fmt::Display for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.name {
      Some(name) => write!(f, "{}[{}]", self.type_name, name),
      None => f.write_str(self.type_name),
    }
  }
}

/// Key of a materialized instance in the resolution cache.
///
/// Singletons and weak singletons are cached without a context; scoped
/// instances carry the id of the scope they were built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
  pub(crate) key: TypeKey,
  pub(crate) scope: Option<ScopeId>,
}

impl CacheKey {
  pub(crate) fn new(key: TypeKey, scope: Option<ScopeId>) -> Self {
    Self { key, scope }
  }
}
