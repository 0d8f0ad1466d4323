//! Lifecycle scopes and scope contexts.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::container::{Container, ResolveOptions};
use crate::error::Result;

/// Identifier of a scope context (a request, a session, a unit of work).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(Arc<str>);

impl ScopeId {
  pub fn new(id: impl AsRef<str>) -> Self {
    Self(Arc::from(id.as_ref()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for ScopeId {
  fn from(id: &str) -> Self {
    Self::new(id)
  }
}

impl From<String> for ScopeId {
  fn from(id: String) -> Self {
    Self(Arc::from(id))
  }
}

impl fmt::Debug for ScopeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ScopeId({})", self.0)
  }
}

impl fmt::Display for ScopeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Lifecycle policy of a registration. Decides whether, and under which
/// cache key, a constructed instance is kept.
///
/// | Scope | Cached under | Factory runs |
/// |---|---|---|
/// | `Transient` | nothing | on every resolve |
/// | `Singleton` | key | at most once, until released |
/// | `WeakSingleton` | key (weakly) | again once every caller dropped the instance |
/// | `Scoped(id)` | key + scope id | once per scope id, until the scope ends |
///
/// A `Scoped` registration carries a default scope id; callers can resolve
/// it under any other id with [`Container::resolve_in_scope`] or through a
/// [`ScopeHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKind {
  Transient,
  Singleton,
  WeakSingleton,
  Scoped(ScopeId),
}

impl ScopeKind {
  /// Whether instances of this scope live in the resolution cache.
  pub fn is_cacheable(&self) -> bool {
    !matches!(self, ScopeKind::Transient)
  }

  /// The cache context for this scope given the caller's requested scope.
  pub(crate) fn context(&self, requested: Option<&ScopeId>) -> Option<ScopeId> {
    match self {
      ScopeKind::Scoped(default) => Some(requested.unwrap_or(default).clone()),
      _ => None,
    }
  }
}

impl fmt::Display for ScopeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ScopeKind::Transient => f.write_str("transient"),
      ScopeKind::Singleton => f.write_str("singleton"),
      ScopeKind::WeakSingleton => f.write_str("weak-singleton"),
      ScopeKind::Scoped(id) => write!(f, "scoped({})", id),
    }
  }
}

/// A live scope context. Resolutions made through the handle build scoped
/// instances for this scope id; dropping the handle ends the scope and
/// evicts those instances.
///
/// ```
/// use fibre_weave::Container;
/// use std::sync::Arc;
///
/// struct RequestContext;
///
/// let container = Container::new();
/// container.add_scoped("request", |_| Ok(RequestContext));
///
/// let first = container.enter_scope("request-1");
/// let a = first.resolve::<RequestContext>().unwrap();
/// let b = first.resolve::<RequestContext>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// let second = container.enter_scope("request-2");
/// let c = second.resolve::<RequestContext>().unwrap();
/// assert!(!Arc::ptr_eq(&a, &c));
/// ```
pub struct ScopeHandle<'c> {
  container: &'c Container,
  id: ScopeId,
}

impl<'c> ScopeHandle<'c> {
  pub(crate) fn new(container: &'c Container, id: ScopeId) -> Self {
    Self { container, id }
  }

  pub fn id(&self) -> &ScopeId {
    &self.id
  }

  pub fn resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    self.container.resolve_in_scope::<T>(&self.id)
  }

  pub fn resolve_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
    self
      .container
      .resolve_with::<T>(ResolveOptions::named(name).in_scope(self.id.clone()))
  }

  pub fn resolve_timeout<T: ?Sized + Any + Send + Sync>(&self, timeout: Duration) -> Result<Arc<T>> {
    self
      .container
      .resolve_with::<T>(ResolveOptions::new().in_scope(self.id.clone()).timeout(timeout))
  }
}

impl Drop for ScopeHandle<'_> {
  fn drop(&mut self) {
    self.container.end_scope(&self.id);
  }
}
