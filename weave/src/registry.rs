//! Registrations and the registry that owns them.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::container::Container;
use crate::domain::DomainId;
use crate::error::Result;
use crate::instance::{downgrade, Downgrade, Instance};
use crate::key::TypeKey;
use crate::scope::{ScopeId, ScopeKind};

/// A type-erased factory. Receives the container so it can resolve its own
/// dependencies and propagate their failures with `?`.
pub(crate) type Factory = Arc<dyn Fn(&Container) -> Result<Instance> + Send + Sync>;

fn erase<T, F>(factory: F) -> Factory
where
  T: Any + Send + Sync,
  F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
{
  Arc::new(move |container| factory(container).map(|value| Instance::new(Arc::new(value))))
}

fn erase_arc<I, F>(factory: F) -> Factory
where
  I: ?Sized + Any + Send + Sync,
  F: Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
{
  Arc::new(move |container| factory(container).map(Instance::new::<I>))
}

/// A factory bound to a key together with its lifecycle policy.
///
/// Built with [`Container::bind`] (or one of the `add_*` helpers) and owned
/// by the container; [`Container::lookup`] hands out shared read-only views.
pub struct Registration {
  key: TypeKey,
  scope: ScopeKind,
  factory: Factory,
  fallback: Option<Factory>,
  dependencies: Vec<TypeKey>,
  domain: Option<DomainId>,
  created_at: DateTime<Utc>,
  downgrade: Downgrade,
}

impl Registration {
  pub fn key(&self) -> &TypeKey {
    &self.key
  }

  pub fn scope(&self) -> &ScopeKind {
    &self.scope
  }

  pub fn has_fallback(&self) -> bool {
    self.fallback.is_some()
  }

  /// Dependencies declared with [`Binding::depends_on`]. Used for
  /// pre-flight validation; resolution itself does not need them.
  pub fn dependencies(&self) -> &[TypeKey] {
    &self.dependencies
  }

  /// Home concurrency domain of the contract, if declared.
  pub fn domain(&self) -> Option<&DomainId> {
    self.domain.as_ref()
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub(crate) fn factory(&self) -> &Factory {
    &self.factory
  }

  pub(crate) fn fallback(&self) -> Option<&Factory> {
    self.fallback.as_ref()
  }

  pub(crate) fn downgrade(&self, instance: &Instance) -> Option<crate::instance::WeakInstance> {
    (self.downgrade)(instance)
  }
}

impl fmt::Debug for Registration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Registration")
      .field("key", &self.key)
      .field("scope", &self.scope)
      .field("has_fallback", &self.fallback.is_some())
      .field("dependencies", &self.dependencies)
      .field("domain", &self.domain)
      .field("created_at", &self.created_at)
      .finish_non_exhaustive()
  }
}

/// Typed builder for a registration of contract `T`.
///
/// ```
/// use fibre_weave::{Container, ScopeKind};
/// use std::sync::Arc;
///
/// trait Store: Send + Sync {
///   fn name(&self) -> &'static str;
/// }
/// struct Postgres;
/// impl Store for Postgres {
///   fn name(&self) -> &'static str { "postgres" }
/// }
/// struct Memory;
/// impl Store for Memory {
///   fn name(&self) -> &'static str { "memory" }
/// }
///
/// let container = Container::new();
/// container
///   .bind::<dyn Store>()
///   .scope(ScopeKind::Singleton)
///   .fallback_arc(|_| Ok(Arc::new(Memory)))
///   .to_arc(|_| Ok(Arc::new(Postgres)));
///
/// assert_eq!(container.resolve::<dyn Store>().unwrap().name(), "postgres");
/// ```
#[must_use = "a binding does nothing until `to` or `to_arc` is called"]
pub struct Binding<'c, T: ?Sized> {
  container: &'c Container,
  key: TypeKey,
  scope: ScopeKind,
  fallback: Option<Factory>,
  dependencies: Vec<TypeKey>,
  domain: Option<DomainId>,
  _marker: PhantomData<fn() -> Arc<T>>,
}

impl<'c, T: ?Sized + Any + Send + Sync> Binding<'c, T> {
  pub(crate) fn new(container: &'c Container) -> Self {
    Self {
      container,
      key: TypeKey::of::<T>(),
      scope: ScopeKind::Transient,
      fallback: None,
      dependencies: Vec::new(),
      domain: None,
      _marker: PhantomData,
    }
  }

  /// Registers under a name instead of the bare type.
  pub fn named(mut self, name: &str) -> Self {
    self.key = TypeKey::named::<T>(name);
    self
  }

  /// Lifecycle scope. Defaults to `Transient`.
  pub fn scope(mut self, scope: ScopeKind) -> Self {
    self.scope = scope;
    self
  }

  pub fn singleton(self) -> Self {
    self.scope(ScopeKind::Singleton)
  }

  pub fn weak_singleton(self) -> Self {
    self.scope(ScopeKind::WeakSingleton)
  }

  pub fn scoped(self, id: impl Into<ScopeId>) -> Self {
    self.scope(ScopeKind::Scoped(id.into()))
  }

  /// Declares that the factory resolves `D`.
  pub fn depends_on<D: ?Sized + Any>(mut self) -> Self {
    self.dependencies.push(TypeKey::of::<D>());
    self
  }

  /// Declares a dependency on an arbitrary key (for named bindings).
  pub fn depends_on_key(mut self, key: TypeKey) -> Self {
    self.dependencies.push(key);
    self
  }

  /// Declares the concurrency domain the contract belongs to.
  pub fn in_domain(mut self, domain: impl Into<DomainId>) -> Self {
    self.domain = Some(domain.into());
    self
  }

  /// Factory used when the primary one fails with a recoverable error.
  pub fn fallback_arc<F>(mut self, fallback: F) -> Self
  where
    F: Fn(&Container) -> Result<Arc<T>> + Send + Sync + 'static,
  {
    self.fallback = Some(erase_arc(fallback));
    self
  }

  /// Completes the binding with a factory returning `Arc<T>`, which is the
  /// form trait objects are registered in.
  pub fn to_arc<F>(self, factory: F) -> TypeKey
  where
    F: Fn(&Container) -> Result<Arc<T>> + Send + Sync + 'static,
  {
    let registration = self.finish(erase_arc(factory));
    let key = registration.key.clone();
    self.container.register(registration);
    key
  }

  fn finish(&self, factory: Factory) -> Registration {
    Registration {
      key: self.key.clone(),
      scope: self.scope.clone(),
      factory,
      fallback: self.fallback.clone(),
      dependencies: self.dependencies.clone(),
      domain: self.domain.clone(),
      created_at: Utc::now(),
      downgrade: downgrade::<T>,
    }
  }
}

impl<'c, T: Any + Send + Sync> Binding<'c, T> {
  /// Factory used when the primary one fails with a recoverable error.
  pub fn fallback<F>(mut self, fallback: F) -> Self
  where
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.fallback = Some(erase(fallback));
    self
  }

  /// Completes the binding with a factory returning `T`.
  pub fn to<F>(self, factory: F) -> TypeKey
  where
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    let registration = self.finish(erase(factory));
    let key = registration.key.clone();
    self.container.register(registration);
    key
  }

  /// Completes the binding with a ready-made instance. The scope is forced
  /// to `Singleton` and every resolution returns this same instance.
  pub fn to_instance(self, instance: T) -> TypeKey {
    let shared = Arc::new(instance);
    self.singleton().to_arc(move |_| Ok(shared.clone()))
  }
}

/// The authoritative map of bindings. Mutated only by the holder of the
/// container's gate.
#[derive(Default)]
pub(crate) struct Registry {
  registrations: HashMap<TypeKey, Arc<Registration>>,
}

impl Registry {
  /// Inserts `registration`, returning the one it replaced.
  pub(crate) fn insert(&mut self, registration: Registration) -> Option<Arc<Registration>> {
    self
      .registrations
      .insert(registration.key.clone(), Arc::new(registration))
  }

  pub(crate) fn lookup(&self, key: &TypeKey) -> Option<&Arc<Registration>> {
    self.registrations.get(key)
  }

  pub(crate) fn remove(&mut self, key: &TypeKey) -> Option<Arc<Registration>> {
    self.registrations.remove(key)
  }

  pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Registration>> {
    self.registrations.values()
  }

  pub(crate) fn len(&self) -> usize {
    self.registrations.len()
  }

  pub(crate) fn clear(&mut self) {
    self.registrations.clear();
  }
}
