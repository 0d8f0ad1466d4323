//! The main `Container` struct: registration, resolution and diagnostics.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::cache::{CachedInstance, ResolutionCache, Slot};
use crate::config::WeaveConfig;
use crate::domain::{current_domain, DomainId};
use crate::error::{Result, WeaveError};
use crate::flight::{InFlight, Outcome};
use crate::graph::{CyclePath, DependencyGraph};
use crate::instance::Instance;
use crate::key::{CacheKey, TypeKey};
use crate::optimizer::{self, OptimizerSettings, Suggestion};
use crate::registry::{Binding, Registration, Registry};
use crate::scope::{ScopeHandle, ScopeId, ScopeKind};
use crate::stack::{self, ResolutionGuard};
use crate::stats::{StatisticsSnapshot, UsageStatistics};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

/// Everything only the gate holder may touch.
#[derive(Default)]
struct GateState {
  registry: Registry,
  graph: DependencyGraph,
  in_flight: HashMap<CacheKey, Arc<InFlight>>,
}

/// Runtime-adjustable knobs that are read on every resolution or snapshot.
struct Settings {
  promotion_threshold: AtomicU64,
  domain_hop_threshold: AtomicU64,
  // Milliseconds; zero means unbounded.
  default_timeout_ms: AtomicU64,
}

impl Settings {
  fn from_config(config: &WeaveConfig) -> Self {
    Self {
      promotion_threshold: AtomicU64::new(config.optimizer.promotion_threshold),
      domain_hop_threshold: AtomicU64::new(config.optimizer.domain_hop_threshold),
      default_timeout_ms: AtomicU64::new(timeout_to_ms(config.default_timeout)),
    }
  }

  fn default_timeout(&self) -> Option<Duration> {
    match self.default_timeout_ms.load(Ordering::Relaxed) {
      0 => None,
      ms => Some(Duration::from_millis(ms)),
    }
  }

  fn optimizer(&self) -> OptimizerSettings {
    OptimizerSettings {
      promotion_threshold: self.promotion_threshold.load(Ordering::Relaxed),
      domain_hop_threshold: self.domain_hop_threshold.load(Ordering::Relaxed),
    }
  }
}

fn timeout_to_ms(timeout: Option<Duration>) -> u64 {
  // Sub-millisecond timeouts round up so they stay bounded; huge ones
  // saturate.
  timeout.map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1))
}

/// A deadline too far out to represent is no deadline at all.
fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
  timeout.and_then(|t| Instant::now().checked_add(t))
}

/// Per-call resolution options.
///
/// ```
/// use fibre_weave::{Container, ResolveOptions};
/// use std::time::Duration;
///
/// let container = Container::new();
/// container.add_singleton_with_name("port", |_| Ok(8080u16));
///
/// let port = container
///   .resolve_with::<u16>(ResolveOptions::named("port").timeout(Duration::from_secs(1)))
///   .unwrap();
/// assert_eq!(*port, 8080);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
  name: Option<String>,
  scope: Option<ScopeId>,
  timeout: Option<Duration>,
}

impl ResolveOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn named(name: &str) -> Self {
    Self::new().name(name)
  }

  pub fn name(mut self, name: &str) -> Self {
    self.name = Some(name.to_owned());
    self
  }

  /// Resolves scoped bindings for this scope id instead of their default.
  pub fn in_scope(mut self, scope: impl Into<ScopeId>) -> Self {
    self.scope = Some(scope.into());
    self
  }

  /// Bounds how long the caller waits for the gate or for another caller's
  /// in-flight construction.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

/// A declared dependency that has no registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
  pub dependent: TypeKey,
  pub dependency: TypeKey,
}

/// Result of [`Container::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
  pub missing: Vec<MissingDependency>,
  pub cycles: BTreeSet<CyclePath>,
}

impl ValidationReport {
  pub fn is_ok(&self) -> bool {
    self.missing.is_empty() && self.cycles.is_empty()
  }
}

/// What a caller does next after consulting the gate.
enum Step<'c> {
  Done(Instance, Option<DomainId>),
  Wait(Arc<InFlight>, Option<DomainId>),
  Lead(Leader<'c>),
  Construct(Arc<Registration>),
}

/// The caller that owns an in-flight construction.
///
/// Publishing stores the instance and wakes the waiters; dropping an
/// unpublished leader (factory error or panic) abandons the marker so the
/// waiters can start over.
struct Leader<'c> {
  container: &'c Container,
  registration: Arc<Registration>,
  cache_key: CacheKey,
  flight: Arc<InFlight>,
  published: bool,
}

/// The dependency injection container.
///
/// Holds registrations, the resolution cache, the dependency graph and the
/// usage statistics. It is `Send + Sync`; registration and resolution may
/// happen from any thread at any time.
pub struct Container {
  id: u64,
  gate: Mutex<GateState>,
  cache: ResolutionCache,
  stats: UsageStatistics,
  settings: Settings,
}

impl Default for Container {
  fn default() -> Self {
    Self::with_config(WeaveConfig::default())
  }
}

impl fmt::Debug for Container {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Container")
      .field("id", &self.id)
      .field("registered", &self.gate.lock().registry.len())
      .field("cached", &self.cache.len())
      .field("optimization_enabled", &self.stats.is_enabled())
      .finish_non_exhaustive()
  }
}

impl Container {
  /// Creates a new, empty `Container` with the default configuration.
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_config(config: WeaveConfig) -> Self {
    Self {
      id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed),
      gate: Mutex::new(GateState::default()),
      cache: ResolutionCache::new(),
      stats: UsageStatistics::new(config.optimization_enabled, config.debounce_interval),
      settings: Settings::from_config(&config),
    }
  }

  // --- Registration ---

  /// Stores a registration. The last registration for a key wins: an
  /// existing binding is replaced, its cached instances are evicted and the
  /// replacement is logged.
  pub fn register(&self, registration: Registration) {
    let key = registration.key().clone();
    let scope = registration.scope().clone();

    let replaced = {
      let mut gate = self.gate.lock();
      gate.graph.remove_outgoing(&key);
      gate.in_flight.retain(|cache_key, _| cache_key.key != key);
      let replaced = gate.registry.insert(registration);
      self.cache.evict_key(&key);
      self.cache.bind_scope(&key, &scope);
      replaced
    };

    match replaced {
      Some(previous) => warn!(
        key = %key,
        previous_scope = %previous.scope(),
        scope = %scope,
        "registration overwritten; last registration wins"
      ),
      None => debug!(key = %key, scope = %scope, "registered"),
    }
    self.stats.track_registration(&key);
  }

  /// Starts a typed registration for `T`.
  pub fn bind<T: ?Sized + Any + Send + Sync>(&self) -> Binding<'_, T> {
    Binding::new(self)
  }

  // --- Instance Registration ---
  pub fn add_instance<T: Any + Send + Sync>(&self, instance: T) {
    self.bind::<T>().to_instance(instance);
  }
  pub fn add_instance_with_name<T: Any + Send + Sync>(&self, name: &str, instance: T) {
    self.bind::<T>().named(name).to_instance(instance);
  }

  // --- Singleton Registration ---
  pub fn add_singleton<T, F>(&self, factory: F)
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.bind::<T>().singleton().to(factory);
  }
  pub fn add_singleton_with_name<T, F>(&self, name: &str, factory: F)
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.bind::<T>().named(name).singleton().to(factory);
  }

  // --- Weak Singleton Registration ---
  pub fn add_weak_singleton<T, F>(&self, factory: F)
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.bind::<T>().weak_singleton().to(factory);
  }

  // --- Transient Registration ---
  pub fn add_transient<T, F>(&self, factory: F)
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.bind::<T>().to(factory);
  }
  pub fn add_transient_with_name<T, F>(&self, name: &str, factory: F)
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.bind::<T>().named(name).to(factory);
  }

  // --- Scoped Registration ---
  pub fn add_scoped<T, F>(&self, default_scope: impl Into<ScopeId>, factory: F)
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.bind::<T>().scoped(default_scope).to(factory);
  }

  // --- Trait Registration ---
  pub fn add_singleton_trait<I, F>(&self, factory: F)
  where
    I: ?Sized + Any + Send + Sync,
    F: Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
  {
    self.bind::<I>().singleton().to_arc(factory);
  }
  pub fn add_singleton_trait_with_name<I, F>(&self, name: &str, factory: F)
  where
    I: ?Sized + Any + Send + Sync,
    F: Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
  {
    self.bind::<I>().named(name).singleton().to_arc(factory);
  }
  pub fn add_transient_trait<I, F>(&self, factory: F)
  where
    I: ?Sized + Any + Send + Sync,
    F: Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
  {
    self.bind::<I>().to_arc(factory);
  }

  /// The registration bound to `key`. Never invokes a factory.
  pub fn lookup(&self, key: &TypeKey) -> Option<Arc<Registration>> {
    self.gate.lock().registry.lookup(key).cloned()
  }

  pub fn contains(&self, key: &TypeKey) -> bool {
    self.gate.lock().registry.lookup(key).is_some()
  }

  /// Removes the registration for `key` and evicts its cached instances.
  /// Returns whether anything was registered.
  pub fn release(&self, key: &TypeKey) -> bool {
    let removed = {
      let mut gate = self.gate.lock();
      let removed = gate.registry.remove(key);
      gate.graph.remove_outgoing(key);
      gate.in_flight.retain(|cache_key, _| &cache_key.key != key);
      self.cache.evict_key(key);
      removed
    };
    debug!(key = %key, removed = removed.is_some(), "released");
    removed.is_some()
  }

  /// Clears registrations, cached instances, the dependency graph and the
  /// statistics.
  pub fn release_all(&self) {
    {
      let mut gate = self.gate.lock();
      gate.registry.clear();
      gate.graph.clear();
      gate.in_flight.clear();
      self.cache.clear();
    }
    self.stats.reset();
    debug!(container = self.id, "released all registrations");
  }

  // --- Scopes ---

  /// Opens a scope context; scoped instances resolved through the handle are
  /// evicted when it drops.
  pub fn enter_scope(&self, id: impl Into<ScopeId>) -> ScopeHandle<'_> {
    ScopeHandle::new(self, id.into())
  }

  /// Ends scope `id`, evicting every instance built for it.
  pub fn end_scope(&self, id: &ScopeId) {
    let evicted = {
      let mut gate = self.gate.lock();
      gate
        .in_flight
        .retain(|cache_key, _| cache_key.scope.as_ref() != Some(id));
      self.cache.evict_scope(id)
    };
    debug!(scope = %id, evicted, "scope ended");
  }

  /// Drops cache entries of weak singletons whose instance was reclaimed.
  pub fn purge_reclaimed(&self) -> usize {
    self.cache.purge_reclaimed()
  }

  // --- Resolution ---

  /// Resolves `T`.
  pub fn resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    self.resolve_with::<T>(ResolveOptions::new())
  }

  pub fn resolve_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
    self.resolve_with::<T>(ResolveOptions::named(name))
  }

  pub fn resolve_in_scope<T: ?Sized + Any + Send + Sync>(&self, scope: &ScopeId) -> Result<Arc<T>> {
    self.resolve_with::<T>(ResolveOptions::new().in_scope(scope.clone()))
  }

  pub fn resolve_timeout<T: ?Sized + Any + Send + Sync>(&self, timeout: Duration) -> Result<Arc<T>> {
    self.resolve_with::<T>(ResolveOptions::new().timeout(timeout))
  }

  pub fn resolve_with<T: ?Sized + Any + Send + Sync>(&self, options: ResolveOptions) -> Result<Arc<T>> {
    let key = TypeKey::with_name::<T>(options.name.as_deref());
    let instance = self.resolve_instance(&key, options.scope.as_ref(), options.timeout)?;
    downcast::<T>(&key, instance)
  }

  /// Resolves an explicit key; fails with `TypeMismatch` if the key is not a
  /// binding of `T`.
  pub fn resolve_key<T: ?Sized + Any + Send + Sync>(&self, key: &TypeKey) -> Result<Arc<T>> {
    if !key.is::<T>() {
      return Err(WeaveError::TypeMismatch {
        key: key.clone(),
        requested: std::any::type_name::<T>(),
      });
    }
    let instance = self.resolve_instance(key, None, None)?;
    downcast::<T>(key, instance)
  }

  /// Resolves `T`, using `fallback` when `T` has no registration. The
  /// fallback's instance is returned as is: it is neither registered nor
  /// cached. Other failures (cycles, timeouts, failing factories) are still
  /// reported.
  pub fn resolve_or_else<T, F>(&self, fallback: F) -> Result<Arc<T>>
  where
    T: ?Sized + Any + Send + Sync,
    F: FnOnce() -> Arc<T>,
  {
    let key = TypeKey::of::<T>();
    match self.resolve::<T>() {
      Err(WeaveError::DependencyNotFound { key: missing }) if missing == key => {
        debug!(key = %key, "not registered, using call-site fallback");
        self.record_resolution(&key, None);
        Ok(fallback())
      }
      other => other,
    }
  }

  /// Resolves `T`, returning `default` on any failure. Never fails.
  pub fn resolve_or_default<T: ?Sized + Any + Send + Sync>(&self, default: Arc<T>) -> Arc<T> {
    match self.resolve::<T>() {
      Ok(instance) => instance,
      Err(error) => {
        debug!(error = %error, "resolution failed, using default");
        default
      }
    }
  }

  /// Resolves `T`, suspending instead of blocking while another caller is
  /// constructing the same instance.
  pub async fn resolve_async<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    self.resolve_async_with::<T>(ResolveOptions::new()).await
  }

  /// Like [`resolve_async`](Self::resolve_async) but gives up with
  /// `ResolutionTimeout` after `timeout`. A construction already under way
  /// keeps running and is cached for later callers.
  #[cfg(feature = "tokio")]
  pub async fn resolve_async_timeout<T: ?Sized + Any + Send + Sync>(
    &self,
    timeout: Duration,
  ) -> Result<Arc<T>> {
    self
      .resolve_async_with::<T>(ResolveOptions::new().timeout(timeout))
      .await
  }

  pub async fn resolve_async_with<T: ?Sized + Any + Send + Sync>(
    &self,
    options: ResolveOptions,
  ) -> Result<Arc<T>> {
    let key = TypeKey::with_name::<T>(options.name.as_deref());
    let instance = self
      .resolve_instance_async(&key, options.scope.as_ref(), options.timeout)
      .await?;
    downcast::<T>(&key, instance)
  }

  fn resolve_instance(
    &self,
    key: &TypeKey,
    scope: Option<&ScopeId>,
    timeout: Option<Duration>,
  ) -> Result<Instance> {
    let timeout = timeout.or_else(|| self.settings.default_timeout());
    let deadline = deadline_after(timeout);

    if let Some(instance) = self.fast_path(key, scope) {
      return Ok(instance);
    }

    loop {
      match self.plan(key, scope, timeout, deadline)? {
        Step::Done(instance, domain) => {
          self.record_resolution(key, domain.as_ref());
          return Ok(instance);
        }
        Step::Construct(registration) => {
          let instance = self.construct(&registration)?;
          self.record_resolution(key, registration.domain());
          return Ok(instance);
        }
        Step::Lead(leader) => {
          let domain = leader.registration.domain().cloned();
          let instance = self.lead(leader)?;
          self.record_resolution(key, domain.as_ref());
          return Ok(instance);
        }
        Step::Wait(flight, domain) => match flight.wait(deadline) {
          Outcome::Ready(instance) => {
            self.record_resolution(key, domain.as_ref());
            return Ok(instance);
          }
          Outcome::Abandoned => {
            trace!(key = %key, "in-flight construction abandoned, retrying");
            continue;
          }
          Outcome::TimedOut => return Err(self.timed_out(key, timeout)),
        },
      }
    }
  }

  async fn resolve_instance_async(
    &self,
    key: &TypeKey,
    scope: Option<&ScopeId>,
    timeout: Option<Duration>,
  ) -> Result<Instance> {
    let timeout = timeout.or_else(|| self.settings.default_timeout());
    let deadline = deadline_after(timeout);

    if let Some(instance) = self.fast_path(key, scope) {
      return Ok(instance);
    }

    loop {
      match self.plan(key, scope, timeout, deadline)? {
        Step::Done(instance, domain) => {
          self.record_resolution(key, domain.as_ref());
          return Ok(instance);
        }
        Step::Construct(registration) => {
          let instance = self.construct(&registration)?;
          self.record_resolution(key, registration.domain());
          return Ok(instance);
        }
        Step::Lead(leader) => {
          let domain = leader.registration.domain().cloned();
          let instance = self.lead(leader)?;
          self.record_resolution(key, domain.as_ref());
          return Ok(instance);
        }
        Step::Wait(flight, domain) => match wait_async(&flight, deadline).await {
          Outcome::Ready(instance) => {
            self.record_resolution(key, domain.as_ref());
            return Ok(instance);
          }
          Outcome::Abandoned => continue,
          Outcome::TimedOut => return Err(self.timed_out(key, timeout)),
        },
      }
    }
  }

  /// Cache lookup that never touches the gate.
  fn fast_path(&self, key: &TypeKey, scope: Option<&ScopeId>) -> Option<Instance> {
    let hit = self.cache.find(key, scope)?;
    trace!(key = %key, "cache hit");
    self.record_resolution(key, hit.domain.as_ref());
    Some(hit.instance)
  }

  /// The slow path: cycle checks, registry lookup and single-flight
  /// bookkeeping under the gate. Returns with the gate released.
  fn plan(
    &self,
    key: &TypeKey,
    scope: Option<&ScopeId>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
  ) -> Result<Step<'_>> {
    // A key already on this call chain's stack is a cycle; checking before
    // anything else guarantees termination.
    if let Some(path) = stack::cycle_for(self.id, key) {
      debug!(path = %path, "circular dependency on the resolution stack");
      return Err(WeaveError::CircularDependency { path });
    }

    let mut gate = self.lock_gate(key, timeout, deadline)?;

    if let Some(enclosing) = stack::enclosing(self.id) {
      if let Err(path) = gate.graph.try_record_edge(&enclosing, key) {
        debug!(path = %path, "dependency edge would close a cycle");
        return Err(WeaveError::CircularDependency { path });
      }
    }

    let registration = match gate.registry.lookup(key) {
      Some(registration) => registration.clone(),
      None => return Err(WeaveError::DependencyNotFound { key: key.clone() }),
    };

    if !registration.scope().is_cacheable() {
      return Ok(Step::Construct(registration));
    }

    let cache_key = CacheKey::new(key.clone(), registration.scope().context(scope));
    if let Some(hit) = self.cache.get(&cache_key) {
      return Ok(Step::Done(hit.instance, hit.domain));
    }

    if let Some(flight) = gate.in_flight.get(&cache_key) {
      trace!(key = %key, "joining in-flight construction");
      return Ok(Step::Wait(flight.clone(), registration.domain().cloned()));
    }

    let flight = Arc::new(InFlight::new());
    gate.in_flight.insert(cache_key.clone(), flight.clone());
    trace!(key = %key, scope = %registration.scope(), "leading construction");
    Ok(Step::Lead(Leader {
      container: self,
      registration,
      cache_key,
      flight,
      published: false,
    }))
  }

  fn lock_gate(
    &self,
    key: &TypeKey,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
  ) -> Result<MutexGuard<'_, GateState>> {
    match deadline {
      None => Ok(self.gate.lock()),
      Some(deadline) => self
        .gate
        .try_lock_until(deadline)
        .ok_or_else(|| self.timed_out(key, timeout)),
    }
  }

  /// Runs the factory with the key pushed on the resolution stack, falling
  /// back to the registration's fallback on a recoverable failure.
  fn construct(&self, registration: &Registration) -> Result<Instance> {
    let key = registration.key();
    let _guard = ResolutionGuard::push(self.id, key.clone());
    trace!(key = %key, "invoking factory");

    match (registration.factory())(self) {
      Ok(instance) => Ok(instance),
      Err(error) => {
        let error = error.attach_key(key);
        match registration.fallback() {
          Some(fallback) if error.is_recoverable() => {
            debug!(key = %key, error = %error, "factory failed, using registration fallback");
            fallback(self).map_err(|e| e.attach_key(key))
          }
          _ => Err(error),
        }
      }
    }
  }

  fn lead(&self, mut leader: Leader<'_>) -> Result<Instance> {
    let instance = self.construct(&leader.registration)?;

    let slot = match leader.registration.scope() {
      ScopeKind::WeakSingleton => leader.registration.downgrade(&instance).map(Slot::Weak),
      _ => Some(Slot::Strong(instance.clone())),
    };

    {
      let mut gate = self.gate.lock();
      // A release, re-registration or scope end while the factory ran
      // removes the marker; the result is then handed to the waiters but
      // not cached.
      let still_current = gate
        .in_flight
        .get(&leader.cache_key)
        .map_or(false, |flight| Arc::ptr_eq(flight, &leader.flight));
      if still_current {
        gate.in_flight.remove(&leader.cache_key);
        self.cache.set(
          leader.cache_key.clone(),
          slot,
          leader.registration.domain().cloned(),
        );
      } else {
        debug!(key = %leader.registration.key(), "binding changed during construction; result not cached");
      }
    }

    leader.published = true;
    leader.flight.complete(instance.clone());
    Ok(instance)
  }

  fn abandon(&self, leader: &Leader<'_>) {
    {
      let mut gate = self.gate.lock();
      let ours = gate
        .in_flight
        .get(&leader.cache_key)
        .map_or(false, |flight| Arc::ptr_eq(flight, &leader.flight));
      if ours {
        gate.in_flight.remove(&leader.cache_key);
      }
    }
    leader.flight.abandon();
  }

  fn record_resolution(&self, key: &TypeKey, home: Option<&DomainId>) {
    if !self.stats.is_enabled() {
      return;
    }
    self.stats.track_resolution(key);
    if let Some(home) = home {
      let caller = current_domain();
      if &caller != home {
        self.stats.track_domain_hop(key, &caller, home);
      }
    }
  }

  fn timed_out(&self, key: &TypeKey, timeout: Option<Duration>) -> WeaveError {
    let timeout = timeout.unwrap_or_default();
    debug!(key = %key, ?timeout, "resolution timed out");
    WeaveError::ResolutionTimeout {
      key: key.clone(),
      timeout,
    }
  }

  // --- Diagnostics ---

  /// Observed edges plus the dependencies registrations declare.
  fn full_graph(&self) -> (DependencyGraph, Vec<MissingDependency>) {
    let gate = self.gate.lock();
    let mut graph = gate.graph.clone();
    let mut missing = Vec::new();
    for registration in gate.registry.iter() {
      for dependency in registration.dependencies() {
        graph.record_edge(registration.key().clone(), dependency.clone());
        if gate.registry.lookup(dependency).is_none() {
          missing.push(MissingDependency {
            dependent: registration.key().clone(),
            dependency: dependency.clone(),
          });
        }
      }
    }
    missing.sort_by(|a, b| {
      a.dependent
        .cmp(&b.dependent)
        .then_with(|| a.dependency.cmp(&b.dependency))
    });
    (graph, missing)
  }

  /// Cycles across the whole known graph: edges observed while resolving
  /// and dependencies declared by registrations, whether or not they were
  /// ever exercised.
  pub fn detect_cycles(&self) -> BTreeSet<CyclePath> {
    self.full_graph().0.detect_cycles()
  }

  /// Adjacency listing of the known graph.
  pub fn render_graph(&self) -> String {
    self.full_graph().0.render()
  }

  /// Pre-flight check of the declared bindings: missing dependencies and
  /// cycles.
  pub fn validate(&self) -> ValidationReport {
    let (graph, missing) = self.full_graph();
    ValidationReport {
      missing,
      cycles: graph.detect_cycles(),
    }
  }

  /// What is currently cached.
  pub fn cached_instances(&self) -> Vec<CachedInstance> {
    self.cache.describe()
  }

  // --- Statistics ---

  /// The current statistics, rebuilt at most once per debounce interval.
  pub fn snapshot(&self) -> Arc<StatisticsSnapshot> {
    if let Some(snapshot) = self.stats.fresh_snapshot() {
      return snapshot;
    }

    let (graph, _) = self.full_graph();
    let (scopes, registered) = {
      let gate = self.gate.lock();
      let scopes: HashMap<TypeKey, ScopeKind> = gate
        .registry
        .iter()
        .map(|registration| (registration.key().clone(), registration.scope().clone()))
        .collect();
      let registered = gate.registry.len();
      (scopes, registered)
    };

    let enabled = self.stats.is_enabled();
    let settings = self.settings.optimizer();
    let counters = self.stats.counters();
    let domain_hops = self.stats.domain_hops();
    let cycles = graph.detect_cycles();

    let (frequently_used, suggestions) = if enabled {
      (
        optimizer::frequently_used(&counters, &settings),
        optimizer::suggest(&counters, &scopes, &cycles, &domain_hops, &settings),
      )
    } else {
      (Vec::new(), Vec::new())
    };

    self.stats.store_snapshot(StatisticsSnapshot {
      taken_at: Utc::now(),
      optimization_enabled: enabled,
      counters,
      frequently_used,
      cycles,
      domain_hops,
      suggestions,
      registered,
      cached: self.cache.describe(),
    })
  }

  /// Suggestions from the current snapshot. Advisory only.
  pub fn suggest_optimizations(&self) -> Vec<Suggestion> {
    self.snapshot().suggestions.clone()
  }

  /// Zeroes all usage counters.
  pub fn reset_statistics(&self) {
    self.stats.reset();
  }

  // --- Configuration ---

  pub fn set_optimization_enabled(&self, enabled: bool) {
    self.stats.set_enabled(enabled);
  }

  pub fn is_optimization_enabled(&self) -> bool {
    self.stats.is_enabled()
  }

  /// Sets how long a snapshot is reused, clamped to 50..=1000 ms. Returns
  /// the interval applied.
  pub fn set_debounce_interval(&self, interval: Duration) -> Duration {
    let applied = self.stats.set_debounce(interval);
    self.stats.invalidate();
    applied
  }

  pub fn set_promotion_threshold(&self, threshold: u64) {
    self
      .settings
      .promotion_threshold
      .store(threshold, Ordering::Relaxed);
    self.stats.invalidate();
  }

  pub fn set_domain_hop_threshold(&self, threshold: u64) {
    self
      .settings
      .domain_hop_threshold
      .store(threshold, Ordering::Relaxed);
    self.stats.invalidate();
  }

  /// Timeout applied to resolutions that do not pass their own.
  pub fn set_default_timeout(&self, timeout: Option<Duration>) {
    self
      .settings
      .default_timeout_ms
      .store(timeout_to_ms(timeout), Ordering::Relaxed);
  }

  pub fn apply_config(&self, config: &WeaveConfig) {
    self.stats.set_enabled(config.optimization_enabled);
    self.stats.set_debounce(config.debounce_interval);
    self.set_promotion_threshold(config.optimizer.promotion_threshold);
    self.set_domain_hop_threshold(config.optimizer.domain_hop_threshold);
    self.set_default_timeout(config.default_timeout);
  }

  /// The configuration currently in effect.
  pub fn config(&self) -> WeaveConfig {
    WeaveConfig {
      optimization_enabled: self.stats.is_enabled(),
      debounce_interval: self.stats.debounce(),
      optimizer: self.settings.optimizer(),
      default_timeout: self.settings.default_timeout(),
    }
  }
}

impl Drop for Leader<'_> {
  fn drop(&mut self) {
    if !self.published {
      self.container.abandon(self);
    }
  }
}

async fn wait_async(flight: &InFlight, deadline: Option<Instant>) -> Outcome {
  match deadline {
    #[cfg(feature = "tokio")]
    Some(deadline) => {
      let deadline = tokio::time::Instant::from_std(deadline);
      match tokio::time::timeout_at(deadline, flight.wait_async()).await {
        Ok(outcome) => outcome,
        Err(_) => Outcome::TimedOut,
      }
    }
    _ => flight.wait_async().await,
  }
}

fn downcast<T: ?Sized + Any + Send + Sync>(key: &TypeKey, instance: Instance) -> Result<Arc<T>> {
  instance.downcast::<T>().ok_or_else(|| WeaveError::TypeMismatch {
    key: key.clone(),
    requested: std::any::type_name::<T>(),
  })
}
