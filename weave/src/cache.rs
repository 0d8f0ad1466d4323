//! The resolution cache: materialized instances of cacheable scopes.

use std::collections::HashMap;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::domain::DomainId;
use crate::instance::{Instance, WeakInstance};
use crate::key::{CacheKey, TypeKey};
use crate::scope::{ScopeId, ScopeKind};

#[derive(Clone)]
pub(crate) enum Slot {
  Strong(Instance),
  Weak(WeakInstance),
}

struct CacheEntry {
  slot: Slot,
  domain: Option<DomainId>,
  last_access: Instant,
}

/// Diagnostic view of one cache entry.
#[derive(Debug, Clone)]
pub struct CachedInstance {
  pub key: TypeKey,
  pub scope: Option<ScopeId>,
  /// Held weakly (a weak singleton).
  pub weak: bool,
  /// False once a weakly held instance has been reclaimed.
  pub alive: bool,
  /// Time since the entry was last read or written.
  pub idle: std::time::Duration,
}

/// What a cache hit hands back: the instance and the home domain of the
/// registration that built it.
pub(crate) struct Hit {
  pub(crate) instance: Instance,
  pub(crate) domain: Option<DomainId>,
}

/// A hash map behind one mutex.
///
/// Every operation holds the lock only long enough to copy a handle in or
/// out; downcasting and weak upgrades happen after the lock is released.
/// There is no eviction policy besides explicit removal: the key space is
/// bounded by the number of registered contracts.
#[derive(Default)]
pub(crate) struct ResolutionCache {
  entries: Mutex<HashMap<CacheKey, CacheEntry>>,
  // Default scope id of every `Scoped` binding, so lookups without an
  // explicit scope find the entry without consulting the registry.
  defaults: DashMap<TypeKey, ScopeId>,
}

impl ResolutionCache {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Looks up a live instance. A weak entry whose instance was reclaimed is
  /// reported as a miss.
  pub(crate) fn get(&self, key: &CacheKey) -> Option<Hit> {
    let (slot, domain) = {
      let mut entries = self.entries.lock();
      let entry = entries.get_mut(key)?;
      entry.last_access = Instant::now();
      (entry.slot.clone(), entry.domain.clone())
    };

    let instance = match slot {
      Slot::Strong(instance) => instance,
      Slot::Weak(weak) => weak.upgrade()?,
    };
    Some(Hit { instance, domain })
  }

  /// Looks up `key` as a caller asking for scope `requested` would see it:
  /// under the requested (or default) scope context first, then under the
  /// scope-independent context singletons live in.
  pub(crate) fn find(&self, key: &TypeKey, requested: Option<&ScopeId>) -> Option<Hit> {
    let context = match requested {
      Some(scope) => Some(scope.clone()),
      None => self.defaults.get(key).map(|scope| scope.value().clone()),
    };
    if let Some(context) = context {
      if let Some(hit) = self.get(&CacheKey::new(key.clone(), Some(context))) {
        return Some(hit);
      }
    }
    self.get(&CacheKey::new(key.clone(), None))
  }

  /// Remembers the default scope context of `key`'s binding.
  pub(crate) fn bind_scope(&self, key: &TypeKey, scope: &ScopeKind) {
    match scope {
      ScopeKind::Scoped(default) => {
        self.defaults.insert(key.clone(), default.clone());
      }
      _ => {
        self.defaults.remove(key);
      }
    }
  }

  /// Stores `slot` under `key`; `None` removes the entry.
  pub(crate) fn set(&self, key: CacheKey, slot: Option<Slot>, domain: Option<DomainId>) {
    let mut entries = self.entries.lock();
    match slot {
      Some(slot) => {
        entries.insert(
          key,
          CacheEntry {
            slot,
            domain,
            last_access: Instant::now(),
          },
        );
      }
      None => {
        entries.remove(&key);
      }
    }
  }

  /// Removes the entries of `key` under every scope context, and its
  /// default scope.
  pub(crate) fn evict_key(&self, key: &TypeKey) -> usize {
    self.defaults.remove(key);
    let mut entries = self.entries.lock();
    let before = entries.len();
    entries.retain(|cache_key, _| &cache_key.key != key);
    before - entries.len()
  }

  /// Removes every instance built for scope `id`.
  pub(crate) fn evict_scope(&self, id: &ScopeId) -> usize {
    let mut entries = self.entries.lock();
    let before = entries.len();
    entries.retain(|cache_key, _| cache_key.scope.as_ref() != Some(id));
    before - entries.len()
  }

  /// Drops weak entries whose instance has already been reclaimed.
  pub(crate) fn purge_reclaimed(&self) -> usize {
    let mut entries = self.entries.lock();
    let before = entries.len();
    entries.retain(|_, entry| match &entry.slot {
      Slot::Strong(_) => true,
      Slot::Weak(weak) => weak.is_alive(),
    });
    before - entries.len()
  }

  /// Describes every entry, ordered by key then scope.
  pub(crate) fn describe(&self) -> Vec<CachedInstance> {
    let entries = self.entries.lock();
    let mut described: Vec<CachedInstance> = entries
      .iter()
      .map(|(cache_key, entry)| CachedInstance {
        key: cache_key.key.clone(),
        scope: cache_key.scope.clone(),
        weak: matches!(entry.slot, Slot::Weak(_)),
        alive: match &entry.slot {
          Slot::Strong(_) => true,
          Slot::Weak(weak) => weak.is_alive(),
        },
        idle: entry.last_access.elapsed(),
      })
      .collect();
    described.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.scope.cmp(&b.scope)));
    described
  }

  pub(crate) fn clear(&self) {
    self.entries.lock().clear();
    self.defaults.clear();
  }

  pub(crate) fn len(&self) -> usize {
    self.entries.lock().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::instance::downgrade;
  use std::sync::Arc;

  fn singleton_key() -> CacheKey {
    CacheKey::new(TypeKey::of::<u32>(), None)
  }

  #[test]
  fn set_get_and_remove() {
    let cache = ResolutionCache::new();
    let value = Arc::new(5u32);
    cache.set(singleton_key(), Some(Slot::Strong(Instance::new(value.clone()))), None);

    let hit = cache.get(&singleton_key()).unwrap();
    assert!(Arc::ptr_eq(&hit.instance.downcast::<u32>().unwrap(), &value));

    cache.set(singleton_key(), None, None);
    assert!(cache.get(&singleton_key()).is_none());
    assert_eq!(cache.len(), 0);
  }

  #[test]
  fn reclaimed_weak_entries_miss_and_purge() {
    let cache = ResolutionCache::new();
    let instance = Instance::new(Arc::new(9u32));
    let weak = downgrade::<u32>(&instance).unwrap();
    cache.set(singleton_key(), Some(Slot::Weak(weak)), None);

    assert!(cache.get(&singleton_key()).is_some());
    drop(instance);
    assert!(cache.get(&singleton_key()).is_none());
    assert_eq!(cache.purge_reclaimed(), 1);
    assert_eq!(cache.len(), 0);
  }

  #[test]
  fn eviction_by_key_and_scope() {
    let cache = ResolutionCache::new();
    let key = TypeKey::of::<u32>();
    for scope in ["a", "b"] {
      cache.set(
        CacheKey::new(key.clone(), Some(ScopeId::from(scope))),
        Some(Slot::Strong(Instance::new(Arc::new(1u32)))),
        None,
      );
    }
    cache.set(
      CacheKey::new(TypeKey::of::<u64>(), Some(ScopeId::from("a"))),
      Some(Slot::Strong(Instance::new(Arc::new(2u64)))),
      None,
    );

    assert_eq!(cache.evict_scope(&ScopeId::from("a")), 2);
    assert_eq!(cache.evict_key(&key), 1);
    assert_eq!(cache.len(), 0);
  }

  #[test]
  fn find_falls_back_to_default_and_unscoped_contexts() {
    let cache = ResolutionCache::new();
    let scoped = TypeKey::of::<u32>();
    let single = TypeKey::of::<u64>();
    cache.bind_scope(&scoped, &ScopeKind::Scoped(ScopeId::from("request")));
    cache.set(
      CacheKey::new(scoped.clone(), Some(ScopeId::from("request"))),
      Some(Slot::Strong(Instance::new(Arc::new(1u32)))),
      None,
    );
    cache.set(
      CacheKey::new(single.clone(), None),
      Some(Slot::Strong(Instance::new(Arc::new(2u64)))),
      None,
    );

    // No scope requested: the default scope context.
    assert!(cache.find(&scoped, None).is_some());
    // Another scope id has its own instances.
    assert!(cache.find(&scoped, Some(&ScopeId::from("r-1"))).is_none());
    // Singletons are shared whichever scope the caller is in.
    assert!(cache.find(&single, Some(&ScopeId::from("r-1"))).is_some());

    cache.evict_key(&scoped);
    assert!(cache.defaults.is_empty());
  }

  #[test]
  fn reads_refresh_last_access() {
    let cache = ResolutionCache::new();
    cache.set(singleton_key(), Some(Slot::Strong(Instance::new(Arc::new(1u32)))), None);
    std::thread::sleep(std::time::Duration::from_millis(30));
    assert!(cache.describe()[0].idle >= std::time::Duration::from_millis(30));
    cache.get(&singleton_key());
    let entry = &cache.describe()[0];
    assert!(entry.idle < std::time::Duration::from_millis(30));
    assert!(entry.alive && !entry.weak);
  }
}
