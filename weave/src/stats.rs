//! Usage statistics: per-key counters, domain hops and debounced snapshots.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::cache::CachedInstance;
use crate::domain::DomainId;
use crate::graph::CyclePath;
use crate::key::TypeKey;
use crate::optimizer::Suggestion;

pub(crate) const MIN_DEBOUNCE: Duration = Duration::from_millis(50);
pub(crate) const MAX_DEBOUNCE: Duration = Duration::from_millis(1000);
pub(crate) const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Default)]
struct Counter {
  registrations: AtomicU64,
  resolutions: AtomicU64,
  // Milliseconds since the Unix epoch; zero means never resolved.
  last_resolved_at: AtomicI64,
}

type HopKey = (TypeKey, DomainId, DomainId);

/// Lock-free counters keyed by contract.
///
/// Every tracking call starts with a single relaxed load of the enabled
/// flag, so a disabled collector costs one atomic read per resolution.
pub(crate) struct UsageStatistics {
  enabled: AtomicBool,
  counters: DashMap<TypeKey, Counter>,
  hops: DashMap<HopKey, AtomicU64>,
  debounce_ms: AtomicU64,
  latest: Mutex<Option<(Instant, Arc<StatisticsSnapshot>)>>,
}

impl UsageStatistics {
  pub(crate) fn new(enabled: bool, debounce: Duration) -> Self {
    Self {
      enabled: AtomicBool::new(enabled),
      counters: DashMap::new(),
      hops: DashMap::new(),
      debounce_ms: AtomicU64::new(clamp_debounce(debounce).as_millis() as u64),
      latest: Mutex::new(None),
    }
  }

  pub(crate) fn is_enabled(&self) -> bool {
    self.enabled.load(Ordering::Relaxed)
  }

  pub(crate) fn set_enabled(&self, enabled: bool) {
    self.enabled.store(enabled, Ordering::Relaxed);
    self.invalidate();
  }

  pub(crate) fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms.load(Ordering::Relaxed))
  }

  /// Sets the snapshot debounce interval, clamped to 50..=1000 ms. Returns
  /// the interval actually applied.
  pub(crate) fn set_debounce(&self, interval: Duration) -> Duration {
    let clamped = clamp_debounce(interval);
    self
      .debounce_ms
      .store(clamped.as_millis() as u64, Ordering::Relaxed);
    clamped
  }

  pub(crate) fn track_registration(&self, key: &TypeKey) {
    if !self.is_enabled() {
      return;
    }
    self.with_counter(key, |counter| {
      counter.registrations.fetch_add(1, Ordering::Relaxed);
    });
  }

  pub(crate) fn track_resolution(&self, key: &TypeKey) {
    if !self.is_enabled() {
      return;
    }
    let now = Utc::now().timestamp_millis();
    self.with_counter(key, |counter| {
      counter.resolutions.fetch_add(1, Ordering::Relaxed);
      counter.last_resolved_at.fetch_max(now, Ordering::Relaxed);
    });
  }

  pub(crate) fn track_domain_hop(&self, key: &TypeKey, from: &DomainId, to: &DomainId) {
    if !self.is_enabled() {
      return;
    }
    let hop = (key.clone(), from.clone(), to.clone());
    if let Some(count) = self.hops.get(&hop) {
      count.fetch_add(1, Ordering::Relaxed);
      return;
    }
    self
      .hops
      .entry(hop)
      .or_default()
      .fetch_add(1, Ordering::Relaxed);
  }

  fn with_counter(&self, key: &TypeKey, update: impl FnOnce(&Counter)) {
    // Read lock on the shard for the common case; the write lock is only
    // taken the first time a key is seen.
    if let Some(counter) = self.counters.get(key) {
      update(&counter);
      return;
    }
    let counter = self.counters.entry(key.clone()).or_default();
    update(&counter);
  }

  pub(crate) fn counters(&self) -> Vec<UsageCounter> {
    let mut counters: Vec<UsageCounter> = self
      .counters
      .iter()
      .map(|entry| {
        let counter = entry.value();
        let last = counter.last_resolved_at.load(Ordering::Relaxed);
        UsageCounter {
          key: entry.key().clone(),
          registrations: counter.registrations.load(Ordering::Relaxed),
          resolutions: counter.resolutions.load(Ordering::Relaxed),
          last_resolved_at: if last == 0 {
            None
          } else {
            Utc.timestamp_millis_opt(last).single()
          },
        }
      })
      .collect();
    counters.sort_by(|a, b| a.key.cmp(&b.key));
    counters
  }

  pub(crate) fn domain_hops(&self) -> Vec<DomainHop> {
    let mut hops: Vec<DomainHop> = self
      .hops
      .iter()
      .map(|entry| {
        let (key, from, to) = entry.key().clone();
        DomainHop {
          key,
          from,
          to,
          count: entry.value().load(Ordering::Relaxed),
        }
      })
      .collect();
    hops.sort_by(|a, b| {
      a.key
        .cmp(&b.key)
        .then_with(|| a.from.cmp(&b.from))
        .then_with(|| a.to.cmp(&b.to))
    });
    hops
  }

  /// The last snapshot if it is younger than the debounce interval.
  pub(crate) fn fresh_snapshot(&self) -> Option<Arc<StatisticsSnapshot>> {
    let latest = self.latest.lock();
    match latest.as_ref() {
      Some((taken, snapshot)) if taken.elapsed() < self.debounce() => Some(snapshot.clone()),
      _ => None,
    }
  }

  pub(crate) fn store_snapshot(&self, snapshot: StatisticsSnapshot) -> Arc<StatisticsSnapshot> {
    let snapshot = Arc::new(snapshot);
    *self.latest.lock() = Some((Instant::now(), snapshot.clone()));
    snapshot
  }

  /// Forgets the cached snapshot so the next one is rebuilt.
  pub(crate) fn invalidate(&self) {
    *self.latest.lock() = None;
  }

  /// Zeroes every counter.
  pub(crate) fn reset(&self) {
    self.counters.clear();
    self.hops.clear();
    self.invalidate();
  }
}

fn clamp_debounce(interval: Duration) -> Duration {
  interval.clamp(MIN_DEBOUNCE, MAX_DEBOUNCE)
}

/// Point-in-time usage figures for one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageCounter {
  pub key: TypeKey,
  pub registrations: u64,
  pub resolutions: u64,
  pub last_resolved_at: Option<DateTime<Utc>>,
}

/// How often a contract was resolved from a domain other than its home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainHop {
  pub key: TypeKey,
  /// Domain of the caller.
  pub from: DomainId,
  /// Home domain declared by the registration.
  pub to: DomainId,
  pub count: u64,
}

/// An immutable view of the statistics, regenerated at most once per
/// debounce interval.
#[derive(Debug, Clone)]
pub struct StatisticsSnapshot {
  pub taken_at: DateTime<Utc>,
  pub optimization_enabled: bool,
  /// Sorted by key.
  pub counters: Vec<UsageCounter>,
  /// Keys resolved more often than the promotion threshold, busiest first.
  pub frequently_used: Vec<TypeKey>,
  /// Cycles across observed edges and declared dependencies.
  pub cycles: BTreeSet<CyclePath>,
  pub domain_hops: Vec<DomainHop>,
  pub suggestions: Vec<Suggestion>,
  /// Number of live registrations.
  pub registered: usize,
  pub cached: Vec<CachedInstance>,
}

impl StatisticsSnapshot {
  pub fn counter(&self, key: &TypeKey) -> Option<&UsageCounter> {
    self
      .counters
      .binary_search_by(|counter| counter.key.cmp(key))
      .ok()
      .map(|index| &self.counters[index])
  }

  pub fn resolutions(&self, key: &TypeKey) -> u64 {
    self.counter(key).map_or(0, |counter| counter.resolutions)
  }

  pub fn registrations(&self, key: &TypeKey) -> u64 {
    self.counter(key).map_or(0, |counter| counter.registrations)
  }

  pub fn total_resolutions(&self) -> u64 {
    self.counters.iter().map(|counter| counter.resolutions).sum()
  }

  /// Human-readable report of the snapshot.
  pub fn report(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for StatisticsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "--- Fibre Weave Statistics ({}) ---", self.taken_at.to_rfc3339())?;
    writeln!(
      f,
      "[Registry] {} registered, {} cached",
      self.registered,
      self.cached.len()
    )?;

    if self.counters.is_empty() {
      writeln!(f, "[Counters] No usage recorded.")?;
    } else {
      writeln!(f, "[Counters] ({}):", self.counters.len())?;
      for counter in &self.counters {
        writeln!(
          f,
          "  {:<50} registrations: {:<5} resolutions: {}",
          counter.key.to_string(),
          counter.registrations,
          counter.resolutions
        )?;
      }
    }

    if !self.cycles.is_empty() {
      writeln!(f, "[Cycles] ({}):", self.cycles.len())?;
      for cycle in &self.cycles {
        writeln!(f, "  {}", cycle)?;
      }
    }

    if !self.domain_hops.is_empty() {
      writeln!(f, "[Domain hops] ({}):", self.domain_hops.len())?;
      for hop in &self.domain_hops {
        writeln!(f, "  {} {} -> {}: {}", hop.key, hop.from, hop.to, hop.count)?;
      }
    }

    if self.suggestions.is_empty() {
      writeln!(f, "[Suggestions] None.")
    } else {
      writeln!(f, "[Suggestions] ({}):", self.suggestions.len())?;
      for suggestion in &self.suggestions {
        writeln!(f, "  {}", suggestion)?;
      }
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Service;

  #[test]
  fn counts_registrations_and_resolutions() {
    let stats = UsageStatistics::new(true, DEFAULT_DEBOUNCE);
    let key = TypeKey::of::<Service>();
    stats.track_registration(&key);
    for _ in 0..3 {
      stats.track_resolution(&key);
    }

    let counters = stats.counters();
    assert_eq!(counters.len(), 1);
    assert_eq!(counters[0].registrations, 1);
    assert_eq!(counters[0].resolutions, 3);
    assert!(counters[0].last_resolved_at.is_some());
  }

  #[test]
  fn disabled_collector_records_nothing() {
    let stats = UsageStatistics::new(false, DEFAULT_DEBOUNCE);
    let key = TypeKey::of::<Service>();
    stats.track_registration(&key);
    stats.track_resolution(&key);
    stats.track_domain_hop(&key, &DomainId::from("a"), &DomainId::from("b"));
    assert!(stats.counters().is_empty());
    assert!(stats.domain_hops().is_empty());
  }

  #[test]
  fn debounce_is_clamped() {
    let stats = UsageStatistics::new(true, Duration::from_millis(1));
    assert_eq!(stats.debounce(), MIN_DEBOUNCE);
    assert_eq!(stats.set_debounce(Duration::from_secs(30)), MAX_DEBOUNCE);
    assert_eq!(stats.set_debounce(Duration::from_millis(120)), Duration::from_millis(120));
  }

  #[test]
  fn hops_accumulate_per_direction() {
    let stats = UsageStatistics::new(true, DEFAULT_DEBOUNCE);
    let key = TypeKey::of::<Service>();
    let ui = DomainId::from("ui");
    let io = DomainId::from("io");
    stats.track_domain_hop(&key, &io, &ui);
    stats.track_domain_hop(&key, &io, &ui);
    stats.track_domain_hop(&key, &ui, &io);

    let hops = stats.domain_hops();
    assert_eq!(hops.len(), 2);
    let io_to_ui = hops.iter().find(|hop| hop.from == io).unwrap();
    assert_eq!(io_to_ui.count, 2);
  }

  #[test]
  fn reset_zeroes_counters() {
    let stats = UsageStatistics::new(true, DEFAULT_DEBOUNCE);
    stats.track_resolution(&TypeKey::of::<Service>());
    stats.reset();
    assert!(stats.counters().is_empty());
  }
}
