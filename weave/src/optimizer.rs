//! Advisory suggestions derived from usage statistics. Nothing here changes
//! how a resolution behaves.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::domain::DomainId;
use crate::graph::CyclePath;
use crate::key::TypeKey;
use crate::scope::ScopeKind;
use crate::stats::{DomainHop, UsageCounter};

pub(crate) const DEFAULT_PROMOTION_THRESHOLD: u64 = 10;
pub(crate) const DEFAULT_DOMAIN_HOP_THRESHOLD: u64 = 5;

/// Thresholds the optimizer compares the counters against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerSettings {
  /// Resolutions above which a transient binding is suggested for promotion.
  pub promotion_threshold: u64,
  /// Cross-domain resolutions above which relocation is suggested.
  pub domain_hop_threshold: u64,
}

impl Default for OptimizerSettings {
  fn default() -> Self {
    Self {
      promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
      domain_hop_threshold: DEFAULT_DOMAIN_HOP_THRESHOLD,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestion {
  /// A transient binding resolved often enough that sharing one instance
  /// would avoid repeated construction.
  PromoteToSingleton { key: TypeKey, resolutions: u64 },
  /// A dependency cycle that will fail at resolution time.
  BreakCycle { path: CyclePath },
  /// A contract resolved from outside its home domain often enough that
  /// moving it (or its callers) would save domain transitions.
  RelocateDomain {
    key: TypeKey,
    from: DomainId,
    to: DomainId,
    hops: u64,
  },
}

impl Suggestion {
  /// The key the suggestion is about; for cycles, the first key of the path.
  pub fn key(&self) -> Option<&TypeKey> {
    match self {
      Suggestion::PromoteToSingleton { key, .. } | Suggestion::RelocateDomain { key, .. } => {
        Some(key)
      }
      Suggestion::BreakCycle { path } => path.first(),
    }
  }
}

impl fmt::Display for Suggestion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Suggestion::PromoteToSingleton { key, resolutions } => write!(
        f,
        "promote {} to singleton ({} transient resolutions)",
        key, resolutions
      ),
      Suggestion::BreakCycle { path } => write!(f, "break dependency cycle {}", path),
      Suggestion::RelocateDomain { key, from, to, hops } => write!(
        f,
        "relocate {} or its callers: resolved {} times from {} while bound to {}",
        key, hops, from, to
      ),
    }
  }
}

/// Keys resolved more than the promotion threshold, busiest first.
pub(crate) fn frequently_used(counters: &[UsageCounter], settings: &OptimizerSettings) -> Vec<TypeKey> {
  let mut busy: Vec<&UsageCounter> = counters
    .iter()
    .filter(|counter| counter.resolutions > settings.promotion_threshold)
    .collect();
  busy.sort_by(|a, b| b.resolutions.cmp(&a.resolutions).then_with(|| a.key.cmp(&b.key)));
  busy.into_iter().map(|counter| counter.key.clone()).collect()
}

/// Derives the suggestions for one snapshot.
pub(crate) fn suggest(
  counters: &[UsageCounter],
  scopes: &HashMap<TypeKey, ScopeKind>,
  cycles: &BTreeSet<CyclePath>,
  hops: &[DomainHop],
  settings: &OptimizerSettings,
) -> Vec<Suggestion> {
  let mut suggestions = Vec::new();

  for counter in counters {
    if counter.resolutions > settings.promotion_threshold
      && scopes.get(&counter.key) == Some(&ScopeKind::Transient)
    {
      suggestions.push(Suggestion::PromoteToSingleton {
        key: counter.key.clone(),
        resolutions: counter.resolutions,
      });
    }
  }

  for path in cycles {
    suggestions.push(Suggestion::BreakCycle { path: path.clone() });
  }

  for hop in hops {
    if hop.count > settings.domain_hop_threshold {
      suggestions.push(Suggestion::RelocateDomain {
        key: hop.key.clone(),
        from: hop.from.clone(),
        to: hop.to.clone(),
        hops: hop.count,
      });
    }
  }

  suggestions
}
