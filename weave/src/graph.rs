//! Observed "depends on" relationships and cycle analysis.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::Write as _;

use crate::key::TypeKey;

/// A dependency cycle, listed from its first key back to that same key
/// (`[A, B, A]` for `A -> B -> A`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CyclePath(Vec<TypeKey>);

impl CyclePath {
  pub(crate) fn new(keys: Vec<TypeKey>) -> Self {
    Self(keys)
  }

  pub fn keys(&self) -> &[TypeKey] {
    &self.0
  }

  pub fn first(&self) -> Option<&TypeKey> {
    self.0.first()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Whether `key` takes part in the cycle.
  pub fn contains(&self, key: &TypeKey) -> bool {
    self.0.contains(key)
  }

  /// Rotates the cycle so that it starts at its smallest key. Two walks of
  /// the same cycle entered at different keys normalize to the same path.
  fn normalized(mut self) -> Self {
    if self.0.len() < 2 {
      return self;
    }
    // Drop the closing repetition, rotate, close again.
    self.0.pop();
    if let Some(min_at) = self
      .0
      .iter()
      .enumerate()
      .min_by(|(_, a), (_, b)| a.cmp(b))
      .map(|(i, _)| i)
    {
      self.0.rotate_left(min_at);
    }
    let head = self.0[0].clone();
    self.0.push(head);
    self
  }
}

impl fmt::Debug for CyclePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.0.iter()).finish()
  }
}

impl fmt::Display for CyclePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, key) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(" -> ")?;
      }
      write!(f, "{}", key)?;
    }
    Ok(())
  }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
  White,
  Grey,
  Black,
}

/// Directed graph of dependency edges, `from` requires `to`.
///
/// Adjacency is kept ordered so that rendering and cycle reports are
/// deterministic.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
  edges: BTreeMap<TypeKey, BTreeSet<TypeKey>>,
}

impl DependencyGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Inserts `from -> to`. Returns `false` if the edge was already known.
  pub fn record_edge(&mut self, from: TypeKey, to: TypeKey) -> bool {
    self.edges.entry(from).or_default().insert(to)
  }

  /// Inserts `from -> to` unless it would close a cycle, in which case the
  /// would-be cycle is returned and the graph is left untouched.
  pub fn try_record_edge(&mut self, from: &TypeKey, to: &TypeKey) -> Result<bool, CyclePath> {
    if self.has_edge(from, to) {
      return Ok(false);
    }
    if let Some(mut path) = self.path(to, from) {
      // path runs to ..= from; closing edge from -> to completes it.
      path.push(to.clone());
      return Err(CyclePath::new(path));
    }
    Ok(self.record_edge(from.clone(), to.clone()))
  }

  pub fn has_edge(&self, from: &TypeKey, to: &TypeKey) -> bool {
    self
      .edges
      .get(from)
      .map_or(false, |targets| targets.contains(to))
  }

  /// Finds a path `from ..= to` following edges, depth first. A key always
  /// reaches itself.
  pub fn path(&self, from: &TypeKey, to: &TypeKey) -> Option<Vec<TypeKey>> {
    let mut visited = BTreeSet::new();
    let mut path = Vec::new();
    if self.walk(from, to, &mut visited, &mut path) {
      Some(path)
    } else {
      None
    }
  }

  fn walk<'g>(
    &'g self,
    node: &'g TypeKey,
    target: &TypeKey,
    visited: &mut BTreeSet<&'g TypeKey>,
    path: &mut Vec<TypeKey>,
  ) -> bool {
    path.push(node.clone());
    if node == target {
      return true;
    }
    if visited.insert(node) {
      if let Some(targets) = self.edges.get(node) {
        for next in targets {
          if self.walk(next, target, visited, path) {
            return true;
          }
        }
      }
    }
    path.pop();
    false
  }

  /// Every cycle reachable in the graph, each normalized to start at its
  /// smallest key.
  ///
  /// Depth-first search with white/grey/black colouring: meeting a grey node
  /// means the current path loops back onto itself.
  pub fn detect_cycles(&self) -> BTreeSet<CyclePath> {
    let mut colors: BTreeMap<&TypeKey, Color> = BTreeMap::new();
    let mut stack: Vec<&TypeKey> = Vec::new();
    let mut cycles = BTreeSet::new();

    for node in self.nodes() {
      if colors.get(node).copied().unwrap_or(Color::White) == Color::White {
        self.visit(node, &mut colors, &mut stack, &mut cycles);
      }
    }
    cycles
  }

  fn visit<'g>(
    &'g self,
    node: &'g TypeKey,
    colors: &mut BTreeMap<&'g TypeKey, Color>,
    stack: &mut Vec<&'g TypeKey>,
    cycles: &mut BTreeSet<CyclePath>,
  ) {
    colors.insert(node, Color::Grey);
    stack.push(node);

    if let Some(targets) = self.edges.get(node) {
      for next in targets {
        match colors.get(next).copied().unwrap_or(Color::White) {
          Color::White => self.visit(next, colors, stack, cycles),
          Color::Grey => {
            if let Some(start) = stack.iter().position(|k| *k == next) {
              let mut keys: Vec<TypeKey> = stack[start..].iter().map(|k| (*k).clone()).collect();
              keys.push(next.clone());
              cycles.insert(CyclePath::new(keys).normalized());
            }
          }
          Color::Black => {}
        }
      }
    }

    stack.pop();
    colors.insert(node, Color::Black);
  }

  /// All keys that appear in the graph, as a source or a target.
  pub fn nodes(&self) -> BTreeSet<&TypeKey> {
    let mut nodes = BTreeSet::new();
    for (from, targets) in &self.edges {
      nodes.insert(from);
      nodes.extend(targets.iter());
    }
    nodes
  }

  pub fn dependencies_of(&self, key: &TypeKey) -> Vec<TypeKey> {
    self
      .edges
      .get(key)
      .map(|targets| targets.iter().cloned().collect())
      .unwrap_or_default()
  }

  pub fn dependents_of(&self, key: &TypeKey) -> Vec<TypeKey> {
    self
      .edges
      .iter()
      .filter(|(_, targets)| targets.contains(key))
      .map(|(from, _)| from.clone())
      .collect()
  }

  pub fn edge_count(&self) -> usize {
    self.edges.values().map(BTreeSet::len).sum()
  }

  /// Forgets what `key` was observed to depend on.
  pub fn remove_outgoing(&mut self, key: &TypeKey) {
    self.edges.remove(key);
  }

  pub fn clear(&mut self) {
    self.edges.clear();
  }

  /// Adjacency listing, one source per line.
  pub fn render(&self) -> String {
    let mut out = String::new();
    if self.edges.is_empty() {
      out.push_str("(no dependencies recorded)\n");
      return out;
    }
    for (from, targets) in &self.edges {
      let _ = write!(out, "{}", from);
      if targets.is_empty() {
        out.push('\n');
        continue;
      }
      out.push_str(" -> ");
      let joined = targets
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
      out.push_str(&joined);
      out.push('\n');
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct A;
  struct B;
  struct C;
  struct D;

  fn a() -> TypeKey {
    TypeKey::of::<A>()
  }
  fn b() -> TypeKey {
    TypeKey::of::<B>()
  }
  fn c() -> TypeKey {
    TypeKey::of::<C>()
  }
  fn d() -> TypeKey {
    TypeKey::of::<D>()
  }

  #[test]
  fn record_edge_is_idempotent() {
    let mut graph = DependencyGraph::new();
    assert!(graph.record_edge(a(), b()));
    assert!(!graph.record_edge(a(), b()));
    assert_eq!(graph.edge_count(), 1);
  }

  #[test]
  fn closing_edge_is_rejected_with_the_cycle() {
    let mut graph = DependencyGraph::new();
    graph.try_record_edge(&a(), &b()).unwrap();
    graph.try_record_edge(&b(), &c()).unwrap();

    let cycle = graph.try_record_edge(&c(), &a()).unwrap_err();
    assert_eq!(cycle.keys(), &[a(), b(), c(), a()]);
    assert!(!graph.has_edge(&c(), &a()));
    assert!(graph.detect_cycles().is_empty());
  }

  #[test]
  fn self_edge_is_a_cycle() {
    let mut graph = DependencyGraph::new();
    let cycle = graph.try_record_edge(&a(), &a()).unwrap_err();
    assert_eq!(cycle.keys(), &[a(), a()]);
  }

  #[test]
  fn detect_cycles_reports_each_cycle_once() {
    let mut graph = DependencyGraph::new();
    graph.record_edge(a(), b());
    graph.record_edge(b(), c());
    graph.record_edge(c(), a());
    graph.record_edge(c(), d());

    let cycles = graph.detect_cycles();
    assert_eq!(cycles.len(), 1);
    let cycle = cycles.iter().next().unwrap();
    assert_eq!(cycle.len(), 4);
    assert!(cycle.contains(&a()) && cycle.contains(&b()) && cycle.contains(&c()));
    assert!(!cycle.contains(&d()));
    assert_eq!(cycle.keys().first(), cycle.keys().last());
  }

  #[test]
  fn detect_cycles_finds_disjoint_cycles() {
    let mut graph = DependencyGraph::new();
    graph.record_edge(a(), b());
    graph.record_edge(b(), a());
    graph.record_edge(c(), d());
    graph.record_edge(d(), c());
    assert_eq!(graph.detect_cycles().len(), 2);
  }

  #[test]
  fn dependents_and_dependencies() {
    let mut graph = DependencyGraph::new();
    graph.record_edge(a(), c());
    graph.record_edge(b(), c());
    assert_eq!(graph.dependencies_of(&a()), vec![c()]);
    let mut dependents = graph.dependents_of(&c());
    dependents.sort();
    let mut expected = vec![a(), b()];
    expected.sort();
    assert_eq!(dependents, expected);
  }

  #[test]
  fn render_lists_adjacency() {
    let mut graph = DependencyGraph::new();
    assert_eq!(graph.render(), "(no dependencies recorded)\n");
    graph.record_edge(a(), b());
    let rendered = graph.render();
    assert!(rendered.contains(" -> "));
    assert_eq!(rendered.lines().count(), 1);
  }
}
