//! Per call chain resolution stack used to catch cycles synchronously.

use std::cell::RefCell;

use crate::graph::CyclePath;
use crate::key::TypeKey;

thread_local! {
  // Keys currently being constructed on this thread, innermost last, tagged
  // with the id of the container doing the constructing so that nested
  // containers do not see each other's entries.
  static RESOLVING_STACK: RefCell<Vec<(u64, TypeKey)>> = const { RefCell::new(Vec::new()) };
}

/// If `key` is already being resolved by this call chain, the cycle from
/// its first occurrence back to itself.
pub(crate) fn cycle_for(container: u64, key: &TypeKey) -> Option<CyclePath> {
  RESOLVING_STACK.with(|stack| {
    let stack = stack.borrow();
    let start = stack
      .iter()
      .position(|(owner, k)| *owner == container && k == key)?;
    let mut path: Vec<TypeKey> = stack[start..]
      .iter()
      .filter(|(owner, _)| *owner == container)
      .map(|(_, k)| k.clone())
      .collect();
    path.push(key.clone());
    Some(CyclePath::new(path))
  })
}

/// The key whose factory is currently running in this call chain, if any.
pub(crate) fn enclosing(container: u64) -> Option<TypeKey> {
  RESOLVING_STACK.with(|stack| {
    stack
      .borrow()
      .iter()
      .rev()
      .find(|(owner, _)| *owner == container)
      .map(|(_, k)| k.clone())
  })
}

/// RAII entry on the resolution stack.
///
/// Pushed right before a factory runs and popped when the guard drops, so
/// the stack stays balanced even when a factory fails or panics.
pub(crate) struct ResolutionGuard {
  container: u64,
  key: TypeKey,
}

impl ResolutionGuard {
  pub(crate) fn push(container: u64, key: TypeKey) -> Self {
    RESOLVING_STACK.with(|stack| stack.borrow_mut().push((container, key.clone())));
    Self { container, key }
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLVING_STACK.with(|stack| {
      let mut stack = stack.borrow_mut();
      if let Some(pos) = stack
        .iter()
        .rposition(|(owner, k)| *owner == self.container && *k == self.key)
      {
        stack.remove(pos);
      }
    });
  }
}
