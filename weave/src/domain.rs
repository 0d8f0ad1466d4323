//! Concurrency domains: the executor or thread identity a resolution is made
//! from, tracked so that frequent cross-domain resolutions can be flagged.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

thread_local! {
  static CURRENT_DOMAIN: RefCell<Vec<DomainId>> = const { RefCell::new(Vec::new()) };
}

/// Name of a concurrency domain, such as `"ui"` or `"io-pool"`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainId(Arc<str>);

impl DomainId {
  pub fn new(id: impl AsRef<str>) -> Self {
    Self(Arc::from(id.as_ref()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The implicit domain of the calling thread: its name, or its id when
  /// the thread is unnamed.
  fn of_current_thread() -> Self {
    let thread = std::thread::current();
    match thread.name() {
      Some(name) => Self::new(format!("thread:{}", name)),
      None => Self::new(format!("thread:{:?}", thread.id())),
    }
  }
}

impl From<&str> for DomainId {
  fn from(id: &str) -> Self {
    Self::new(id)
  }
}

impl From<String> for DomainId {
  fn from(id: String) -> Self {
    Self(Arc::from(id))
  }
}

impl fmt::Debug for DomainId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "DomainId({})", self.0)
  }
}

impl fmt::Display for DomainId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// The domain the calling code runs in: the innermost entered domain, or
/// the thread's implicit domain.
pub fn current_domain() -> DomainId {
  CURRENT_DOMAIN
    .with(|stack| stack.borrow().last().cloned())
    .unwrap_or_else(DomainId::of_current_thread)
}

/// Marks the calling thread as running inside `domain` until the returned
/// guard is dropped. Domains nest.
///
/// ```
/// use fibre_weave::{current_domain, enter_domain, DomainId};
///
/// let _ui = enter_domain("ui");
/// assert_eq!(current_domain(), DomainId::from("ui"));
/// {
///   let _io = enter_domain("io");
///   assert_eq!(current_domain(), DomainId::from("io"));
/// }
/// assert_eq!(current_domain(), DomainId::from("ui"));
/// ```
pub fn enter_domain(domain: impl Into<DomainId>) -> DomainGuard {
  CURRENT_DOMAIN.with(|stack| stack.borrow_mut().push(domain.into()));
  DomainGuard { _private: () }
}

/// Leaves the entered domain on drop.
#[must_use = "the domain is left as soon as the guard is dropped"]
pub struct DomainGuard {
  _private: (),
}

impl Drop for DomainGuard {
  fn drop(&mut self) {
    CURRENT_DOMAIN.with(|stack| {
      stack.borrow_mut().pop();
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unnamed_domain_falls_back_to_the_thread() {
    let domain = std::thread::Builder::new()
      .name("worker-7".into())
      .spawn(current_domain)
      .unwrap()
      .join()
      .unwrap();
    assert_eq!(domain.as_str(), "thread:worker-7");
  }

  #[test]
  fn guards_nest() {
    let outer = enter_domain("outer");
    {
      let _inner = enter_domain("inner");
      assert_eq!(current_domain().as_str(), "inner");
    }
    assert_eq!(current_domain().as_str(), "outer");
    drop(outer);
    assert!(current_domain().as_str().starts_with("thread:"));
  }
}
