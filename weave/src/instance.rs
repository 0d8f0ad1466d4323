//! Type-erased instances as stored by the cache and handed to waiters.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// A materialized instance with its concrete `Arc<T>` erased.
///
/// The erased value is always an `Arc<T>` (so trait objects are supported),
/// wrapped in an outer `Arc` so that copying an instance out of the cache is
/// one reference-count increment.
#[derive(Clone)]
pub(crate) struct Instance {
  value: Arc<dyn Any + Send + Sync>,
}

impl Instance {
  pub(crate) fn new<T: ?Sized + Any + Send + Sync>(value: Arc<T>) -> Self {
    Self {
      value: Arc::new(value),
    }
  }

  pub(crate) fn downcast<T: ?Sized + Any + Send + Sync>(&self) -> Option<Arc<T>> {
    self.value.downcast_ref::<Arc<T>>().cloned()
  }
}

impl fmt::Debug for Instance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Instance(..)")
  }
}

/// Produces the weak form of an instance. Monomorphized per registration so
/// the cache never needs to know `T`.
pub(crate) type Downgrade = fn(&Instance) -> Option<WeakInstance>;

pub(crate) fn downgrade<T: ?Sized + Any + Send + Sync>(instance: &Instance) -> Option<WeakInstance> {
  instance.value.downcast_ref::<Arc<T>>().map(|strong| WeakInstance {
    slot: Arc::new(WeakSlot(Arc::downgrade(strong))),
  })
}

trait ErasedWeak: Send + Sync {
  fn upgrade(&self) -> Option<Instance>;
  fn is_alive(&self) -> bool;
}

struct WeakSlot<T: ?Sized>(Weak<T>);

impl<T: ?Sized + Any + Send + Sync> ErasedWeak for WeakSlot<T> {
  fn upgrade(&self) -> Option<Instance> {
    self.0.upgrade().map(Instance::new)
  }

  fn is_alive(&self) -> bool {
    self.0.strong_count() > 0
  }
}

/// A weakly held instance; the memory is reclaimed once every caller has
/// dropped its `Arc`.
#[derive(Clone)]
pub(crate) struct WeakInstance {
  slot: Arc<dyn ErasedWeak>,
}

impl WeakInstance {
  pub(crate) fn upgrade(&self) -> Option<Instance> {
    self.slot.upgrade()
  }

  pub(crate) fn is_alive(&self) -> bool {
    self.slot.is_alive()
  }
}
