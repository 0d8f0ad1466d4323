//! Public macros for ergonomic service resolution.

/// Resolves a service from the global container, panicking on failure.
///
/// Intended for wiring code where a missing binding is a programming error.
/// Use [`maybe_resolve!`] or `global().resolve::<T>()` to handle failures.
///
/// # Panics
///
/// If the service is not registered or cannot be constructed. The message
/// carries the resolution error.
///
/// # Examples
///
/// ```
/// use fibre_weave::{global, resolve};
///
/// global().add_singleton(|_| Ok(String::from("hello")));
///
/// let message = resolve!(String);
/// assert_eq!(*message, "hello");
/// ```
///
/// ```
/// use fibre_weave::{global, resolve};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter { fn greet(&self) -> String { "Hello!".to_string() } }
///
/// global().add_singleton_trait::<dyn Greeter, _>(|_| Ok(Arc::new(EnglishGreeter)));
///
/// let greeter = resolve!(trait Greeter);
/// assert_eq!(greeter.greet(), "Hello!");
/// ```
#[macro_export]
macro_rules! resolve {
  (trait $trait_ident:ident) => {
    $crate::resolve_from!($crate::global(), trait $trait_ident)
  };
  (trait $trait_ident:ident, $name:expr) => {
    $crate::resolve_from!($crate::global(), trait $trait_ident, $name)
  };
  ($type:ty) => {
    $crate::resolve_from!($crate::global(), $type)
  };
  ($type:ty, $name:expr) => {
    $crate::resolve_from!($crate::global(), $type, $name)
  };
}

/// Resolves a service from the global container, yielding `None` on failure.
#[macro_export]
macro_rules! maybe_resolve {
  (trait $trait_ident:ident) => {
    $crate::maybe_resolve_from!($crate::global(), trait $trait_ident)
  };
  (trait $trait_ident:ident, $name:expr) => {
    $crate::maybe_resolve_from!($crate::global(), trait $trait_ident, $name)
  };
  ($type:ty) => {
    $crate::maybe_resolve_from!($crate::global(), $type)
  };
  ($type:ty, $name:expr) => {
    $crate::maybe_resolve_from!($crate::global(), $type, $name)
  };
}

/// Like [`resolve!`], against an explicit container.
///
/// ```
/// use fibre_weave::{resolve_from, Container};
///
/// let container = Container::new();
/// container.add_instance(7u32);
/// assert_eq!(*resolve_from!(container, u32), 7);
/// ```
#[macro_export]
macro_rules! resolve_from {
  ($container:expr, trait $trait_ident:ident) => {
    $container
      .resolve::<dyn $trait_ident>()
      .unwrap_or_else(|err| {
        panic!(
          "Failed to resolve required trait service {}: {}",
          std::any::type_name::<dyn $trait_ident>(),
          err
        )
      })
  };
  ($container:expr, trait $trait_ident:ident, $name:expr) => {
    $container
      .resolve_named::<dyn $trait_ident>($name)
      .unwrap_or_else(|err| {
        panic!(
          "Failed to resolve required trait service {} with name '{}': {}",
          std::any::type_name::<dyn $trait_ident>(),
          $name,
          err
        )
      })
  };
  ($container:expr, $type:ty) => {
    $container.resolve::<$type>().unwrap_or_else(|err| {
      panic!(
        "Failed to resolve required service {}: {}",
        std::any::type_name::<$type>(),
        err
      )
    })
  };
  ($container:expr, $type:ty, $name:expr) => {
    $container
      .resolve_named::<$type>($name)
      .unwrap_or_else(|err| {
        panic!(
          "Failed to resolve required service {} with name '{}': {}",
          std::any::type_name::<$type>(),
          $name,
          err
        )
      })
  };
}

/// Like [`maybe_resolve!`], against an explicit container.
#[macro_export]
macro_rules! maybe_resolve_from {
  ($container:expr, trait $trait_ident:ident) => {
    $container.resolve::<dyn $trait_ident>().ok()
  };
  ($container:expr, trait $trait_ident:ident, $name:expr) => {
    $container.resolve_named::<dyn $trait_ident>($name).ok()
  };
  ($container:expr, $type:ty) => {
    $container.resolve::<$type>().ok()
  };
  ($container:expr, $type:ty, $name:expr) => {
    $container.resolve_named::<$type>($name).ok()
  };
}
