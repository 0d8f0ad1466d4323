//! The process-wide container.

use crate::container::Container;
use once_cell::sync::Lazy;

// Created on first access, configured with the defaults.
static GLOBAL_CONTAINER: Lazy<Container> = Lazy::new(Container::default);

/// The global container, for registering and resolving from anywhere in an
/// application. Independent containers can still be created with
/// [`Container::new`].
///
/// ```
/// use fibre_weave::global;
///
/// global().add_instance_with_name("motd", String::from("Hello from global!"));
/// assert_eq!(*global().resolve_named::<String>("motd").unwrap(), "Hello from global!");
/// ```
pub fn global() -> &'static Container {
  &GLOBAL_CONTAINER
}
