use fibre_weave::{global, resolve, Container, ScopeKind, TypeKey, WeaveError};
use std::sync::Arc;

// --- Test Fixtures ---

// The trait must be Send + Sync for the container to accept it.
trait Greeter: Send + Sync {
  fn greet(&self) -> String;
}

struct EnglishGreeter;
impl Greeter for EnglishGreeter {
  fn greet(&self) -> String {
    "Hello!".to_string()
  }
}

#[derive(Debug, PartialEq, Eq)]
struct SimpleService {
  id: u32,
}

// --- Basic Tests ---

#[test]
fn test_unnamed_singleton_factory() {
  // Arrange
  global().add_singleton(|_| Ok(SimpleService { id: 101 }));

  // Act
  let r1 = resolve!(SimpleService);
  let r2 = resolve!(SimpleService);

  // Assert
  assert_eq!(r1.id, 101);
  // Ensure it's a singleton by checking pointer equality.
  assert!(Arc::ptr_eq(&r1, &r2));
}

#[test]
fn test_named_singleton_instance() {
  // Arrange
  global().add_instance_with_name("named_instance", SimpleService { id: 202 });

  // Act
  let r1 = resolve!(SimpleService, "named_instance");
  let r2 = resolve!(SimpleService, "named_instance");

  // Assert
  assert_eq!(r1.id, 202);
  assert!(Arc::ptr_eq(&r1, &r2));
}

#[test]
fn test_unnamed_transient_factory() {
  // Arrange
  // Unique type to avoid clashing with other tests on the global container.
  struct TransientService {
    id: u32,
  }
  global().add_transient(|_| Ok(TransientService { id: 303 }));

  // Act
  let r1 = resolve!(TransientService);
  let r2 = resolve!(TransientService);

  // Assert
  assert_eq!(r1.id, 303);
  assert_eq!(r2.id, 303);
  // Ensure it's a transient by checking the pointers are different.
  assert!(!Arc::ptr_eq(&r1, &r2));
}

#[test]
fn test_unnamed_trait_resolution() {
  // Arrange: the factory hands back the Arc'd trait object.
  global().add_singleton_trait::<dyn Greeter, _>(|_| Ok(Arc::new(EnglishGreeter)));

  // Act
  let greeter = resolve!(trait Greeter);

  // Assert
  assert_eq!(greeter.greet(), "Hello!");
}

#[test]
fn test_named_trait_resolution() {
  // Arrange
  struct GermanGreeter;
  impl Greeter for GermanGreeter {
    fn greet(&self) -> String {
      "Hallo!".to_string()
    }
  }
  global()
    .add_singleton_trait_with_name::<dyn Greeter, _>("german", |_| Ok(Arc::new(GermanGreeter)));

  // Act
  let greeter = resolve!(trait Greeter, "german");

  // Assert
  assert_eq!(greeter.greet(), "Hallo!");
}

#[test]
fn test_missing_service_is_an_error() {
  #[derive(Debug)]
  struct MissingService;
  let container = Container::new();

  // Act
  let err = container.resolve::<MissingService>().unwrap_err();

  // Assert: a missing binding is reported, never papered over.
  assert!(matches!(
    err,
    WeaveError::DependencyNotFound { ref key } if *key == TypeKey::of::<MissingService>()
  ));
  assert!(err.is_recoverable());
}

#[test]
fn test_lookup_does_not_construct() {
  // Arrange
  struct Lazy;
  let container = Container::new();
  container.add_singleton(|_| -> fibre_weave::Result<Lazy> {
    panic!("the factory must not run on lookup")
  });

  // Act
  let registration = container.lookup(&TypeKey::of::<Lazy>()).unwrap();

  // Assert
  assert_eq!(*registration.scope(), ScopeKind::Singleton);
  assert!(!registration.has_fallback());
  assert!(container.cached_instances().is_empty());
}

#[test]
fn test_release_removes_binding_and_instance() {
  // Arrange
  let container = Container::new();
  container.add_singleton(|_| Ok(SimpleService { id: 7 }));
  container.resolve::<SimpleService>().unwrap();

  // Act & Assert
  // 1. The first release finds the binding, the second finds nothing.
  assert!(container.release(&TypeKey::of::<SimpleService>()));
  assert!(!container.release(&TypeKey::of::<SimpleService>()));

  // 2. The cached instance went with it.

  assert!(container.cached_instances().is_empty());
  assert!(matches!(
    container.resolve::<SimpleService>(),
    Err(WeaveError::DependencyNotFound { .. })
  ));
}

#[test]
fn test_release_all_empties_the_container() {
  // Arrange
  let container = Container::new();
  container.add_instance(1u8);
  container.add_singleton(|_| Ok(SimpleService { id: 9 }));
  container.resolve::<SimpleService>().unwrap();

  // Act
  container.release_all();

  // Assert
  assert!(!container.contains(&TypeKey::of::<u8>()));
  assert!(container.cached_instances().is_empty());
  assert!(container.resolve::<u8>().is_err());
}

#[test]
#[should_panic(expected = "Failed to resolve required service")]
fn test_resolve_panics_on_missing_concrete_service() {
  struct MissingService;
  resolve!(MissingService);
}

#[test]
#[should_panic(expected = "Failed to resolve required trait service")]
fn test_resolve_panics_on_missing_trait_service() {
  trait MissingTrait: Send + Sync {}
  resolve!(trait MissingTrait);
}
