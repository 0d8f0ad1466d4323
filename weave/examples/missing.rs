use fibre_weave::{global, resolve, WeaveError};
use std::panic;
use std::sync::Arc;

trait PaymentGateway: Send + Sync {
  fn charge(&self, cents: u64) -> Result<(), String>;
}

struct NoOpGateway;
impl PaymentGateway for NoOpGateway {
  fn charge(&self, cents: u64) -> Result<(), String> {
    println!("(no-op) would charge {} cents", cents);
    Ok(())
  }
}

struct UnregisteredService;

fn main() {
  // --- The panicking `resolve!` macro ---
  println!("Attempting to resolve a service that was never registered...");
  let result = panic::catch_unwind(|| {
    let _service = resolve!(UnregisteredService);
  });
  assert!(result.is_err(), "resolve! should have panicked.");
  println!("Caught the expected panic from resolve!.");

  // --- The fallible `resolve()` method ---
  match global().resolve::<UnregisteredService>() {
    Err(WeaveError::DependencyNotFound { key }) => println!("\nNot registered: {}", key),
    Err(other) => panic!("unexpected error: {}", other),
    Ok(_) => panic!("Should not have found the service!"),
  }

  // --- Fallbacks ---
  let gateway = global().resolve_or_default::<dyn PaymentGateway>(Arc::new(NoOpGateway));
  gateway.charge(1999).unwrap();

  let gateway = global()
    .resolve_or_else::<dyn PaymentGateway, _>(|| Arc::new(NoOpGateway))
    .unwrap();
  gateway.charge(500).unwrap();
}
