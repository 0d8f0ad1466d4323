use fibre_weave::{Container, ScopeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct RequestContext {
  request_no: usize,
}

static REQUESTS: AtomicUsize = AtomicUsize::new(0);

fn main() {
  let container = Container::new();
  container.add_scoped("background", |_| {
    Ok(RequestContext {
      request_no: REQUESTS.fetch_add(1, Ordering::SeqCst),
    })
  });

  for id in ["req-1", "req-2"] {
    let scope = container.enter_scope(id);
    let a = scope.resolve::<RequestContext>().unwrap();
    let b = scope.resolve::<RequestContext>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    println!("{} -> request #{}", scope.id(), a.request_no);
    // Leaving the block drops the handle and ends the scope.
  }

  // Outside any handle the registration's own scope id applies.
  let background = container.resolve::<RequestContext>().unwrap();
  println!("background -> request #{}", background.request_no);

  // Scopes can also be driven by hand.
  let batch = ScopeId::from("batch-9");
  let first = container.resolve_in_scope::<RequestContext>(&batch).unwrap();
  container.end_scope(&batch);
  let second = container.resolve_in_scope::<RequestContext>(&batch).unwrap();
  assert!(!Arc::ptr_eq(&first, &second));

  for cached in container.cached_instances() {
    println!("cached: {} in {:?}", cached.key, cached.scope);
  }
}
