use fibre_weave::{global, resolve};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

// Gets a unique id upon creation.
struct RequestTracker {
  id: usize,
}

static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn main() {
  // --- Singleton Registration ---
  // Called once, no matter how often the tracker is resolved.
  global().add_singleton_with_name("singleton_tracker", |_| {
    println!("Creating SINGLETON RequestTracker...");
    Ok(RequestTracker {
      id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
    })
  });

  // --- Transient Registration ---
  // Called on every resolution.
  global().add_transient_with_name("transient_tracker", |_| {
    println!("Creating TRANSIENT RequestTracker...");
    Ok(RequestTracker {
      id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
    })
  });

  println!("--- Resolving Singletons ---");
  let s1 = resolve!(RequestTracker, "singleton_tracker");
  let s2 = resolve!(RequestTracker, "singleton_tracker");
  println!("Singleton 1 ID: {}, Singleton 2 ID: {}", s1.id, s2.id);
  assert_eq!(s1.id, 0);
  assert!(Arc::ptr_eq(&s1, &s2), "Singleton instances should be identical");

  println!("\n--- Resolving Transients ---");
  let t1 = resolve!(RequestTracker, "transient_tracker");
  let t2 = resolve!(RequestTracker, "transient_tracker");
  println!("Transient 1 ID: {}, Transient 2 ID: {}", t1.id, t2.id);
  assert_eq!(t1.id, 1);
  assert_eq!(t2.id, 2);
  assert!(!Arc::ptr_eq(&t1, &t2), "Transient instances should be different");

  println!("\n--- Weak Singletons ---");
  global().add_weak_singleton(|_| {
    println!("Creating WEAK RequestTracker...");
    Ok(RequestTracker {
      id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
    })
  });
  let w1 = resolve!(RequestTracker);
  let w2 = resolve!(RequestTracker);
  assert!(Arc::ptr_eq(&w1, &w2));
  drop((w1, w2));
  // Nobody holds it anymore, so the next resolution builds a new one.
  let w3 = resolve!(RequestTracker);
  println!("Rebuilt weak singleton has ID {}", w3.id);
  assert_eq!(w3.id, 4);
}
