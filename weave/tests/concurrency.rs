//! Single-flight construction, waiting and timeouts under real threads.

use fibre_weave::{Container, ScopeId, TypeKey, WeaveError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn tracked_container() -> Container {
  let container = Container::new();
  container.set_optimization_enabled(true);
  container
}

#[test]
fn test_concurrent_singleton_is_constructed_once() {
  struct Registry;
  let constructions = Arc::new(AtomicUsize::new(0));

  let container = tracked_container();
  let counter = constructions.clone();
  container.add_singleton(move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    Ok(Registry)
  });

  let barrier = Barrier::new(10);
  let resolved: Vec<Arc<Registry>> = thread::scope(|s| {
    let handles: Vec<_> = (0..10)
      .map(|_| {
        s.spawn(|| {
          barrier.wait();
          (0..5)
            .map(|_| container.resolve::<Registry>().unwrap())
            .collect::<Vec<_>>()
        })
      })
      .collect();
    handles
      .into_iter()
      .flat_map(|handle| handle.join().unwrap())
      .collect()
  });

  assert_eq!(constructions.load(Ordering::SeqCst), 1);
  assert_eq!(resolved.len(), 50);
  assert!(resolved.iter().all(|r| Arc::ptr_eq(r, &resolved[0])));

  let snapshot = container.snapshot();
  assert_eq!(snapshot.resolutions(&TypeKey::of::<Registry>()), 50);
}

/// Races ten threads on one resolution and returns every instance they got.
/// The returned `Arc`s stay alive until the caller drops them.
fn race<T: Send + Sync>(resolve: impl Fn() -> Arc<T> + Sync) -> Vec<Arc<T>> {
  let barrier = Barrier::new(10);
  thread::scope(|s| {
    let handles: Vec<_> = (0..10)
      .map(|_| {
        s.spawn(|| {
          barrier.wait();
          resolve()
        })
      })
      .collect();
    handles
      .into_iter()
      .map(|handle| handle.join().unwrap())
      .collect()
  })
}

#[test]
fn test_concurrent_weak_singleton_is_constructed_once() {
  struct Session;
  let constructions = Arc::new(AtomicUsize::new(0));

  let container = tracked_container();
  let counter = constructions.clone();
  container.add_weak_singleton(move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    Ok(Session)
  });

  // Act: every racer keeps its instance alive while the others resolve.
  let resolved = race(|| container.resolve::<Session>().unwrap());

  // Assert
  assert_eq!(constructions.load(Ordering::SeqCst), 1);
  assert!(resolved.iter().all(|r| Arc::ptr_eq(r, &resolved[0])));

  // Once every holder is gone the next resolve builds again.
  drop(resolved);
  container.resolve::<Session>().unwrap();
  assert_eq!(constructions.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_scoped_is_constructed_once_per_scope() {
  struct RequestContext;
  let constructions = Arc::new(AtomicUsize::new(0));

  let container = tracked_container();
  let counter = constructions.clone();
  container.add_scoped("request", move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    Ok(RequestContext)
  });

  // Act: all racers resolve under the same scope id.
  let scope = ScopeId::from("request-7");
  let resolved = race(|| container.resolve_in_scope::<RequestContext>(&scope).unwrap());

  // Assert
  assert_eq!(constructions.load(Ordering::SeqCst), 1);
  assert!(resolved.iter().all(|r| Arc::ptr_eq(r, &resolved[0])));

  // A different scope id gets its own instance.
  let other = container
    .resolve_in_scope::<RequestContext>(&ScopeId::from("request-8"))
    .unwrap();
  assert!(!Arc::ptr_eq(&other, &resolved[0]));
  assert_eq!(constructions.load(Ordering::SeqCst), 2);
}

#[test]
fn test_waiter_times_out_while_leader_finishes() {
  #[derive(Debug)]
  struct SlowService;
  let constructions = Arc::new(AtomicUsize::new(0));

  let container = Container::new();
  let counter = constructions.clone();
  container.add_singleton(move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(300));
    Ok(SlowService)
  });

  thread::scope(|s| {
    let leader = s.spawn(|| container.resolve::<SlowService>().unwrap());

    // Let the leader take the construction.
    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    let err = container
      .resolve_timeout::<SlowService>(Duration::from_millis(50))
      .unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(250));
    match err {
      WeaveError::ResolutionTimeout { key, timeout } => {
        assert_eq!(key, TypeKey::of::<SlowService>());
        assert_eq!(timeout, Duration::from_millis(50));
      }
      other => panic!("unexpected error: {:?}", other),
    }

    // The construction was not cancelled and is cached for later callers.
    let first = leader.join().unwrap();
    let later = container.resolve::<SlowService>().unwrap();
    assert!(Arc::ptr_eq(&first, &later));
  });

  assert_eq!(constructions.load(Ordering::SeqCst), 1);
}

#[test]
fn test_default_timeout_applies_without_explicit_one() {
  struct SlowService;
  let container = Container::new();
  container.set_default_timeout(Some(Duration::from_millis(40)));
  container.add_singleton(|_| {
    thread::sleep(Duration::from_millis(250));
    Ok(SlowService)
  });

  thread::scope(|s| {
    let leader = s.spawn(|| container.resolve::<SlowService>());
    thread::sleep(Duration::from_millis(50));

    assert!(matches!(
      container.resolve::<SlowService>(),
      Err(WeaveError::ResolutionTimeout { .. })
    ));
    // The leader itself is never cut short.
    assert!(leader.join().unwrap().is_ok());
  });
}

#[test]
fn test_waiters_retry_after_failed_construction() {
  struct Flaky;
  let attempts = Arc::new(AtomicUsize::new(0));

  let container = Container::new();
  let counter = attempts.clone();
  container.add_singleton(move |_| {
    let attempt = counter.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(60));
    if attempt == 0 {
      Err(WeaveError::custom("warming up"))
    } else {
      Ok(Flaky)
    }
  });

  thread::scope(|s| {
    let first = s.spawn(|| container.resolve::<Flaky>());
    thread::sleep(Duration::from_millis(20));
    let second = s.spawn(|| container.resolve::<Flaky>());

    assert!(matches!(
      first.join().unwrap(),
      Err(WeaveError::FactoryFailed { .. })
    ));
    assert!(second.join().unwrap().is_ok());
  });

  assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_panicking_factory_releases_waiters() {
  struct Fragile;
  let attempts = Arc::new(AtomicUsize::new(0));

  let container = Container::new();
  let counter = attempts.clone();
  container.add_singleton(move |_| {
    let attempt = counter.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(60));
    if attempt == 0 {
      panic!("first construction blows up");
    }
    Ok(Fragile)
  });

  thread::scope(|s| {
    let first = s.spawn(|| container.resolve::<Fragile>().map(|_| ()));
    thread::sleep(Duration::from_millis(20));
    let second = s.spawn(|| container.resolve::<Fragile>().map(|_| ()));

    assert!(first.join().is_err());
    assert!(second.join().unwrap().is_ok());
  });

  assert!(container.resolve::<Fragile>().is_ok());
  assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_nested_singletons_resolve_concurrently_without_deadlock() {
  struct Config;
  struct Pool {
    _config: Arc<Config>,
  }
  struct Service {
    _pool: Arc<Pool>,
  }

  let container = Container::new();
  container.add_singleton(|_| {
    thread::sleep(Duration::from_millis(10));
    Ok(Config)
  });
  container.add_singleton(|c| {
    Ok(Pool {
      _config: c.resolve()?,
    })
  });
  container.add_singleton(|c| {
    Ok(Service {
      _pool: c.resolve()?,
    })
  });

  thread::scope(|s| {
    for i in 0..8 {
      let container = &container;
      s.spawn(move || {
        if i % 2 == 0 {
          container.resolve::<Service>().unwrap();
        } else {
          container.resolve::<Pool>().unwrap();
        }
      });
    }
  });

  let service = container.resolve::<Service>().unwrap();
  let pool = container.resolve::<Pool>().unwrap();
  assert!(Arc::ptr_eq(&service._pool, &pool));
}
