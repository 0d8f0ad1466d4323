use fibre_weave::{Container, ResolveOptions, TypeKey, WeaveError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[tokio::test]
async fn test_resolve_async_returns_cached_singleton() {
  struct Client;
  let container = Container::new();
  container.add_singleton(|_| Ok(Client));

  let first = container.resolve_async::<Client>().await.unwrap();
  let second = container.resolve::<Client>().unwrap();

  assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_callers_share_one_construction() {
  struct Pool;
  static BUILT: AtomicUsize = AtomicUsize::new(0);

  let container = Arc::new(Container::new());
  container.add_singleton(|_| {
    BUILT.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    Ok(Pool)
  });

  let tasks: Vec<_> = (0..8)
    .map(|_| {
      let container = container.clone();
      tokio::spawn(async move { container.resolve_async::<Pool>().await.map(|_| ()) })
    })
    .collect();

  for task in tasks {
    task.await.unwrap().unwrap();
  }
  assert_eq!(BUILT.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_callers_share_one_scoped_construction() {
  struct Unit;
  static BUILT: AtomicUsize = AtomicUsize::new(0);

  let container = Arc::new(Container::new());
  container.add_scoped("job", |_| {
    BUILT.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    Ok(Unit)
  });

  let tasks: Vec<_> = (0..8)
    .map(|_| {
      let container = container.clone();
      tokio::spawn(async move {
        container
          .resolve_async_with::<Unit>(ResolveOptions::new().in_scope("job-1"))
          .await
      })
    })
    .collect();

  let mut resolved = Vec::new();
  for task in tasks {
    resolved.push(task.await.unwrap().unwrap());
  }
  assert_eq!(BUILT.load(Ordering::SeqCst), 1);
  assert!(resolved.iter().all(|r| Arc::ptr_eq(r, &resolved[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_timeout_leaves_construction_running() {
  #[derive(Debug)]
  struct Slow;
  let container = Arc::new(Container::new());
  container.add_singleton(|_| {
    thread::sleep(Duration::from_millis(300));
    Ok(Slow)
  });

  let leader = {
    let container = container.clone();
    thread::spawn(move || container.resolve::<Slow>().map(|_| ()))
  };
  tokio::time::sleep(Duration::from_millis(50)).await;

  let err = container
    .resolve_async_timeout::<Slow>(Duration::from_millis(30))
    .await
    .unwrap_err();
  match err {
    WeaveError::ResolutionTimeout { key, .. } => assert_eq!(key, TypeKey::of::<Slow>()),
    other => panic!("unexpected error: {:?}", other),
  }

  leader.join().unwrap().unwrap();
  assert!(container.resolve::<Slow>().is_ok());
}

#[tokio::test]
async fn test_async_missing_binding() {
  struct Missing;
  let container = Container::new();
  assert!(matches!(
    container.resolve_async::<Missing>().await,
    Err(WeaveError::DependencyNotFound { .. })
  ));
}
