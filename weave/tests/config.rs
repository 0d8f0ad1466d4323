use fibre_weave::config::WeaveConfig;
use fibre_weave::{ConfigError, Container, WeaveError};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::thread;
use std::time::Duration;

#[test]
fn test_container_from_yaml_file() {
  let mut file = tempfile::NamedTempFile::new().unwrap();
  writeln!(
    file,
    "optimization:\n  enabled: true\n  debounce: 120ms\n  promotion_threshold: 3\nresolution:\n  default_timeout: 2s"
  )
  .unwrap();

  let config = WeaveConfig::from_file(file.path()).unwrap();
  let container = Container::with_config(config.clone());

  assert_eq!(container.config(), config);
  assert!(container.is_optimization_enabled());
  assert_eq!(container.config().default_timeout, Some(Duration::from_secs(2)));
}

#[test]
fn test_container_from_json_file() {
  let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
  write!(
    file,
    r#"{{"optimization": {{"enabled": false, "domain_hop_threshold": 9}}}}"#
  )
  .unwrap();

  let config = WeaveConfig::from_file(file.path()).unwrap();

  assert!(!config.optimization_enabled);
  assert_eq!(config.optimizer.domain_hop_threshold, 9);
}

#[test]
fn test_missing_file_is_a_read_error() {
  let dir = tempfile::tempdir().unwrap();
  let err = WeaveConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
  assert!(matches!(err, ConfigError::Read(_)));
}

#[test]
fn test_apply_config_at_runtime() {
  struct Slow;
  let container = Container::new();
  container.add_singleton(|_| {
    thread::sleep(Duration::from_millis(200));
    Ok(Slow)
  });

  let config = WeaveConfig::from_yaml_str("resolution:\n  default_timeout: 30ms\n").unwrap();
  container.apply_config(&config);

  thread::scope(|s| {
    let leader = s.spawn(|| container.resolve::<Slow>().is_ok());
    thread::sleep(Duration::from_millis(40));
    assert!(matches!(
      container.resolve::<Slow>(),
      Err(WeaveError::ResolutionTimeout { .. })
    ));
    assert!(leader.join().unwrap());
  });
}
