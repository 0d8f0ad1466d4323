use fibre_weave::config::WeaveConfig;
use fibre_weave::{enter_domain, Container};
use std::time::Duration;

struct Session;
struct Renderer;

fn main() {
  let config = WeaveConfig::from_yaml_str(
    "optimization:\n  enabled: true\n  debounce: 100ms\n  promotion_threshold: 10\n",
  )
  .expect("valid configuration");
  let container = Container::with_config(config);

  container.add_transient(|_| Ok(Session));
  container
    .bind::<Renderer>()
    .singleton()
    .in_domain("ui")
    .to(|_| Ok(Renderer));

  for _ in 0..11 {
    container.resolve::<Session>().unwrap();
  }

  {
    let _worker = enter_domain("worker");
    for _ in 0..6 {
      container.resolve::<Renderer>().unwrap();
    }
  }

  std::thread::sleep(Duration::from_millis(120));
  let snapshot = container.snapshot();
  println!("{}", snapshot);

  for suggestion in container.suggest_optimizations() {
    println!("suggestion: {}", suggestion);
  }
}
