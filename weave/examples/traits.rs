use fibre_weave::{global, resolve};
use std::sync::Arc;

// 1. The abstraction.
trait Logger: Send + Sync {
  fn log(&self, message: &str);
}

// 2. A concrete implementation.
struct ConsoleLogger;
impl Logger for ConsoleLogger {
  fn log(&self, message: &str) {
    println!("[CONSOLE LOG]: {}", message);
  }
}

// 3. A service that depends on the abstraction.
struct ReportService {
  logger: Arc<dyn Logger>,
}

impl ReportService {
  fn generate_report(&self) {
    self.logger.log("Starting report generation.");
    self.logger.log("Finished report generation.");
  }
}

fn main() {
  // The container stores Arc<ConsoleLogger> and serves it as Arc<dyn Logger>.
  global().add_singleton_trait::<dyn Logger, _>(|_| Ok(Arc::new(ConsoleLogger)));

  // ReportService resolves its own dependency through the container it is
  // handed; a missing logger would surface as an error, not a panic.
  global()
    .bind::<ReportService>()
    .singleton()
    .depends_on::<dyn Logger>()
    .to(|c| {
      Ok(ReportService {
        logger: c.resolve::<dyn Logger>()?,
      })
    });

  assert!(global().validate().is_ok());

  println!("Resolving the high-level service...");
  let report_service = resolve!(ReportService);

  println!("Using the service...");
  report_service.generate_report();

  println!("\nDependency graph:\n{}", global().render_graph());
}
