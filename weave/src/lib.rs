//! # Fibre Weave
//!
//! A thread-safe dependency injection runtime with lifecycle scopes,
//! single-flight resolution and usage-driven optimization hints.
//!
//! ## Core Concepts
//!
//! - **Container**: Holds registrations and the instances built from them.
//!   Registration may happen at any point during the application's lifetime;
//!   a later registration for the same key replaces the earlier one.
//! - **Scopes**: `Transient` builds a fresh instance every time, `Singleton`
//!   builds one and keeps it, `WeakSingleton` shares one for as long as a
//!   caller holds it, and `Scoped` shares one per scope id until the scope
//!   ends.
//! - **Single flight**: However many threads ask for the same uncached
//!   singleton at once, its factory runs exactly once.
//! - **Cycle detection**: A dependency cycle fails with the full path instead
//!   of overflowing the stack.
//! - **Statistics**: Resolution counters, dependency cycles and domain hops
//!   feed advisory suggestions such as promoting a busy transient to a
//!   singleton. Enabled by default in debug builds.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_weave::{global, resolve};
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!   fn greet(&self) -> String;
//! }
//!
//! struct EnglishGreeter {
//!   message: Arc<String>,
//! }
//!
//! impl Greeter for EnglishGreeter {
//!   fn greet(&self) -> String {
//!     self.message.to_string()
//!   }
//! }
//!
//! fn main() {
//!   global().add_singleton_with_name("greeting", |_| Ok(String::from("Hello, World!")));
//!
//!   // Factories receive the container and resolve their own dependencies.
//!   global().add_singleton_trait::<dyn Greeter, _>(|c| {
//!     let message = c.resolve_named::<String>("greeting")?;
//!     Ok(Arc::new(EnglishGreeter { message }))
//!   });
//!
//!   let greeter = resolve!(trait Greeter);
//!   assert_eq!(greeter.greet(), "Hello, World!");
//! }
//! ```

mod cache;
pub mod config;
mod container;
mod domain;
mod error;
mod flight;
mod global;
mod graph;
mod instance;
mod key;
mod macros;
mod optimizer;
mod registry;
mod scope;
mod stack;
mod stats;

pub use cache::CachedInstance;
pub use config::WeaveConfig;
pub use container::{Container, MissingDependency, ResolveOptions, ValidationReport};
pub use domain::{current_domain, enter_domain, DomainGuard, DomainId};
pub use error::{BoxError, ConfigError, Result, WeaveError};
pub use global::global;
pub use graph::{CyclePath, DependencyGraph};
pub use key::TypeKey;
pub use optimizer::{OptimizerSettings, Suggestion};
pub use registry::{Binding, Registration};
pub use scope::{ScopeHandle, ScopeId, ScopeKind};
pub use stats::{DomainHop, StatisticsSnapshot, UsageCounter};
