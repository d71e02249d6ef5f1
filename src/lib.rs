//! # wirebox
//!
//! An explicit, condition-driven bean container for Rust applications.
//!
//! ## Features
//!
//! - **Typed dependency slots**: factories declare their dependencies as an
//!   ordered list of slots; all downcasts happen at registration time
//! - **Capability exports**: beans advertise the trait objects they satisfy
//!   and are resolvable by any of them
//! - **Conditional registration**: property, profile, and bean-presence
//!   conditions with `all`/`any`/`not`/`none` combinators
//! - **Circular dependency detection**: true instantiation cycles fail with
//!   the full wiring path; lazy slots break intentional cycles
//! - **Configuration beans**: factory methods expand into child beans,
//!   filtered by glob patterns
//! - **Mocking**: replace any bean before conditions run, with capability
//!   coverage checks
//! - **Dynamic refresh**: opt-in `Dynamic<V>` fields re-bound atomically from
//!   new property snapshots, with validation expressions
//!
//! ## Quick Start
//!
//! ```rust
//! use wirebox::{Args, BeanBuilder, Container, MapProperties, Selector};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let mut props = MapProperties::new();
//! props.set("db.url", "postgres://localhost");
//!
//! let mut container = Container::new(props);
//! container
//!     .register(
//!         BeanBuilder::factory(|args: &Args| {
//!             Ok(Database { url: args.value(0)? })
//!         })
//!         .arg_prop::<String>("${db.url}"),
//!     )
//!     .unwrap();
//! container
//!     .register(
//!         BeanBuilder::factory(|args: &Args| {
//!             Ok(UserService { db: args.get::<Database>(0)? })
//!         })
//!         .arg(Selector::of::<Database>()),
//!     )
//!     .unwrap();
//!
//! container.refresh().unwrap();
//! let users = container.get::<UserService>().unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! container.close();
//! ```
//!
//! ## Capability Exports
//!
//! ```rust
//! use wirebox::{BeanBuilder, Container, MapProperties};
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, message: &str);
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, message: &str) {
//!         println!("[LOG] {}", message);
//!     }
//! }
//!
//! let mut container = Container::new(MapProperties::new());
//! container
//!     .register(
//!         BeanBuilder::instance(ConsoleLogger)
//!             .export::<dyn Logger>(|t| t as Arc<dyn Logger>),
//!     )
//!     .unwrap();
//!
//! container.refresh().unwrap();
//! let logger = container.get::<dyn Logger>().unwrap();
//! logger.log("Hello, World!");
//! container.close();
//! ```
//!
//! ## Conditional Registration
//!
//! ```rust
//! use wirebox::{cond, BeanBuilder, Container, MapProperties};
//!
//! struct FeatureX;
//!
//! let mut props = MapProperties::new();
//! props.set("feature.x.enabled", "true");
//!
//! let mut container = Container::new(props);
//! container
//!     .register(
//!         BeanBuilder::instance(FeatureX)
//!             .condition(cond::on_property("feature.x.enabled").having_value("true").arc()),
//!     )
//!     .unwrap();
//!
//! container.refresh().unwrap();
//! assert!(container.get::<FeatureX>().is_ok());
//! container.close();
//! ```
//!
//! ## Shutdown
//!
//! [`Container::close`] runs destroy hooks in reverse dependency order:
//! dependents always tear down before the beans they depend on. Call it
//! before dropping the container.

mod expr;
mod resolver;

pub mod bean;
pub mod cond;
pub mod container;
pub mod error;
pub mod lifecycle;
pub mod props;
pub mod refresh;
pub mod wiring;

#[cfg(feature = "async")]
pub mod runner;

pub use bean::{
    BeanBuilder, BeanDefinition, BeanHandle, BeanStatus, ConfigurationScan, MockObject, Selector,
};
pub use cond::{CondContext, Condition};
pub use container::{Container, ContainerState};
pub use error::{BeanError, BeanResult};
pub use lifecycle::Lifecycle;
pub use props::{bind, MapProperties, Properties};
pub use refresh::Dynamic;
pub use wiring::{Args, Lazy};

#[cfg(feature = "async")]
pub use runner::{Runner, ShutdownSignal, TaskSet};
