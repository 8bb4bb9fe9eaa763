//! Scenario-driven API test runner.
//!
//! Executes a named chain of request/response steps against live HTTP
//! or WebSocket endpoints, routing between steps with declarative
//! match rules, carrying extracted values forward through a run-scoped
//! store, and streaming one [`ResultStep`] per executed step.

pub mod aggregator;
pub mod config;
pub mod executor;
pub mod flattener;
pub mod model;
pub mod resolver;
pub mod runner;
pub mod template;
pub mod validator;
pub mod websocket;

pub use config::ScenarioLoader;
pub use model::*;
pub use runner::ScenarioRunner;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
