//! liaison - complexity-aware routing of inference requests across AI model providers
//!
//! This library provides the routing core (complexity analysis, provider
//! registry, performance tracking, provider selection, metrics) and the HTTP
//! surface built on top of it.

pub mod config;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod router;

pub use config::Config;
pub use error::Error;
