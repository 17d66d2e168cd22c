//! `grove-runtime` – The Memory Engine front door.
//!
//! Wraps the synchronous stores of `grove-memory` in an async, per-user
//! sharded facade and carries the process-level concerns around it.
//!
//! # Modules
//!
//! - [`facade`] – [`MemoryFacade`]: event translators, enrichment, context
//!   retrieval and query pass-throughs.
//! - [`insight`] – pattern tallies and [`MemoryInsight`](grove_types::MemoryInsight)
//!   synthesis.
//! - [`config`] – [`EngineConfig`]: TOML-backed tunables with `GROVE_*`
//!   overrides.
//! - [`telemetry`] – `tracing` + OpenTelemetry initialisation.

pub mod config;
pub mod facade;
pub mod insight;
pub mod telemetry;

pub use config::{ConfigError, EngineConfig};
pub use facade::{ContextualMemories, MemoryFacade};
