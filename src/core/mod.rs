// src/core/mod.rs

// Root of the analysis engine. Everything here is independent of the
// terminal front end.

/// Result trees and the findings modules attach to them.
pub mod models;

/// Normalized scan targets.
pub mod target;

/// The contract every analysis module implements.
pub mod module;

/// Built-in modules.
pub mod modules;

/// Explicit table of the modules available at startup.
pub mod registry;

/// Sequential module execution with cooperative cancellation.
pub mod orchestrator;

/// Bounded-concurrency TCP connect and banner probes.
pub mod probe;

/// On-disk storage of finished runs.
pub mod session;
