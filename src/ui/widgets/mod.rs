// src/ui/widgets/mod.rs

pub mod footer; // Key hints and the status line.
pub mod input; // Target entry.
pub mod modules; // Module table with enable toggles.
pub mod results; // Run output and opened sessions.
pub mod sessions; // Stored sessions.
