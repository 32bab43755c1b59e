//! turnstiled — Entry kiosk: detection sampling and access decisions.
//!
//! The binary wires a V4L2 camera, the recognition pipeline and the attempt
//! sinks into a [`engine::DecisionLoop`]. The pieces are exposed here so the
//! CLI can reuse the same configuration and pipeline construction.

pub mod config;
pub mod engine;
pub mod pipeline;
pub mod shutdown;
pub mod surface;

pub use config::{Config, ConfigError};
pub use engine::{DecisionLoop, LoopSettings, StopReason};
pub use surface::{HeadlessSurface, Surface};
