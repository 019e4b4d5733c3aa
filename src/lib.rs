//! INFERENCE NETWORK PARTICIPANT VALIDATION
//!
//! Root crate of the workspace. Re-exports the fixed-point statistics
//! (`inference_math`) and the status engine (`inference_validation`), and hosts
//! the replay helpers behind the `status-replay` binary.

pub mod replay;

pub use inference_math as math;
pub use inference_validation as validation;

pub use replay::{render, replay, ReplayError};
