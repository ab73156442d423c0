//! Reinforcement-learning environment adapter over an external
//! glucose-insulin patient simulator.
//!
//! [`env::GlucoseEnv`] exposes the usual `reset`/`step`/`render` interface
//! over any [`simulator::Simulator`]; [`subprocess::SubprocessEngine`] runs
//! the simulator as a child process speaking JSON lines.

pub mod config;
pub mod env;
pub mod error;
pub mod rollout;
pub mod simulator;
pub mod spaces;
pub mod stats;
pub mod subprocess;

pub use env::{Environment, GlucoseEnv, RenderMode, Step};
pub use error::EnvError;
pub use simulator::{InitMode, Simulator};
