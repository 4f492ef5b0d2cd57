//! Deterministic simulation harness for chain custody testing.
//!
//! Seeded implementations of the `Environment` trait, an in-process server
//! that runs the real `ServerDriver`, and turmoil-based transport helpers
//! for deterministic, reproducible testing under packet loss, latency, and
//! partitions.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and real implementation,
//! and their observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod sim_env;
pub mod sim_server;
pub mod sim_transport;

pub use model::{
    ClientId, ModelMaterialId, ModelRecord, ModelWorld, ObservableState, Operation,
    OperationError, OperationResult,
};
pub use sim_env::SimEnv;
pub use sim_server::{SharedSimServer, SimServer, create_shared_server, serve};
pub use sim_transport::{SimTransport, read_frame, write_frame};
