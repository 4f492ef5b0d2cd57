//! Reference model for model-based testing.
//!
//! The model captures the custody rules without signatures, encodings, or
//! storage: who holds each material, how many times it moved, and whether
//! it is quarantined. It serves as the oracle against which the real
//! implementation is verified.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Rules not mechanics: Captures WHAT, not HOW
//! - Deterministic: Same inputs produce same outputs

pub mod operation;
mod world;

pub use operation::{
    ClientId, ModelMaterialId, Operation, OperationError, OperationResult, material_name,
    role_name,
};
pub use world::{ModelRecord, ModelWorld, ObservableState};
