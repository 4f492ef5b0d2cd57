//! Chain Custody Core
//!
//! The custody program and the state it runs over.
//!
//! # Architecture
//!
//! [`CustodyProgram`] is action-based: each operation reads a [`Storage`],
//! validates the instruction, and returns [`ProgramAction`]s. The caller
//! applies them, typically while holding whatever lock serializes requests.
//! Time comes from the [`Environment`] trait so the same code runs under the
//! simulation harness and in production.
//!
//! # Components
//!
//! - [`CustodyProgram`]: instruction validation and state transitions
//! - [`MaterialRecord`]: the stored record and its fixed binary layout
//! - [`Storage`]: persistence trait, with [`MemoryStorage`] and the
//!   fault-injecting [`ChaoticStorage`]
//! - [`ProgramError`]: rejection reasons, each mapped to a wire error code

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
pub mod program;
pub mod record;
pub mod storage;

pub use env::Environment;
pub use error::ProgramError;
pub use program::{
    CustodyProgram, DEFAULT_MAX_LIST_LIMIT, ProgramAction, ProgramConfig, apply_actions,
};
pub use record::{MaterialRecord, RECORD_SIZE};
pub use storage::{ChaoticStorage, MemoryStorage, Storage, StorageError};
