//! Chain Custody Client
//!
//! Action-based client state machine for the custody protocol. Builds and
//! signs instructions, tracks outstanding requests, and decodes replies.
//!
//! # Architecture
//!
//! The client is a pure state machine that:
//! - Receives events from the caller (application intents, reply frames,
//!   ticks)
//! - Produces actions for the caller to execute (send frames, report results)
//! - Uses the `Environment` trait for time and randomness (deterministic
//!   testing)
//!
//! # Components
//!
//! - [`Client`]: Top-level state machine
//! - [`ClientEvent`]: Events fed into the client
//! - [`ClientAction`]: Actions produced by the client

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod event;

pub use client::{Client, ClientConfig, ClientIdentity};
pub use custody_core::Environment;
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent, RequestKind};
