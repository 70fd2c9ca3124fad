//! # Lorikeet Process API
//!
//! Contracts shared by the lorikeet runtime and anything that wants to talk to
//! its processes: identifiers, the system-message protocol, relation kinds and
//! the transport-agnostic `Dispatcher` capability.
//!
//! ## Design Principles
//!
//! - **Location Transparency**: a peer is reached through [`Dispatcher`] and
//!   [`RelationPeer`]; whether it runs in this node or behind a transport is
//!   invisible to the caller.
//! - **Closed Control Plane**: system messages are a small tagged enum, while
//!   user payloads stay dynamically typed.
//! - **Explicit Termination**: every process ends with an [`ExitReason`] that is
//!   delivered to its linked and monitoring peers.
//!
//! ## Module Organization
//!
//! - [`pid`]: Process identifiers
//! - [`message`]: System messages, exit reasons and the delivered message type
//! - [`relation`]: Link and monitor relation kinds
//! - [`dispatcher`]: Transport-agnostic delivery and relation acceptance
//! - [`registrar`]: Name registration boundary
//! - [`errors`]: Error types and the explicit-exit sentinel
//! - [`types`]: Common type definitions

pub mod dispatcher;
pub mod errors;
pub mod message;
pub mod pid;
pub mod registrar;
pub mod relation;
pub mod types;

pub use dispatcher::{Dispatcher, RelationPeer};
pub use errors::{Exit, ProcessError};
pub use message::{ExitReason, Message, SystemMessage, SystemMessageKind};
pub use pid::ProcessRef;
pub use registrar::Registrar;
pub use relation::{Relation, RelationKind};
pub use types::{BoxedFuture, BoxedMessage, ProcessResult};
