//! # Dispatcher
//!
//! The capability the runtime needs from any peer it talks to. Local processes
//! implement it on top of their mailbox; a transport can implement it for a
//! proxy of a process living on another node. Callers never learn which one
//! they hold.

use crate::message::SystemMessage;
use crate::pid::ProcessRef;
use crate::relation::RelationKind;
use crate::types::{BoxedMessage, ProcessResult};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Delivers messages to one process.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn pid(&self) -> &ProcessRef;

    /// Enqueues a user message, waiting for capacity until `cancel` fires.
    async fn push_message(&self, cancel: &CancellationToken, msg: BoxedMessage) -> ProcessResult<()>;

    /// Enqueues a system message, waiting for capacity until `cancel` fires.
    async fn push_system_message(&self, cancel: &CancellationToken, msg: SystemMessage) -> ProcessResult<()>;
}

/// A dispatcher that also takes part in the two-phase relation protocol.
///
/// The initiator asks the peer to accept first and records its own side only
/// once the peer agreed. A disposed peer refuses with `TargetDisposed`.
#[async_trait]
pub trait RelationPeer: Dispatcher {
    /// Records `kind` towards `from` on this peer.
    async fn accept_relation(&self, kind: RelationKind, from: &ProcessRef) -> ProcessResult<()>;

    /// Drops `kind` towards `from`; returns whether it was present.
    async fn release_relation(&self, kind: RelationKind, from: &ProcessRef) -> bool;
}
