use crate::config::SpawnOptions;
use crate::node::Node;
use crate::process::{Process, ProcessHandle};
use lorikeet_api::message::ExitReason;
use lorikeet_api::pid::ProcessRef;
use lorikeet_api::relation::Relation;
use lorikeet_api::types::ProcessResult;
use std::any::Any;
use tokio_util::sync::CancellationToken;

/// Explicit "self" handed to every callback of a running process.
#[derive(Clone)]
pub struct ProcessContext {
    handle: ProcessHandle,
    node: Node,
}

impl ProcessContext {
    pub(crate) fn new(handle: ProcessHandle, node: Node) -> Self {
        Self { handle, node }
    }

    pub fn pid(&self) -> &ProcessRef {
        self.handle.pid()
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Fires when this process is asked to stop. Tokens derived from it are
    /// cancelled along with the process.
    pub fn cancel_token(&self) -> &CancellationToken {
        self.handle.cancel_token()
    }

    pub async fn link(&self, target: &ProcessRef) -> ProcessResult<()> {
        self.handle.link(target).await
    }

    pub async fn unlink(&self, target: &ProcessRef) -> ProcessResult<()> {
        self.handle.unlink(target).await
    }

    pub async fn monitor(&self, target: &ProcessRef) -> ProcessResult<()> {
        self.handle.monitor(target).await
    }

    pub async fn demonitor(&self, target: &ProcessRef) -> ProcessResult<()> {
        self.handle.demonitor(target).await
    }

    pub fn set_trap_exit(&self, trap: bool) {
        self.handle.set_trap_exit(trap);
    }

    pub fn trap_exit(&self) -> bool {
        self.handle.trap_exit()
    }

    pub fn relations(&self) -> Vec<Relation> {
        self.handle.relations()
    }

    /// Sends a user message; gives up if this process is cancelled while
    /// waiting for capacity.
    pub async fn send<M: Any + Send>(&self, target: &ProcessRef, msg: M) -> ProcessResult<()> {
        self.node.send_boxed(self.cancel_token(), target, Box::new(msg)).await
    }

    /// Sends an exit signal to `target` from this process.
    pub async fn exit(&self, target: &ProcessRef, reason: ExitReason) -> ProcessResult<()> {
        self.node
            .signal(self.cancel_token(), self.pid().clone(), target, reason)
            .await
    }

    pub async fn spawn<P: Process>(&self, process: P, options: SpawnOptions) -> ProcessResult<ProcessHandle> {
        self.node.spawn_with(process, options).await
    }

    /// Spawns `process` and links it to this process. If the link cannot be
    /// made the new process is cancelled.
    pub async fn spawn_link<P: Process>(&self, process: P, options: SpawnOptions) -> ProcessResult<ProcessHandle> {
        let child = self.node.spawn_with(process, options).await?;
        if let Err(err) = self.link(child.pid()).await {
            child.cancel();
            return Err(err);
        }
        Ok(child)
    }
}
