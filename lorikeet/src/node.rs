use crate::config::{NodeConfig, SpawnOptions};
use crate::process::{self, Process, ProcessHandle, ProcessInfo};
use futures::future::join_all;
use lorikeet_api::dispatcher::RelationPeer;
use lorikeet_api::errors::ProcessError;
use lorikeet_api::message::{ExitReason, SystemMessage};
use lorikeet_api::pid::ProcessRef;
use lorikeet_api::registrar::Registrar;
use lorikeet_api::types::{BoxedMessage, ProcessResult};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

enum Entry {
    Local(ProcessHandle),
    Remote(Arc<dyn RelationPeer>),
}

impl Entry {
    fn as_peer(&self) -> Arc<dyn RelationPeer> {
        match self {
            Entry::Local(handle) => handle.as_peer(),
            Entry::Remote(peer) => peer.clone(),
        }
    }
}

pub(crate) struct NodeInner {
    pid: ProcessRef,
    config: NodeConfig,
    processes: RwLock<HashMap<ProcessRef, Entry>>,
    names: RwLock<HashMap<String, ProcessRef>>,
    root: CancellationToken,
}

/// A set of processes sharing configuration, a process table, a name
/// registry and a root cancellation token.
///
/// The table maps every reachable `ProcessRef` to something that can take
/// deliveries: local processes register themselves on spawn and leave on
/// dispose, remote proxies are added with [`Node::attach`].
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

#[derive(Clone)]
pub(crate) struct WeakNode(Weak<NodeInner>);

impl WeakNode {
    pub(crate) fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(|inner| Node { inner })
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new(NodeConfig::default())
    }
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                pid: ProcessRef::new(),
                config,
                processes: RwLock::new(HashMap::new()),
                names: RwLock::new(HashMap::new()),
                root: CancellationToken::new(),
            }),
        }
    }

    /// Identity used as the sender of signals issued by the node itself.
    pub fn pid(&self) -> &ProcessRef {
        &self.inner.pid
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn root_token(&self) -> &CancellationToken {
        &self.inner.root
    }

    pub(crate) fn downgrade(&self) -> WeakNode {
        WeakNode(Arc::downgrade(&self.inner))
    }

    pub async fn spawn<P: Process>(&self, process: P) -> ProcessResult<ProcessHandle> {
        self.spawn_with(process, SpawnOptions::default()).await
    }

    pub async fn spawn_with<P: Process>(&self, process: P, options: SpawnOptions) -> ProcessResult<ProcessHandle> {
        process::spawn(self, process, options).await
    }

    pub(crate) fn insert_local(&self, handle: ProcessHandle) {
        write(&self.inner.processes).insert(handle.pid().clone(), Entry::Local(handle));
    }

    /// Drops a disposed process and every name bound to it.
    pub(crate) fn forget(&self, pid: &ProcessRef) {
        write(&self.inner.processes).remove(pid);
        write(&self.inner.names).retain(|_, owner| owner != pid);
    }

    /// Handle to a live local process.
    pub fn process(&self, pid: &ProcessRef) -> Option<ProcessHandle> {
        match read(&self.inner.processes).get(pid) {
            Some(Entry::Local(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Anything reachable under `pid`, local or remote.
    pub fn lookup(&self, pid: &ProcessRef) -> Option<Arc<dyn RelationPeer>> {
        read(&self.inner.processes).get(pid).map(Entry::as_peer)
    }

    /// Makes a process living elsewhere addressable from this node.
    pub fn attach(&self, peer: Arc<dyn RelationPeer>) {
        let pid = peer.pid().clone();
        debug!(node = %self.inner.pid, peer = %pid, "attached remote peer");
        write(&self.inner.processes).insert(pid, Entry::Remote(peer));
    }

    /// Removes a remote peer. Local processes cannot be detached.
    pub fn detach(&self, pid: &ProcessRef) -> bool {
        let mut processes = write(&self.inner.processes);
        if matches!(processes.get(pid), Some(Entry::Remote(_))) {
            processes.remove(pid);
            drop(processes);
            write(&self.inner.names).retain(|_, owner| owner != pid);
            return true;
        }
        false
    }

    pub fn is_alive(&self, pid: &ProcessRef) -> bool {
        read(&self.inner.processes).contains_key(pid)
    }

    /// Pids of all live local processes.
    pub fn processes(&self) -> Vec<ProcessRef> {
        read(&self.inner.processes)
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Local(_)))
            .map(|(pid, _)| pid.clone())
            .collect()
    }

    pub fn process_info(&self, pid: &ProcessRef) -> Option<ProcessInfo> {
        self.process(pid).map(|handle| handle.info())
    }

    /// Delivers a user message to `pid`.
    pub async fn send<M: Any + Send>(&self, pid: &ProcessRef, msg: M) -> ProcessResult<()> {
        self.send_boxed(&CancellationToken::new(), pid, Box::new(msg)).await
    }

    pub async fn send_boxed(&self, cancel: &CancellationToken, pid: &ProcessRef, msg: BoxedMessage) -> ProcessResult<()> {
        let peer = self.lookup(pid).ok_or(ProcessError::TargetDisposed)?;
        peer.push_message(cancel, msg).await
    }

    /// Delivers a user message to whatever `name` is bound to.
    pub async fn send_named<M: Any + Send>(&self, name: &str, msg: M) -> ProcessResult<()> {
        let pid = self
            .whereis(name)
            .ok_or_else(|| ProcessError::NotFound(name.to_string()))?;
        self.send(&pid, msg).await
    }

    /// Sends an exit signal to `pid` on behalf of the node.
    pub async fn exit(&self, pid: &ProcessRef, reason: ExitReason) -> ProcessResult<()> {
        self.signal(&CancellationToken::new(), self.inner.pid.clone(), pid, reason).await
    }

    /// Terminates `pid` unconditionally, even if it traps exits.
    pub async fn kill(&self, pid: &ProcessRef) -> ProcessResult<()> {
        self.exit(pid, ExitReason::Kill).await
    }

    pub(crate) async fn signal(
        &self,
        cancel: &CancellationToken,
        sender: ProcessRef,
        target: &ProcessRef,
        reason: ExitReason,
    ) -> ProcessResult<()> {
        let peer = self.lookup(target).ok_or(ProcessError::TargetDisposed)?;
        peer.push_system_message(cancel, SystemMessage::signal(sender, reason)).await
    }

    /// Cancels every process and waits for them to be disposed.
    ///
    /// Fails with `DeadlineExceeded` if some process is still running after
    /// `shutdown_timeout`.
    pub async fn shutdown(&self) -> ProcessResult<()> {
        info!(node = %self.inner.pid, "shutting down node");
        self.inner.root.cancel();

        let handles: Vec<ProcessHandle> = read(&self.inner.processes)
            .values()
            .filter_map(|entry| match entry {
                Entry::Local(handle) => Some(handle.clone()),
                Entry::Remote(_) => None,
            })
            .collect();
        for handle in &handles {
            handle.cancel();
        }

        let stopped = join_all(handles.iter().map(|handle| handle.wait()));
        match tokio::time::timeout(self.inner.config.shutdown_timeout, stopped).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!(
                    node = %self.inner.pid,
                    remaining = self.processes().len(),
                    "processes still running after shutdown timeout"
                );
                Err(ProcessError::DeadlineExceeded)
            }
        }
    }
}

impl Registrar for Node {
    fn register(&self, name: &str, pid: ProcessRef) -> ProcessResult<()> {
        let mut names = write(&self.inner.names);
        if let Some(owner) = names.get(name) {
            if owner == &pid {
                return Ok(());
            }
            return Err(ProcessError::NameTaken(name.to_string()));
        }
        if !read(&self.inner.processes).contains_key(&pid) {
            return Err(ProcessError::TargetDisposed);
        }
        debug!(name, pid = %pid, "registered name");
        names.insert(name.to_string(), pid);
        Ok(())
    }

    fn unregister(&self, name: &str) -> Option<ProcessRef> {
        write(&self.inner.names).remove(name)
    }

    fn whereis(&self, name: &str) -> Option<ProcessRef> {
        read(&self.inner.names).get(name).cloned()
    }

    fn lookup_by_ref(&self, pid: &ProcessRef) -> Option<ProcessRef> {
        read(&self.inner.names).values().find(|owner| *owner == pid).cloned()
    }
}
