use crate::config::{ProcessConfig, SpawnOptions};
use crate::context::ProcessContext;
use crate::mailbox::Mailbox;
use crate::node::{Node, WeakNode};
use crate::relations::Relations;
use crate::{log_lifecycle, process_span};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use lorikeet_api::dispatcher::{Dispatcher, RelationPeer};
use lorikeet_api::errors::{Exit, ProcessError};
use lorikeet_api::message::{ExitReason, Message, SystemMessage, SystemMessageKind, panic_message};
use lorikeet_api::pid::ProcessRef;
use lorikeet_api::relation::{Relation, RelationKind};
use lorikeet_api::types::{BoxedMessage, ProcessResult};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, trace, warn};

/// User-side behaviour of a process.
///
/// The runtime owns the mailbox, relations and termination protocol; an
/// implementation only decides what to do with the messages it is handed.
/// Returning an error from any callback terminates the process with that
/// error as its reason. Return [`Exit`] to terminate with a specific reason.
#[async_trait]
pub trait Process: Send + 'static {
    /// Runs before the process becomes reachable to its spawner. A failure
    /// here makes `spawn` itself fail.
    async fn init(&mut self, _ctx: &ProcessContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn handle(&mut self, ctx: &ProcessContext, msg: Message) -> anyhow::Result<()>;

    /// Called once when nothing arrived within [`Process::after_timeout`];
    /// the process then ends normally.
    async fn after(&mut self, _ctx: &ProcessContext) {}

    /// Idle timeout. `None` or zero means wait forever.
    fn after_timeout(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessStatus {
    Initializing,
    Running,
    Disposed(ExitReason),
}

impl ProcessStatus {
    pub fn is_disposed(&self) -> bool {
        matches!(self, ProcessStatus::Disposed(_))
    }
}

/// Point-in-time view of a local process.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: ProcessRef,
    pub status: ProcessStatus,
    pub trap_exit: bool,
    pub relations: Vec<Relation>,
}

/// Outcome of routing one system message.
#[derive(Debug)]
pub(crate) enum Route {
    Deliver(SystemMessage),
    Ignore,
    Terminate(ExitReason),
}

pub(crate) struct ProcessCore {
    pid: ProcessRef,
    mailbox: Mailbox,
    relations: Relations,
    trap_exit: AtomicBool,
    disposed: AtomicBool,
    cancel: CancellationToken,
    status: watch::Sender<ProcessStatus>,
    notify_timeout: Duration,
    node: WeakNode,
}

impl ProcessCore {
    fn new(pid: ProcessRef, config: &ProcessConfig, cancel: CancellationToken, node: WeakNode) -> Self {
        let (status, _) = watch::channel(ProcessStatus::Initializing);
        Self {
            pid,
            mailbox: Mailbox::new(config.user_capacity(), config.system_capacity()),
            relations: Relations::new(),
            trap_exit: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            cancel,
            status,
            notify_timeout: config.notify_timeout(),
            node,
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn trap_exit(&self) -> bool {
        self.trap_exit.load(Ordering::Acquire)
    }

    fn peer(&self, pid: &ProcessRef) -> Option<Arc<dyn RelationPeer>> {
        self.node.upgrade()?.lookup(pid)
    }

    /// Applies the fault-propagation rules to an incoming system message.
    pub(crate) fn route(&self, msg: SystemMessage) -> Route {
        match msg.kind {
            SystemMessageKind::Signal => {
                if msg.reason.is_kill() {
                    Route::Terminate(ExitReason::Kill)
                } else if self.trap_exit() {
                    Route::Deliver(msg)
                } else {
                    Route::Terminate(msg.reason)
                }
            }
            SystemMessageKind::Down => {
                if self.relations.remove(&Relation::monitored(msg.sender.clone())) {
                    Route::Deliver(msg)
                } else {
                    trace!(pid = %self.pid, sender = %msg.sender, "ignoring stale down");
                    Route::Ignore
                }
            }
            SystemMessageKind::Exit => {
                if !self.relations.remove(&Relation::linked(msg.sender.clone())) {
                    trace!(pid = %self.pid, sender = %msg.sender, "ignoring exit from unlinked process");
                    Route::Ignore
                } else if self.trap_exit() {
                    Route::Deliver(msg)
                } else if msg.reason.is_normal() {
                    Route::Ignore
                } else {
                    Route::Terminate(msg.reason)
                }
            }
        }
    }

    /// Terminates the process exactly once and tells its peers why.
    pub(crate) async fn dispose(&self, reason: ExitReason) {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.mailbox.close();
        self.cancel.cancel();
        let relations = self.relations.dispose();
        let node = self.node.upgrade();
        if let Some(node) = &node {
            node.forget(&self.pid);
        }

        if reason.is_abnormal() {
            info!(pid = %self.pid, reason = %reason, "process terminated");
        }
        log_lifecycle!(self.pid, "disposed", reason = %reason, relations = relations.len());

        if let Some(node) = &node {
            join_all(
                relations
                    .into_iter()
                    .map(|relation| self.notify(node, relation, &reason)),
            )
            .await;
        }

        self.status.send_replace(ProcessStatus::Disposed(reason));
    }

    async fn notify(&self, node: &Node, relation: Relation, reason: &ExitReason) {
        let Some(peer) = node.lookup(&relation.peer) else {
            trace!(pid = %self.pid, peer = %relation.peer, "peer already gone");
            return;
        };

        // Fresh token: the ambient one is usually what ended this process.
        let cancel = CancellationToken::new();
        let delivery = async {
            match relation.kind {
                RelationKind::Linked => {
                    peer.push_system_message(&cancel, SystemMessage::exit(self.pid.clone(), reason.clone()))
                        .await
                }
                RelationKind::Monitor => {
                    peer.push_system_message(&cancel, SystemMessage::down(self.pid.clone(), reason.clone()))
                        .await
                }
                RelationKind::Monitored => {
                    peer.release_relation(RelationKind::Monitor, &self.pid).await;
                    Ok(())
                }
            }
        };

        match tokio::time::timeout(self.notify_timeout, delivery).await {
            Ok(Ok(())) => {}
            Ok(Err(ProcessError::ClosedMailbox)) => {
                debug!(pid = %self.pid, peer = %relation.peer, "peer terminated before notification");
            }
            Ok(Err(err)) => {
                warn!(pid = %self.pid, peer = %relation.peer, kind = ?relation.kind, error = %err, "failed to notify peer");
            }
            Err(_) => {
                warn!(
                    pid = %self.pid,
                    peer = %relation.peer,
                    kind = ?relation.kind,
                    error = %ProcessError::DeadlineExceeded,
                    "failed to notify peer"
                );
            }
        }
    }
}

#[async_trait]
impl Dispatcher for ProcessCore {
    fn pid(&self) -> &ProcessRef {
        &self.pid
    }

    async fn push_message(&self, cancel: &CancellationToken, msg: BoxedMessage) -> ProcessResult<()> {
        self.mailbox.push_message(cancel, msg).await
    }

    async fn push_system_message(&self, cancel: &CancellationToken, msg: SystemMessage) -> ProcessResult<()> {
        self.mailbox.push_system_message(cancel, msg).await
    }
}

#[async_trait]
impl RelationPeer for ProcessCore {
    async fn accept_relation(&self, kind: RelationKind, from: &ProcessRef) -> ProcessResult<()> {
        if from == &self.pid {
            return Err(ProcessError::SelfRelation);
        }
        self.relations
            .add(Relation::new(kind, from.clone()))
            .map(|_| ())
            .map_err(|_| ProcessError::TargetDisposed)
    }

    async fn release_relation(&self, kind: RelationKind, from: &ProcessRef) -> bool {
        self.relations.remove(&Relation::new(kind, from.clone()))
    }
}

/// Disposes with `Kill` if the task is dropped before finishing normally,
/// e.g. when the runtime shuts down underneath it.
struct DisposeGuard {
    core: Option<Arc<ProcessCore>>,
}

impl DisposeGuard {
    fn new(core: Arc<ProcessCore>) -> Self {
        Self { core: Some(core) }
    }

    fn disarm(mut self) {
        self.core = None;
    }
}

impl Drop for DisposeGuard {
    fn drop(&mut self) {
        let Some(core) = self.core.take() else {
            return;
        };
        if core.is_disposed() {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { core.dispose(ExitReason::Kill).await });
        }
    }
}

/// Cloneable handle to a local process.
#[derive(Clone)]
pub struct ProcessHandle {
    core: Arc<ProcessCore>,
}

impl ProcessHandle {
    pub fn pid(&self) -> &ProcessRef {
        &self.core.pid
    }

    pub(crate) fn as_peer(&self) -> Arc<dyn RelationPeer> {
        self.core.clone()
    }

    /// Links this process with `target`. Linking twice is a no-op.
    pub async fn link(&self, target: &ProcessRef) -> ProcessResult<()> {
        self.establish(target, RelationKind::Linked).await
    }

    /// Removes the link on both sides. The local side is dropped even when
    /// the target can no longer be reached.
    pub async fn unlink(&self, target: &ProcessRef) -> ProcessResult<()> {
        self.release(target, RelationKind::Linked).await
    }

    /// Starts watching `target`; a `Down` arrives when it terminates.
    pub async fn monitor(&self, target: &ProcessRef) -> ProcessResult<()> {
        self.establish(target, RelationKind::Monitored).await
    }

    pub async fn demonitor(&self, target: &ProcessRef) -> ProcessResult<()> {
        self.release(target, RelationKind::Monitored).await
    }

    async fn establish(&self, target: &ProcessRef, kind: RelationKind) -> ProcessResult<()> {
        let core = &self.core;
        if target == &core.pid {
            return Err(ProcessError::SelfRelation);
        }
        if core.is_disposed() {
            return Err(ProcessError::SelfDisposed);
        }

        let relation = Relation::new(kind, target.clone());
        if core.relations.contains(&relation) {
            return Ok(());
        }

        let peer = core.peer(target).ok_or(ProcessError::TargetDisposed)?;
        peer.accept_relation(kind.counterpart(), &core.pid).await?;

        if let Err(err) = core.relations.add(relation.clone()) {
            peer.release_relation(kind.counterpart(), &core.pid).await;
            return Err(err);
        }

        // The target may have been disposed between accepting and now; its
        // notification would then be dropped as stale.
        if core.peer(target).is_none() {
            core.relations.remove(&relation);
            return Err(ProcessError::TargetDisposed);
        }

        trace!(pid = %core.pid, peer = %target, kind = ?kind, "relation established");
        Ok(())
    }

    async fn release(&self, target: &ProcessRef, kind: RelationKind) -> ProcessResult<()> {
        let core = &self.core;
        if target == &core.pid {
            return Err(ProcessError::SelfRelation);
        }
        if core.is_disposed() {
            return Err(ProcessError::SelfDisposed);
        }

        core.relations.remove(&Relation::new(kind, target.clone()));
        if let Some(peer) = core.peer(target) {
            peer.release_relation(kind.counterpart(), &core.pid).await;
        }
        Ok(())
    }

    /// Redirects `Exit` and non-kill `Signal` messages to the handler.
    /// Ignored once the process is disposed.
    pub fn set_trap_exit(&self, trap: bool) {
        if !self.core.is_disposed() {
            self.core.trap_exit.store(trap, Ordering::Release);
        }
    }

    pub fn trap_exit(&self) -> bool {
        self.core.trap_exit()
    }

    pub fn relations(&self) -> Vec<Relation> {
        self.core.relations.snapshot()
    }

    pub fn has_relation(&self, relation: &Relation) -> bool {
        self.core.relations.contains(relation)
    }

    pub fn status(&self) -> ProcessStatus {
        self.core.status.borrow().clone()
    }

    pub fn is_alive(&self) -> bool {
        !self.core.is_disposed()
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.core.pid.clone(),
            status: self.status(),
            trap_exit: self.trap_exit(),
            relations: self.relations(),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.core.cancel
    }

    /// Asks the process to stop; it terminates with `Normal`, so linked
    /// peers are not taken down with it.
    pub fn cancel(&self) {
        self.core.cancel.cancel();
    }

    /// Delivers a user message, waiting for mailbox capacity.
    pub async fn send<M: Any + Send>(&self, msg: M) -> ProcessResult<()> {
        self.core.push_message(&CancellationToken::new(), Box::new(msg)).await
    }

    /// Resolves with the exit reason once the process has been disposed and
    /// its peers notified.
    pub async fn wait(&self) -> ExitReason {
        let mut status = self.core.status.subscribe();
        loop {
            let disposed = match &*status.borrow_and_update() {
                ProcessStatus::Disposed(reason) => Some(reason.clone()),
                _ => None,
            };
            if let Some(reason) = disposed {
                return reason;
            }
            if status.changed().await.is_err() {
                return ExitReason::Normal;
            }
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.core.pid)
            .field("disposed", &self.core.is_disposed())
            .finish()
    }
}

/// Spawns `process` on `node` and waits for its init to finish.
pub(crate) async fn spawn<P: Process>(node: &Node, process: P, options: SpawnOptions) -> ProcessResult<ProcessHandle> {
    let config = node.config().merge_with_process_config(&options.config);
    let parent = options.cancel.unwrap_or_else(|| node.root_token().clone());
    let core = Arc::new(ProcessCore::new(ProcessRef::new(), &config, parent.child_token(), node.downgrade()));
    let handle = ProcessHandle { core };
    node.insert_local(handle.clone());

    let (ready_tx, ready_rx) = oneshot::channel();
    let span = process_span!(handle.pid());
    tokio::spawn(run(handle.clone(), node.clone(), process, ready_tx).instrument(span));

    match ready_rx.await {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(ProcessError::SpawnAborted),
    }
}

async fn run<P: Process>(
    handle: ProcessHandle,
    node: Node,
    mut process: P,
    ready: oneshot::Sender<ProcessResult<()>>,
) {
    let core = handle.core.clone();
    let guard = DisposeGuard::new(core.clone());
    let ctx = ProcessContext::new(handle, node);

    let failure = match AssertUnwindSafe(process.init(&ctx)).catch_unwind().await {
        Ok(Ok(())) => None,
        Ok(Err(err)) => {
            let err = Arc::new(err);
            let reason = match err.downcast_ref::<Exit>() {
                Some(Exit(reason)) => reason.clone(),
                None => ExitReason::Error(err.clone()),
            };
            Some((reason, ProcessError::HandlerError(err)))
        }
        Err(payload) => {
            let msg = panic_message(payload);
            Some((ExitReason::Panic(msg.clone()), ProcessError::PanicRecovered(msg)))
        }
    };

    if let Some((reason, err)) = failure {
        log_lifecycle!(core.pid, "init failed", error = %err);
        core.dispose(reason).await;
        guard.disarm();
        let _ = ready.send(Err(err));
        return;
    }

    core.status.send_replace(ProcessStatus::Running);
    log_lifecycle!(core.pid, "started");
    let _ = ready.send(Ok(()));

    let reason = receive_loop(&core, &ctx, &mut process).await;
    core.dispose(reason).await;
    guard.disarm();
}

async fn receive_loop<P: Process>(core: &ProcessCore, ctx: &ProcessContext, process: &mut P) -> ExitReason {
    let idle = process.after_timeout();
    loop {
        let msg = match core.mailbox.receive_timeout(&core.cancel, idle).await {
            Ok(msg) => msg,
            Err(ProcessError::ReceiveTimeout) => {
                return match AssertUnwindSafe(process.after(ctx)).catch_unwind().await {
                    Ok(()) => ExitReason::Normal,
                    Err(payload) => ExitReason::panic(payload),
                };
            }
            Err(ProcessError::Cancelled | ProcessError::ClosedMailbox) => return ExitReason::Normal,
            Err(err) => return ExitReason::error(err),
        };

        let msg = match msg {
            Message::System(sys) => match core.route(sys) {
                Route::Deliver(sys) => Message::System(sys),
                Route::Ignore => continue,
                Route::Terminate(reason) => return reason,
            },
            user => user,
        };

        match AssertUnwindSafe(process.handle(ctx, msg)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return match err.downcast::<Exit>() {
                    Ok(Exit(reason)) => reason,
                    Err(err) => ExitReason::Error(Arc::new(err)),
                };
            }
            Err(payload) => return ExitReason::panic(payload),
        }
    }
}
