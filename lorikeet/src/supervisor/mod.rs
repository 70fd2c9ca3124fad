//! Supervision trees.
//!
//! A [`Supervisor`] is an ordinary process that traps exits, starts its
//! children linked to itself in declaration order, publishes them under
//! their names and restarts them according to its [`Strategy`] when their
//! `Exit` arrives. Restarts are bounded by a [`RestartWindow`]; once
//! exhausted the supervisor stops all children and terminates with
//! `ReachedMaxRestartIntensity`, which its own parent observes like any
//! other abnormal exit.

pub mod child;
pub mod strategy;

pub use child::{ChildSpec, RestartPolicy, StartFn, SupervisorSpec};
pub use strategy::{RestartWindow, Strategy, StrategyKind};

use crate::config::SpawnOptions;
use crate::context::ProcessContext;
use crate::node::Node;
use crate::process::{Process, ProcessHandle};
use crate::{log_error, supervisor_span};
use anyhow::Context as _;
use async_trait::async_trait;
use lorikeet_api::errors::{Exit, ProcessError};
use lorikeet_api::message::{ExitReason, Message, SystemMessageKind};
use lorikeet_api::pid::ProcessRef;
use lorikeet_api::registrar::Registrar;
use lorikeet_api::types::ProcessResult;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

/// A running child.
#[derive(Debug, Clone)]
struct ActiveChild {
    name: String,
    pid: ProcessRef,
    /// Position of the child's spec, i.e. its start order.
    index: usize,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct ActiveChildren(RwLock<HashMap<String, ActiveChild>>);

impl ActiveChildren {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ActiveChild>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ActiveChild>> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Children sorted by start order.
    fn ordered(&self) -> Vec<ActiveChild> {
        let mut children: Vec<ActiveChild> = self.read().values().cloned().collect();
        children.sort_by_key(|child| child.index);
        children
    }
}

/// A child as listed by [`SupervisorRef::which_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildInfo {
    pub name: String,
    pub pid: ProcessRef,
}

pub struct Supervisor {
    spec: SupervisorSpec,
    window: RestartWindow,
    children: Arc<ActiveChildren>,
}

impl Supervisor {
    pub fn new(spec: SupervisorSpec) -> Self {
        Self {
            window: RestartWindow::new(&spec.strategy),
            spec,
            children: Arc::new(ActiveChildren::default()),
        }
    }

    /// Spawns a supervisor on `node`. Fails if any child fails to start, in
    /// which case the children already started are stopped again.
    pub async fn start(node: &Node, spec: SupervisorSpec) -> ProcessResult<SupervisorRef> {
        Self::start_with(node, spec, SpawnOptions::default()).await
    }

    pub async fn start_with(node: &Node, spec: SupervisorSpec, options: SpawnOptions) -> ProcessResult<SupervisorRef> {
        let supervisor = Supervisor::new(spec);
        let children = supervisor.children.clone();
        let handle = node.spawn_with(supervisor, options).await?;
        Ok(SupervisorRef { handle, children })
    }

    fn child_by_pid(&self, pid: &ProcessRef) -> Option<ActiveChild> {
        self.children.read().values().find(|child| &child.pid == pid).cloned()
    }

    fn child_at(&self, index: usize) -> Option<ActiveChild> {
        self.children.read().values().find(|child| child.index == index).cloned()
    }

    fn register_child(&self, child: ActiveChild) {
        self.children.write().insert(child.name.clone(), child);
    }

    async fn start_child(&self, ctx: &ProcessContext, index: usize) -> anyhow::Result<()> {
        let spec = &self.spec.children[index];
        let cancel = ctx.cancel_token().child_token();

        let pid = (spec.start)(ctx.node().clone(), cancel.clone())
            .await
            .with_context(|| format!("failed to start child {}", spec.name))?;

        if let Err(err) = ctx.link(&pid).await {
            cancel.cancel();
            return Err(anyhow::Error::new(err).context(format!("failed to link child {}", spec.name)));
        }

        if let Err(err) = ctx.node().register(&spec.name, pid.clone()) {
            let _ = ctx.unlink(&pid).await;
            cancel.cancel();
            return Err(anyhow::Error::new(err).context(format!("failed to register child {}", spec.name)));
        }

        debug!(supervisor = %ctx.pid(), child = %spec.name, pid = %pid, "child started");
        self.register_child(ActiveChild {
            name: spec.name.clone(),
            pid,
            index,
            cancel,
        });
        Ok(())
    }

    /// Forgets a child: drops its record, its name and the link to it.
    async fn unregister_child(&self, ctx: &ProcessContext, name: &str) -> Option<ActiveChild> {
        let child = self.children.write().remove(name)?;
        let node = ctx.node();
        if node.whereis(name).as_ref() == Some(&child.pid) {
            node.unregister(name);
        }
        let _ = ctx.unlink(&child.pid).await;
        Some(child)
    }

    /// Stops a child and waits for it, killing it if it outlives the node's
    /// shutdown timeout.
    async fn terminate_child(&self, ctx: &ProcessContext, child: ActiveChild) {
        self.unregister_child(ctx, &child.name).await;
        child.cancel.cancel();

        let node = ctx.node();
        let Some(handle) = node.process(&child.pid) else {
            return;
        };
        if tokio::time::timeout(node.config().shutdown_timeout, handle.wait()).await.is_err() {
            warn!(supervisor = %ctx.pid(), child = %child.name, pid = %child.pid, "child ignored shutdown, killing");
            if tokio::time::timeout(node.config().notify_timeout, node.kill(&child.pid))
                .await
                .is_err()
            {
                warn!(supervisor = %ctx.pid(), child = %child.name, pid = %child.pid, "kill not delivered in time");
            }
        }
    }

    /// Stops every child, last started first.
    async fn cancel_all(&self, ctx: &ProcessContext) {
        for child in self.children.ordered().into_iter().rev() {
            self.terminate_child(ctx, child).await;
        }
    }

    async fn check_intensity(&mut self, ctx: &ProcessContext) -> anyhow::Result<()> {
        if self.window.admit(Instant::now()) {
            return Ok(());
        }

        log_error!(
            ProcessError::ReachedMaxRestartIntensity,
            supervisor = %ctx.pid(),
            max_restarts = self.spec.strategy.max_restarts,
            period = ?self.spec.strategy.period,
            "stopping all children"
        );
        self.cancel_all(ctx).await;
        Err(Exit(ExitReason::error(ProcessError::ReachedMaxRestartIntensity)).into())
    }

    /// Spec indices to restart after the child at `index` terminated, in
    /// start order.
    fn restart_targets(&self, index: usize) -> Vec<usize> {
        let total = self.spec.children.len();
        match self.spec.strategy.kind {
            StrategyKind::OneForOne => vec![index],
            StrategyKind::OneForAll => (0..total)
                .filter(|i| *i == index || self.child_at(*i).is_some())
                .collect(),
            StrategyKind::RestForOne => (index..total)
                .filter(|i| *i == index || self.child_at(*i).is_some())
                .collect(),
        }
    }

    /// Starts the child at `index`, retrying failed starts for as long as
    /// restart intensity allows.
    async fn restart_child(&mut self, ctx: &ProcessContext, index: usize) -> anyhow::Result<()> {
        loop {
            let started = self.start_child(ctx, index).await;
            match started {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(supervisor = %ctx.pid(), error = %format!("{:#}", err), "restart failed");
                    self.check_intensity(ctx).await?;
                }
            }
        }
    }

    async fn on_child_exit(&mut self, ctx: &ProcessContext, child: ActiveChild, reason: ExitReason) -> anyhow::Result<()> {
        self.unregister_child(ctx, &child.name).await;

        let policy = self.spec.children[child.index].restart;
        if !policy.should_restart(&reason) {
            debug!(supervisor = %ctx.pid(), child = %child.name, reason = %reason, ?policy, "child not restarted");
            if self.children.read().is_empty() {
                info!(supervisor = %ctx.pid(), reason = %reason, "no children left, supervisor terminating");
                return Err(Exit(reason).into());
            }
            return Ok(());
        }

        info!(
            supervisor = %ctx.pid(),
            child = %child.name,
            pid = %child.pid,
            reason = %reason,
            strategy = ?self.spec.strategy.kind,
            "restarting child"
        );
        self.check_intensity(ctx).await?;

        let targets = self.restart_targets(child.index);
        for index in targets.iter().rev() {
            if let Some(sibling) = self.child_at(*index) {
                self.terminate_child(ctx, sibling).await;
            }
        }
        for index in targets {
            if index != child.index && self.spec.children[index].restart == RestartPolicy::Never {
                continue;
            }
            self.restart_child(ctx, index).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Process for Supervisor {
    async fn init(&mut self, ctx: &ProcessContext) -> anyhow::Result<()> {
        ctx.set_trap_exit(true);
        for index in 0..self.spec.children.len() {
            if let Err(err) = self.start_child(ctx, index).await {
                self.cancel_all(ctx).await;
                return Err(err);
            }
        }
        debug!(supervisor = %ctx.pid(), children = self.spec.children.len(), "supervisor started");
        Ok(())
    }

    async fn handle(&mut self, ctx: &ProcessContext, msg: Message) -> anyhow::Result<()> {
        let sys = match msg {
            Message::System(sys) => sys,
            Message::User(_) => {
                warn!(supervisor = %ctx.pid(), "supervisor ignoring user message");
                return Ok(());
            }
        };

        match sys.kind {
            SystemMessageKind::Exit | SystemMessageKind::Down => {
                if let Some(child) = self.child_by_pid(&sys.sender) {
                    let span = supervisor_span!(ctx.pid(), child.name);
                    return self.on_child_exit(ctx, child, sys.reason).instrument(span).await;
                }
                if sys.kind == SystemMessageKind::Exit && !sys.reason.is_normal() {
                    info!(supervisor = %ctx.pid(), sender = %sys.sender, reason = %sys.reason, "linked process exited");
                    self.cancel_all(ctx).await;
                    return Err(Exit(sys.reason).into());
                }
                Ok(())
            }
            SystemMessageKind::Signal => {
                self.cancel_all(ctx).await;
                Err(Exit(sys.reason).into())
            }
        }
    }
}

/// Handle to a started supervisor.
#[derive(Clone)]
pub struct SupervisorRef {
    handle: ProcessHandle,
    children: Arc<ActiveChildren>,
}

impl SupervisorRef {
    pub fn pid(&self) -> &ProcessRef {
        self.handle.pid()
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    /// Currently running children in start order.
    pub fn which_children(&self) -> Vec<ChildInfo> {
        self.children
            .ordered()
            .into_iter()
            .map(|child| ChildInfo {
                name: child.name,
                pid: child.pid,
            })
            .collect()
    }

    pub fn child(&self, name: &str) -> Option<ProcessRef> {
        self.children.read().get(name).map(|child| child.pid.clone())
    }

    /// Stops the supervisor and, through its cancellation token, its children.
    pub fn stop(&self) {
        self.handle.cancel();
    }

    pub async fn wait(&self) -> ExitReason {
        self.handle.wait().await
    }
}

impl std::fmt::Debug for SupervisorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let children: Vec<String> = self.children.ordered().into_iter().map(|child| child.name).collect();
        f.debug_struct("SupervisorRef")
            .field("pid", self.handle.pid())
            .field("children", &children)
            .finish()
    }
}
