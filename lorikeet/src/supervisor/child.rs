use super::Supervisor;
use super::strategy::Strategy;
use crate::config::SpawnOptions;
use crate::node::Node;
use crate::process::Process;
use futures::future::BoxFuture;
use lorikeet_api::message::ExitReason;
use lorikeet_api::pid::ProcessRef;
use lorikeet_api::types::ProcessResult;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// When a terminated child is started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    /// Always restarted.
    #[default]
    Always,
    /// Restarted only after an abnormal termination.
    Transient,
    /// Never restarted.
    Never,
}

impl RestartPolicy {
    pub fn should_restart(&self, reason: &ExitReason) -> bool {
        match self {
            RestartPolicy::Always => true,
            RestartPolicy::Transient => reason.is_abnormal(),
            RestartPolicy::Never => false,
        }
    }
}

/// Starts one child under the given cancellation token and returns its pid.
/// The supervisor links and names the child afterwards.
pub type StartFn = Arc<dyn Fn(Node, CancellationToken) -> BoxFuture<'static, ProcessResult<ProcessRef>> + Send + Sync>;

/// Static description of a supervised child.
#[derive(Clone)]
pub struct ChildSpec {
    pub name: String,
    pub start: StartFn,
    pub restart: RestartPolicy,
}

impl ChildSpec {
    pub fn new<F, Fut>(name: impl Into<String>, start: F) -> Self
    where
        F: Fn(Node, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcessResult<ProcessRef>> + Send + 'static,
    {
        let start: StartFn = Arc::new(
            move |node: Node, cancel: CancellationToken| -> BoxFuture<'static, ProcessResult<ProcessRef>> {
                Box::pin(start(node, cancel))
            },
        );
        Self {
            name: name.into(),
            start,
            restart: RestartPolicy::default(),
        }
    }

    /// A child running a fresh `P` from `factory` on every start.
    pub fn worker<P, F>(name: impl Into<String>, factory: F) -> Self
    where
        P: Process,
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self::new(name, move |node: Node, cancel| {
            let process = factory();
            async move {
                node.spawn_with(process, SpawnOptions::with_cancel(cancel))
                    .await
                    .map(|handle| handle.pid().clone())
            }
        })
    }

    /// A nested supervisor running `spec`.
    pub fn supervisor(name: impl Into<String>, spec: SupervisorSpec) -> Self {
        Self::new(name, move |node: Node, cancel| {
            let supervisor = Supervisor::new(spec.clone());
            async move {
                node.spawn_with(supervisor, SpawnOptions::with_cancel(cancel))
                    .await
                    .map(|handle| handle.pid().clone())
            }
        })
    }

    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }
}

impl fmt::Debug for ChildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildSpec")
            .field("name", &self.name)
            .field("restart", &self.restart)
            .finish_non_exhaustive()
    }
}

/// A supervisor's strategy and its children in start order.
#[derive(Debug, Clone, Default)]
pub struct SupervisorSpec {
    pub strategy: Strategy,
    pub children: Vec<ChildSpec>,
}

impl SupervisorSpec {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            children: Vec::new(),
        }
    }

    pub fn child(mut self, child: ChildSpec) -> Self {
        self.children.push(child);
        self
    }
}
