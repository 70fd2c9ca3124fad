// Lorikeet Process Runtime
//
// This crate implements the lorikeet process model on top of tokio: each
// process is one task owning a dual-queue mailbox and a relation set, faults
// propagate through links and monitors as system messages, and supervisors
// restart failed children under a strategy and a restart-intensity limit.

pub mod config;
pub mod context;
pub mod logging;
pub mod mailbox;
pub mod node;
pub mod process;
pub mod relations;
pub mod supervisor;

// Re-export commonly used types
pub use config::{NodeConfig, ProcessConfig, SpawnOptions};
pub use context::ProcessContext;
pub use node::Node;
pub use process::{Process, ProcessHandle, ProcessInfo, ProcessStatus};
pub use supervisor::{
    ChildInfo, ChildSpec, RestartPolicy, Strategy, StrategyKind, Supervisor, SupervisorRef, SupervisorSpec,
};

pub use lorikeet_api::{
    Exit, ExitReason, Message, ProcessError, ProcessRef, ProcessResult, Registrar, Relation, RelationKind,
    SystemMessage, SystemMessageKind,
};
