use crate::pid::ProcessRef;
use crate::types::ProcessResult;

/// Naming boundary used by supervisors to publish their children.
pub trait Registrar: Send + Sync {
    /// Binds `name` to `pid`; fails with `NameTaken` if it is already bound.
    fn register(&self, name: &str, pid: ProcessRef) -> ProcessResult<()>;

    /// Removes the binding, returning the process it pointed at.
    fn unregister(&self, name: &str) -> Option<ProcessRef>;

    fn whereis(&self, name: &str) -> Option<ProcessRef>;

    /// Returns `pid` back if some name is bound to it.
    fn lookup_by_ref(&self, pid: &ProcessRef) -> Option<ProcessRef>;
}
