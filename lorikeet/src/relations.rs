use lorikeet_api::errors::ProcessError;
use lorikeet_api::pid::ProcessRef;
use lorikeet_api::relation::{Relation, RelationKind};
use lorikeet_api::types::ProcessResult;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct RelationSet {
    relations: HashSet<Relation>,
    disposed: bool,
}

/// Per-process set of link and monitor edges.
///
/// Mutated by the owning process and by peers accepting or releasing
/// relations, read by the dispose path. Once disposed the set is empty and
/// every further `add` fails.
#[derive(Debug, Default)]
pub struct Relations {
    inner: RwLock<RelationSet>,
}

impl Relations {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RelationSet> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RelationSet> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a relation. Returns `false` if it was already present.
    pub fn add(&self, relation: Relation) -> ProcessResult<bool> {
        let mut set = self.write();
        if set.disposed {
            return Err(ProcessError::SelfDisposed);
        }
        Ok(set.relations.insert(relation))
    }

    pub fn remove(&self, relation: &Relation) -> bool {
        self.write().relations.remove(relation)
    }

    pub fn contains(&self, relation: &Relation) -> bool {
        self.read().relations.contains(relation)
    }

    pub fn snapshot(&self) -> Vec<Relation> {
        self.read().relations.iter().cloned().collect()
    }

    pub fn peers(&self, kind: RelationKind) -> Vec<ProcessRef> {
        self.read()
            .relations
            .iter()
            .filter(|relation| relation.kind == kind)
            .map(|relation| relation.peer.clone())
            .collect()
    }

    pub fn is_disposed(&self) -> bool {
        self.read().disposed
    }

    /// Marks the set disposed and hands back everything it held.
    pub fn dispose(&self) -> Vec<Relation> {
        let mut set = self.write();
        set.disposed = true;
        set.relations.drain().collect()
    }
}
