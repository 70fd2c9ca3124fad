use crate::pid::ProcessRef;

/// The kind of edge a process holds towards a peer.
///
/// `Linked` is stored once on each side. `Monitored` is held by the watcher
/// and points at the target; `Monitor` is held by the target and points back
/// at the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Linked,
    Monitor,
    Monitored,
}

impl RelationKind {
    /// The kind the peer records for the same relation.
    pub fn counterpart(self) -> Self {
        match self {
            RelationKind::Linked => RelationKind::Linked,
            RelationKind::Monitor => RelationKind::Monitored,
            RelationKind::Monitored => RelationKind::Monitor,
        }
    }
}

/// A directed relation fact held by one process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation {
    pub kind: RelationKind,
    pub peer: ProcessRef,
}

impl Relation {
    pub fn new(kind: RelationKind, peer: ProcessRef) -> Self {
        Self { kind, peer }
    }

    pub fn linked(peer: ProcessRef) -> Self {
        Self::new(RelationKind::Linked, peer)
    }

    pub fn monitor(peer: ProcessRef) -> Self {
        Self::new(RelationKind::Monitor, peer)
    }

    pub fn monitored(peer: ProcessRef) -> Self {
        Self::new(RelationKind::Monitored, peer)
    }
}
