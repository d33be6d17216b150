//! Snapshot of cluster membership and leadership.
//!
//! Membership and leader election happen outside this crate. Whatever
//! mechanism provides them feeds [`MemberEvent`]s into a [`ClusterState`],
//! and the resulting [`ClusterView`] snapshots are fanned out to the cache
//! workers, which only ever read them.

use parking_lot::RwLock;
use std::net::SocketAddr;

/// Address of a cluster member.
pub type NodeAddr = SocketAddr;

/// Read-only snapshot of the cluster as seen by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterView {
    /// This node's own address.
    pub self_addr: NodeAddr,

    /// The current leader, if known.
    pub leader: Option<NodeAddr>,

    /// All known members, including this node.
    pub members: Vec<NodeAddr>,
}

impl ClusterView {
    /// A single-node view: this node is its own leader with no peers.
    pub fn solo(self_addr: NodeAddr) -> Self {
        Self {
            self_addr,
            leader: Some(self_addr),
            members: vec![self_addr],
        }
    }

    /// Whether this node currently believes itself to be the leader.
    pub fn is_self_leader(&self) -> bool {
        self.leader == Some(self.self_addr)
    }

    /// All members except this node.
    pub fn peers(&self) -> impl Iterator<Item = &NodeAddr> {
        self.members.iter().filter(move |m| **m != self.self_addr)
    }
}

impl Default for ClusterView {
    fn default() -> Self {
        // Placeholder standalone view; real deployments feed MemberEvents.
        Self::solo("0.0.0.0:0".parse().expect("static addr"))
    }
}

/// Membership change notifications consumed from the external oracle.
#[derive(Debug, Clone)]
pub enum MemberEvent {
    /// A node joined the cluster.
    NodeJoin {
        /// The node's address.
        addr: NodeAddr,
    },

    /// A node left the cluster or was confirmed failed.
    NodeLeave {
        /// The node's address.
        addr: NodeAddr,
    },

    /// The elected leader changed. `None` means leadership is currently
    /// unknown, in which case leader-gated refreshes fall back to local
    /// fetches.
    LeaderChanged {
        /// The new leader's address, if any.
        leader: Option<NodeAddr>,
    },
}

/// Mutable holder for the current view, updated by membership events.
#[derive(Debug)]
pub struct ClusterState {
    view: RwLock<ClusterView>,
}

impl ClusterState {
    /// Create the state for a node with the given address.
    pub fn new(self_addr: NodeAddr) -> Self {
        Self {
            view: RwLock::new(ClusterView {
                self_addr,
                leader: None,
                members: vec![self_addr],
            }),
        }
    }

    /// Apply a membership event and return the updated snapshot.
    pub fn apply(&self, event: MemberEvent) -> ClusterView {
        let mut view = self.view.write();
        match event {
            MemberEvent::NodeJoin { addr } => {
                if !view.members.contains(&addr) {
                    view.members.push(addr);
                    tracing::info!(%addr, "node joined cluster");
                }
            }
            MemberEvent::NodeLeave { addr } => {
                view.members.retain(|m| *m != addr);
                if view.leader == Some(addr) {
                    view.leader = None;
                    tracing::warn!(%addr, "leader left cluster, leadership unknown");
                } else {
                    tracing::info!(%addr, "node left cluster");
                }
            }
            MemberEvent::LeaderChanged { leader } => {
                view.leader = leader;
                tracing::info!(?leader, "cluster leader changed");
            }
        }
        view.clone()
    }

    /// The current snapshot.
    pub fn view(&self) -> ClusterView {
        self.view.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> NodeAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn test_solo_view_is_own_leader() {
        let view = ClusterView::solo(addr(9000));
        assert!(view.is_self_leader());
        assert_eq!(view.peers().count(), 0);
    }

    #[test]
    fn test_join_leave_and_leader_change() {
        let state = ClusterState::new(addr(9000));
        assert!(!state.view().is_self_leader());

        state.apply(MemberEvent::NodeJoin { addr: addr(9001) });
        state.apply(MemberEvent::NodeJoin { addr: addr(9002) });
        let view = state.apply(MemberEvent::LeaderChanged {
            leader: Some(addr(9000)),
        });
        assert!(view.is_self_leader());
        assert_eq!(view.members.len(), 3);
        assert_eq!(view.peers().count(), 2);

        let view = state.apply(MemberEvent::NodeLeave { addr: addr(9001) });
        assert_eq!(view.members.len(), 2);
    }

    #[test]
    fn test_leader_leaving_clears_leadership() {
        let state = ClusterState::new(addr(9000));
        state.apply(MemberEvent::NodeJoin { addr: addr(9001) });
        state.apply(MemberEvent::LeaderChanged {
            leader: Some(addr(9001)),
        });
        let view = state.apply(MemberEvent::NodeLeave { addr: addr(9001) });
        assert_eq!(view.leader, None);
    }

    #[test]
    fn test_duplicate_join_is_ignored() {
        let state = ClusterState::new(addr(9000));
        state.apply(MemberEvent::NodeJoin { addr: addr(9001) });
        let view = state.apply(MemberEvent::NodeJoin { addr: addr(9001) });
        assert_eq!(view.members.len(), 2);
    }
}
