//! Cluster view and leader-gated update coordination.

pub mod gateway;
pub mod view;

pub(crate) use gateway::LeaderGateway;
pub use gateway::{ClusterTransport, NoTransport};
pub use view::{ClusterState, ClusterView, MemberEvent, NodeAddr};
