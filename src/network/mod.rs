//! Wire protocol, TCP transport and listener for inter-node traffic.

pub mod rpc;
pub mod server;
pub mod transport;

pub use rpc::{WireMessage, MAX_FRAME_LEN};
pub use server::NetworkServer;
pub use transport::TcpTransport;
