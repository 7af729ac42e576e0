//! In-process transport: the fabric binding table, packets and sockets.

pub mod error;
pub mod fabric;
pub mod packet;
pub mod socket;

pub use error::{ListenerError, TransportError};
pub use fabric::Fabric;
pub use packet::{Packet, Payload};
pub use socket::{DefaultSocket, Socket, SocketListener};
