//! The `connection` module owns one client's WebSocket: a read loop that
//! decodes frames and submits them to the hub, and a write loop that drains
//! the client's bounded outbound queue onto the socket.

pub mod handle;
pub mod queue;
pub mod session;
pub mod state;

pub use handle::ConnectionHandle;
pub use queue::{OutboundQueue, PushOutcome};
pub use session::{Connection, ConnectionSettings};
pub use state::ConnectionState;
