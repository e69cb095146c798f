//! Connection lifecycle
//!
//! `Connecting -> Active -> Closing -> Closed`, with `Connecting -> Closed`
//! for handshakes that never register. Transitions only move forward.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_become(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Active) | (Connecting, Closed) | (Active, Closing) | (Closing, Closed)
        )
    }
}
