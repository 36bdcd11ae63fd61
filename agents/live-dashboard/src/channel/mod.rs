//! Push-channel transport
//!
//! The transport runs on its own task and forwards what it sees as
//! [`ChannelEvent`]s over a bounded mpsc channel. Dropping the receiver
//! stops the task and closes the connection. There is no reconnection:
//! after [`ChannelEvent::Closed`] the sender is dropped.

pub mod websocket;

pub use websocket::subscribe;

/// What the transport observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Connection acknowledged by the server
    Connected,
    /// One raw text message
    Message(String),
    /// Connection ended, by the peer or through an error
    Closed { reason: Option<String> },
}

impl ChannelEvent {
    pub fn closed(reason: impl Into<String>) -> Self {
        ChannelEvent::Closed {
            reason: Some(reason.into()),
        }
    }
}
