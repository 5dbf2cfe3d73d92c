use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport is down (or the client was shut down). Connectivity
    /// loss is surfaced as a persistent indicator, never a crash.
    #[error("client is not connected")]
    NotConnected,

    /// The reconnect attempt cap was exceeded; the client gave up.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("transport error: {0}")]
    Transport(String),

    /// Rejected client-side before any event was emitted: empty body,
    /// oversized file, or an unserializable command.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
