use duelhall_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer sent a frame whose header fails validation. The
    /// connection must be dropped: there's no way to resynchronise a
    /// byte stream after a bad length.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] ProtocolError),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),
}
