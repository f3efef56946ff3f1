use thiserror::Error;

/// Errors raised by an inbound stream source.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connecting or subscribing failed. The caller should back off and try
    /// again.
    #[error("connection error: {0}")]
    Connection(String),

    /// Receiving the next message failed on an established connection.
    #[error("receive error: {0}")]
    Receive(String),

    /// `next` was called before a successful `connect`.
    #[error("source not connected")]
    NotConnected,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Receive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            TransportError::Connection("broker down".into()).to_string(),
            "connection error: broker down"
        );
        assert_eq!(TransportError::NotConnected.to_string(), "source not connected");
    }

    #[test]
    fn io_errors_are_receive_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(TransportError::from(io), TransportError::Receive(_)));
    }
}
