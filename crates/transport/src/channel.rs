use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::source::EventSource;

/// Sending half of a [`ChannelSource`].
pub type SourceSender = mpsc::Sender<Vec<u8>>;

/// An in-process source fed through a tokio channel.
///
/// The stream ends once every [`SourceSender`] is dropped.
pub struct ChannelSource {
    name: String,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    pub fn pair(name: impl Into<String>, capacity: usize) -> (SourceSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            Self {
                name: name.into(),
                rx,
            },
        )
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_in_order_then_ends() {
        let (tx, mut source) = ChannelSource::pair("raw", 8);
        source.connect().await.unwrap();
        tx.send(b"one".to_vec()).await.unwrap();
        tx.send(b"two".to_vec()).await.unwrap();
        drop(tx);

        assert_eq!(source.next().await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(source.next().await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(source.next().await.unwrap(), None);
        assert_eq!(source.name(), "raw");
    }
}
