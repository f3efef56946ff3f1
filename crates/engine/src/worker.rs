use gatekeeper_core::{ConsentDecision, RawRecord};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::RelayEngine;
use crate::error::RelayError;

/// Default number of messages that may wait in the relay inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// A unit of work for the relay worker.
#[derive(Debug)]
pub enum Inbound {
    Raw(RawRecord),
    Consent(ConsentDecision),
    /// Answered once every message queued before it has been processed.
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle used to feed the relay worker's inbox.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<Inbound>,
}

impl RelayHandle {
    pub(crate) fn from_sender(tx: mpsc::Sender<Inbound>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, message: Inbound) -> Result<(), RelayError> {
        self.tx.send(message).await.map_err(|_| RelayError::Closed)
    }

    pub async fn submit_raw(&self, raw: RawRecord) -> Result<(), RelayError> {
        self.send(Inbound::Raw(raw)).await
    }

    pub async fn submit_decision(&self, decision: ConsentDecision) -> Result<(), RelayError> {
        self.send(Inbound::Consent(decision)).await
    }

    /// Wait until everything submitted so far has been processed.
    pub async fn flush(&self) -> Result<(), RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send(Inbound::Flush(tx)).await?;
        rx.await.map_err(|_| RelayError::Closed)
    }
}

/// Single serialized consumer of the relay inbox.
///
/// Both ingesters feed the same inbox, so raw records and consent decisions
/// are applied one at a time in the order they were accepted. A grant's
/// replay completes before the next message is taken.
pub struct RelayWorker {
    engine: RelayEngine,
    rx: mpsc::Receiver<Inbound>,
    cancel: CancellationToken,
}

impl RelayWorker {
    /// Wrap `engine` in a worker with an inbox of `capacity` messages.
    pub fn new(
        engine: RelayEngine,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, RelayHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { engine, rx, cancel }, RelayHandle { tx })
    }

    /// Process the inbox until cancelled or every handle is dropped.
    ///
    /// Returns the engine so callers can inspect final state.
    pub async fn run(mut self) -> RelayEngine {
        info!("relay worker starting");
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!("relay worker received shutdown signal");
                    break;
                }
                message = self.rx.recv() => {
                    let Some(message) = message else {
                        info!("all relay handles dropped");
                        break;
                    };
                    self.handle(message).await;
                }
            }
        }
        self.engine
    }

    async fn handle(&mut self, message: Inbound) {
        match message {
            Inbound::Raw(raw) => {
                self.engine.on_raw_record(raw).await;
            }
            Inbound::Consent(decision) => {
                self.engine.on_consent_decision(decision).await;
            }
            Inbound::Flush(done) => {
                debug!("inbox flushed");
                let _ = done.send(());
            }
        }
    }
}
