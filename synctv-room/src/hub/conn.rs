use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnError {
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Full-duplex text stream terminated outside this crate (a websocket, a
/// gRPC stream, ...). The hub owns closing it once registered.
#[async_trait]
pub trait ClientConn: Send + Sync {
    async fn send(&self, frame: String) -> Result<(), ConnError>;

    /// `None` once the peer has gone away
    async fn recv(&self) -> Option<Result<String, ConnError>>;

    async fn close(&self);
}

/// One end of an in-process connection pair
pub struct MemoryConn {
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
    closed: CancellationToken,
}

impl MemoryConn {
    const DEFAULT_CAPACITY: usize = 1024;

    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// A small capacity lets tests simulate a peer that stops reading
    #[must_use]
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        let closed = CancellationToken::new();
        (
            Self {
                tx: a_tx,
                rx: Mutex::new(a_rx),
                closed: closed.clone(),
            },
            Self {
                tx: b_tx,
                rx: Mutex::new(b_rx),
                closed,
            },
        )
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once either end closes the pair
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

#[async_trait]
impl ClientConn for MemoryConn {
    async fn send(&self, frame: String) -> Result<(), ConnError> {
        tokio::select! {
            () = self.closed.cancelled() => Err(ConnError::Closed),
            res = self.tx.send(frame) => res.map_err(|_| ConnError::Closed),
        }
    }

    async fn recv(&self) -> Option<Result<String, ConnError>> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            () = self.closed.cancelled() => None,
            frame = rx.recv() => frame.map(Ok),
        }
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}
