use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::conn::ClientConn;
use super::hub::HubEvent;
use crate::models::{generate_id, ClientAction, Message};
use crate::room::User;

/// A registered connection of one user.
///
/// Outbound frames go through a bounded queue drained by a dedicated writer
/// task; a reader task turns inbound frames into hub events. Either task
/// ending tears the whole client down.
pub struct Client {
    id: String,
    user: Arc<User>,
    outbound: mpsc::Sender<Arc<str>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Client {
    pub(crate) fn spawn(
        user: Arc<User>,
        conn: Arc<dyn ClientConn>,
        events: mpsc::UnboundedSender<HubEvent>,
        parent: &CancellationToken,
        queue_capacity: usize,
        send_timeout: Duration,
    ) -> Arc<Self> {
        let (outbound, rx) = mpsc::channel(queue_capacity.max(1));
        let client = Arc::new(Self {
            id: generate_id(),
            user,
            outbound,
            cancel: parent.child_token(),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(write_loop(
            client.clone(),
            conn.clone(),
            rx,
            events.clone(),
            send_timeout,
        ));
        tokio::spawn(read_loop(client.clone(), conn, events));
        client
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn user(&self) -> &Arc<User> {
        &self.user
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    /// Queues an already encoded frame without waiting
    pub(crate) fn try_send(&self, frame: Arc<str>) -> Result<(), TrySendError<Arc<str>>> {
        self.outbound.try_send(frame)
    }

    /// Encodes and queues a message addressed to this client only
    pub fn send_message(&self, message: &Message) -> crate::Result<()> {
        let frame: Arc<str> = serde_json::to_string(message)?.into();
        self.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => {
                crate::Error::Internal(format!("client {} queue is full", self.id))
            }
            TrySendError::Closed(_) => crate::Error::AlreadyClosed,
        })
    }

    /// Stops both tasks; the connection is closed by the writer on its way out
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(user = %self.user.name(), client_id = %self.id, "Closing client");
            self.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("user", &self.user.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn write_loop(
    client: Arc<Client>,
    conn: Arc<dyn ClientConn>,
    mut rx: mpsc::Receiver<Arc<str>>,
    events: mpsc::UnboundedSender<HubEvent>,
    send_timeout: Duration,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = client.cancel.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        match tokio::time::timeout(send_timeout, conn.send(frame.to_string())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(
                    user = %client.user.name(),
                    client_id = %client.id,
                    error = %e,
                    "Client connection send failed"
                );
                break;
            }
            Err(_) => {
                warn!(
                    user = %client.user.name(),
                    client_id = %client.id,
                    timeout = ?send_timeout,
                    "Client send timed out, dropping slow client"
                );
                break;
            }
        }
    }

    client.close();
    conn.close().await;
    let _ = events.send(HubEvent::Disconnect {
        user: client.user.name().to_string(),
        client_id: client.id.clone(),
    });
}

async fn read_loop(
    client: Arc<Client>,
    conn: Arc<dyn ClientConn>,
    events: mpsc::UnboundedSender<HubEvent>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = client.cancel.cancelled() => break,
            frame = conn.recv() => frame,
        };

        match frame {
            Some(Ok(text)) => match serde_json::from_str::<ClientAction>(&text) {
                Ok(action) => {
                    client.user.update_act();
                    let event = HubEvent::Action {
                        client: client.clone(),
                        action,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(
                        user = %client.user.name(),
                        client_id = %client.id,
                        error = %e,
                        "Ignoring malformed client frame"
                    );
                    let _ = client.send_message(&Message::Error {
                        message: format!("invalid message: {e}"),
                    });
                }
            },
            Some(Err(e)) => {
                debug!(
                    user = %client.user.name(),
                    client_id = %client.id,
                    error = %e,
                    "Client connection receive failed"
                );
                break;
            }
            None => break,
        }
    }

    client.close();
}
