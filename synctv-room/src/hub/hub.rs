use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::Client;
use super::conn::ClientConn;
use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::models::{ClientAction, Message};
use crate::room::User;

/// Work items drained by [`Hub::serve`]
pub(crate) enum HubEvent {
    Broadcast {
        message: Message,
        options: BroadcastOptions,
    },
    Action {
        client: Arc<Client>,
        action: ClientAction,
    },
    Disconnect {
        user: String,
        client_id: String,
    },
}

/// Receives inbound client actions from the dispatch loop
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle_action(&self, client: &Arc<Client>, action: ClientAction);
}

/// Recipient filter for a broadcast
#[derive(Debug, Clone, Default)]
pub struct BroadcastOptions {
    ignore_users: Vec<String>,
    admins_only: bool,
}

impl BroadcastOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ignore_user(mut self, name: impl Into<String>) -> Self {
        self.ignore_users.push(name.into());
        self
    }

    #[must_use]
    pub const fn admins_only(mut self) -> Self {
        self.admins_only = true;
        self
    }

    fn accepts(&self, client: &Client) -> bool {
        let user = client.user();
        if self.admins_only && !user.is_admin() {
            return false;
        }
        !self.ignore_users.iter().any(|n| n == user.name())
    }
}

/// Per-room connection registry and broadcaster.
///
/// Every broadcast passes through one dispatch loop, so a client sees
/// messages in the order they were broadcast.
pub struct Hub {
    room_id: String,
    config: HubConfig,
    clients: DashMap<String, Arc<Client>>,
    closed: AtomicBool,
    cancel: CancellationToken,
    events_tx: mpsc::UnboundedSender<HubEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<HubEvent>>>,
}

impl Hub {
    #[must_use]
    pub fn new(room_id: impl Into<String>, config: HubConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            room_id: room_id.into(),
            config,
            clients: DashMap::new(),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Registers a connection for `user`.
    ///
    /// A user holds at most one connection: a newer registration replaces
    /// the older one, which is closed.
    pub fn reg_client(&self, user: Arc<User>, conn: Arc<dyn ClientConn>) -> Result<Arc<Client>> {
        if self.closed() {
            return Err(Error::AlreadyClosed);
        }

        let client = Client::spawn(
            user.clone(),
            conn,
            self.events_tx.clone(),
            &self.cancel,
            self.config.client_queue_capacity,
            self.config.send_timeout(),
        );

        if let Some(old) = self.clients.insert(user.name().to_string(), client.clone()) {
            info!(
                room_id = %self.room_id,
                user = %user.name(),
                old_client_id = %old.id(),
                client_id = %client.id(),
                "Replacing existing client connection"
            );
            old.close();
        }

        // Lost a race with close(); don't leave the client behind
        if self.closed() {
            self.remove_client(user.name(), client.id());
            client.close();
            return Err(Error::AlreadyClosed);
        }

        info!(
            room_id = %self.room_id,
            user = %user.name(),
            client_id = %client.id(),
            "Client registered"
        );
        self.broadcast_people();
        Ok(client)
    }

    pub fn unreg_client(&self, user: &User) -> Result<()> {
        let (_, client) = self
            .clients
            .remove(user.name())
            .ok_or_else(|| Error::NotFound(format!("client of user {}", user.name())))?;
        client.close();
        info!(
            room_id = %self.room_id,
            user = %user.name(),
            client_id = %client.id(),
            "Client unregistered"
        );
        self.broadcast_people();
        Ok(())
    }

    /// Queues `message` for delivery by the dispatch loop
    pub fn broadcast(&self, message: Message, options: BroadcastOptions) -> Result<()> {
        if self.closed() {
            return Err(Error::AlreadyClosed);
        }
        self.events_tx
            .send(HubEvent::Broadcast { message, options })
            .map_err(|_| Error::AlreadyClosed)
    }

    #[must_use]
    pub fn client(&self, user_name: &str) -> Option<Arc<Client>> {
        self.clients.get(user_name).map(|c| c.value().clone())
    }

    #[must_use]
    pub fn client_num(&self) -> i64 {
        i64::try_from(self.clients.len()).unwrap_or(i64::MAX)
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes every client exactly once. Returns false if already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();

        let names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, client)) = self.clients.remove(&name) {
                client.close();
            }
        }
        info!(room_id = %self.room_id, "Hub closed");
        true
    }

    /// Closes every client but keeps the hub open for new registrations
    pub fn close_all_clients(&self) {
        let names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, client)) = self.clients.remove(&name) {
                client.close();
            }
        }
        self.broadcast_people();
    }

    /// Dispatch loop; returns when the hub is closed.
    ///
    /// Only one loop may run per hub.
    pub async fn serve(&self, handler: Arc<dyn ActionHandler>) -> Result<()> {
        let mut rx = self
            .events_rx
            .lock()
            .take()
            .ok_or_else(|| Error::Internal(format!("hub {} is already serving", self.room_id)))?;

        debug!(room_id = %self.room_id, "Hub dispatch loop started");
        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                HubEvent::Broadcast { message, options } => self.fan_out(&message, &options),
                HubEvent::Action { client, action } => {
                    if !client.is_closed() {
                        handler.handle_action(&client, action).await;
                    }
                }
                HubEvent::Disconnect { user, client_id } => {
                    if self.remove_client(&user, &client_id) {
                        info!(
                            room_id = %self.room_id,
                            user = %user,
                            client_id = %client_id,
                            "Client disconnected"
                        );
                        self.broadcast_people();
                    }
                }
            }
        }
        debug!(room_id = %self.room_id, "Hub dispatch loop stopped");
        Ok(())
    }

    fn fan_out(&self, message: &Message, options: &BroadcastOptions) {
        let frame: Arc<str> = match serde_json::to_string(message) {
            Ok(frame) => frame.into(),
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "Failed to encode broadcast");
                return;
            }
        };

        let targets: Vec<Arc<Client>> = self
            .clients
            .iter()
            .filter(|e| options.accepts(e.value()))
            .map(|e| e.value().clone())
            .collect();

        let mut evicted = false;
        for client in &targets {
            match client.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        room_id = %self.room_id,
                        user = %client.user().name(),
                        client_id = %client.id(),
                        event_type = %message.event_type(),
                        "Client queue full, dropping slow client"
                    );
                    evicted |= self.remove_client(client.user().name(), client.id());
                    client.close();
                }
                Err(TrySendError::Closed(_)) => {
                    evicted |= self.remove_client(client.user().name(), client.id());
                }
            }
        }

        debug!(
            room_id = %self.room_id,
            event_type = %message.event_type(),
            recipients = targets.len(),
            "Broadcast delivered"
        );

        if evicted {
            self.broadcast_people();
        }
    }

    /// Removes the entry only if it still belongs to `client_id`
    fn remove_client(&self, user: &str, client_id: &str) -> bool {
        self.clients
            .remove_if(user, |_, c| c.id() == client_id)
            .is_some()
    }

    fn broadcast_people(&self) {
        let people = self.client_num();
        if let Err(e) = self.broadcast(Message::ChangePeople { people }, BroadcastOptions::new()) {
            debug!(room_id = %self.room_id, error = %e, "Skipping people count update");
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
