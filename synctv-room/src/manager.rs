use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use synctv_vendors::VendorRegistry;
use tracing::{info, warn};

use crate::config::RoomConfig;
use crate::error::{Error, Result};
use crate::live::LiveServer;
use crate::models::now_millis;
use crate::room::{Room, RoomOption};

/// Registry of the rooms live in this process.
///
/// Collaborators that used to be process-wide defaults (live server, media
/// catalog clients) are handed in here and shared by every room.
pub struct RoomManager {
    rooms: DashMap<String, Arc<Room>>,
    live: Arc<dyn LiveServer>,
    vendors: Arc<VendorRegistry>,
    config: RoomConfig,
}

impl RoomManager {
    #[must_use]
    pub fn new(live: Arc<dyn LiveServer>, vendors: Arc<VendorRegistry>, config: RoomConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            live,
            vendors,
            config,
        }
    }

    #[must_use]
    pub const fn vendors(&self) -> &Arc<VendorRegistry> {
        &self.vendors
    }

    /// Builds, initializes and starts a room under a fresh id
    pub async fn create_room(
        &self,
        id: &str,
        password: &str,
        options: impl IntoIterator<Item = RoomOption>,
    ) -> Result<Arc<Room>> {
        if self.rooms.contains_key(id) {
            return Err(Error::AlreadyExists(format!("room {id}")));
        }

        let options = std::iter::once(RoomOption::with_config(self.config.clone())).chain(options);
        let room = Room::new(id, password, self.live.clone(), options).await?;

        match self.rooms.entry(id.to_string()) {
            Entry::Occupied(_) => return Err(Error::AlreadyExists(format!("room {id}"))),
            Entry::Vacant(vacant) => {
                room.init();
                vacant.insert(room.clone());
            }
        }
        room.start();
        info!(room_id = %id, "Room created");
        Ok(room)
    }

    pub fn get_room(&self, id: &str) -> Result<Arc<Room>> {
        self.rooms
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::NotFound(format!("room {id}")))
    }

    /// Unregisters and closes a room
    pub async fn delete_room(&self, id: &str) -> Result<()> {
        let (_, room) = self
            .rooms
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("room {id}")))?;
        room.close().await?;
        info!(room_id = %id, "Room deleted");
        Ok(())
    }

    #[must_use]
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|r| r.value().clone()).collect()
    }

    /// Rooms not marked hidden
    #[must_use]
    pub fn public_rooms(&self) -> Vec<Arc<Room>> {
        self.rooms
            .iter()
            .filter(|r| !r.value().hidden())
            .map(|r| r.value().clone())
            .collect()
    }

    #[must_use]
    pub fn room_num(&self) -> usize {
        self.rooms.len()
    }

    /// Closes rooms idle for longer than `max_idle`, returning their ids
    pub async fn close_inactive(&self, max_idle: Duration) -> Vec<String> {
        let cutoff = now_millis() - i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);
        let idle: Vec<String> = self
            .rooms
            .iter()
            .filter(|r| r.value().last_active_time() < cutoff)
            .map(|r| r.key().clone())
            .collect();

        let mut closed = Vec::with_capacity(idle.len());
        for id in idle {
            let Some((_, room)) = self.rooms.remove(&id) else {
                continue;
            };
            if let Err(e) = room.close().await {
                warn!(room_id = %id, error = %e, "Failed to close idle room");
            }
            info!(room_id = %id, "Closed idle room");
            closed.push(id);
        }
        closed
    }

    /// Closes every room and the vendor backends
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.rooms.iter().map(|r| r.key().clone()).collect();
        let rooms: Vec<Arc<Room>> = ids
            .iter()
            .filter_map(|id| self.rooms.remove(id).map(|(_, room)| room))
            .collect();

        let results = join_all(rooms.iter().map(|room| room.close())).await;
        for (room, result) in rooms.iter().zip(results) {
            if let Err(e) = result {
                warn!(room_id = %room.id(), error = %e, "Failed to close room");
            }
        }
        self.vendors.close();
        info!("All rooms closed");
    }
}
