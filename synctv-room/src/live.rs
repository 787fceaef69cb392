//! Bridge to the live-stream server's channel namespace.
//!
//! Each room owns one app on the live server; every playlist entry that is
//! pushed by an RTMP publisher or proxied as a live source owns one channel
//! inside that app, keyed by the entry's pull key.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveError {
    #[error("live app not found: {0}")]
    AppNotFound(String),

    #[error("live channel not found: {0}")]
    ChannelNotFound(String),

    #[error("live channel already exists: {0}")]
    ChannelExists(String),

    #[error("live server unavailable: {0}")]
    Unavailable(String),
}

/// One publish point inside an app
#[derive(Debug)]
pub struct LiveChannel {
    name: String,
    created_at: i64,
    closed: AtomicBool,
}

impl LiveChannel {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: crate::models::now_millis(),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn created_at(&self) -> i64 {
        self.created_at
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Channel namespace scoped to a single room
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LiveApp: Send + Sync {
    async fn new_channel(&self, name: &str) -> Result<Arc<LiveChannel>, LiveError>;

    async fn del_channel(&self, name: &str) -> Result<(), LiveError>;

    fn channel(&self, name: &str) -> Option<Arc<LiveChannel>>;
}

/// Process-wide live-stream server
#[async_trait]
pub trait LiveServer: Send + Sync {
    fn get_or_new_app(&self, room_id: &str) -> Arc<dyn LiveApp>;

    async fn del_app(&self, room_id: &str) -> Result<(), LiveError>;
}

/// In-process app holding channels in a concurrent map
#[derive(Debug, Default)]
pub struct MemoryApp {
    name: String,
    channels: DashMap<String, Arc<LiveChannel>>,
}

impl MemoryApp {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: DashMap::new(),
        }
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn close_all(&self) {
        for entry in &self.channels {
            entry.value().close();
        }
        self.channels.clear();
    }
}

#[async_trait]
impl LiveApp for MemoryApp {
    async fn new_channel(&self, name: &str) -> Result<Arc<LiveChannel>, LiveError> {
        match self.channels.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(LiveError::ChannelExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let channel = Arc::new(LiveChannel::new(name));
                vacant.insert(channel.clone());
                debug!(app = %self.name, channel = %name, "Live channel created");
                Ok(channel)
            }
        }
    }

    async fn del_channel(&self, name: &str) -> Result<(), LiveError> {
        let (_, channel) = self
            .channels
            .remove(name)
            .ok_or_else(|| LiveError::ChannelNotFound(name.to_string()))?;
        channel.close();
        debug!(app = %self.name, channel = %name, "Live channel deleted");
        Ok(())
    }

    fn channel(&self, name: &str) -> Option<Arc<LiveChannel>> {
        self.channels.get(name).map(|c| c.value().clone())
    }
}

/// In-process live server, one app per room
#[derive(Debug, Default)]
pub struct MemoryLiveServer {
    apps: DashMap<String, Arc<MemoryApp>>,
}

impl MemoryLiveServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle, for inspecting channels directly
    #[must_use]
    pub fn app(&self, room_id: &str) -> Option<Arc<MemoryApp>> {
        self.apps.get(room_id).map(|a| a.value().clone())
    }

    #[must_use]
    pub fn app_count(&self) -> usize {
        self.apps.len()
    }
}

#[async_trait]
impl LiveServer for MemoryLiveServer {
    fn get_or_new_app(&self, room_id: &str) -> Arc<dyn LiveApp> {
        self.apps
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(MemoryApp::new(room_id)))
            .value()
            .clone()
    }

    async fn del_app(&self, room_id: &str) -> Result<(), LiveError> {
        let (_, app) = self
            .apps
            .remove(room_id)
            .ok_or_else(|| LiveError::AppNotFound(room_id.to_string()))?;
        app.close_all();
        info!(room_id = %room_id, "Live app deleted");
        Ok(())
    }
}
