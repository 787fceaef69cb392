use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::id::{generate_id, MovieId};
use super::now_millis;
use crate::room::User;

/// Caller-supplied description of how a playlist entry is sourced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieBase {
    pub url: String,
    pub name: String,
    /// Live source (no fixed duration)
    pub live: bool,
    /// Served through this node instead of directly by the client
    pub proxy: bool,
    /// Pushed to the live server by an RTMP publisher
    pub rtmp_source: bool,
    /// Media type hint ("m3u8", "flv", ...)
    #[serde(rename = "type")]
    pub media_type: String,
    pub headers: HashMap<String, String>,
}

impl MovieBase {
    /// Whether this entry owns a persistent channel on the live server
    #[must_use]
    pub const fn needs_live_channel(&self) -> bool {
        self.rtmp_source || (self.proxy && self.live)
    }
}

/// Playlist entry, owned by the room's playlist
#[derive(Debug, Clone)]
pub struct Movie {
    pub(crate) id: MovieId,
    pub(crate) base: MovieBase,
    pub(crate) pull_key: String,
    pub(crate) create_at: i64,
    pub(crate) last_edit_at: i64,
    pub(crate) creator: Arc<User>,
}

impl Movie {
    /// Entries that need a live channel get a fresh pull key
    pub(crate) fn new(id: MovieId, base: MovieBase, creator: Arc<User>) -> Self {
        let now = now_millis();
        let pull_key = if base.needs_live_channel() {
            generate_id()
        } else {
            String::new()
        };
        Self {
            id,
            base,
            pull_key,
            create_at: now,
            last_edit_at: now,
            creator,
        }
    }

    #[must_use]
    pub const fn id(&self) -> MovieId {
        self.id
    }

    #[must_use]
    pub const fn base(&self) -> &MovieBase {
        &self.base
    }

    #[must_use]
    pub fn pull_key(&self) -> &str {
        &self.pull_key
    }

    #[must_use]
    pub fn creator(&self) -> &Arc<User> {
        &self.creator
    }

    #[must_use]
    pub const fn needs_live_channel(&self) -> bool {
        self.base.needs_live_channel()
    }

    /// Detached copy safe to hand to other components
    #[must_use]
    pub fn info(&self) -> MovieInfo {
        MovieInfo {
            id: self.id,
            base: self.base.clone(),
            pull_key: self.pull_key.clone(),
            create_at: self.create_at,
            last_edit_at: self.last_edit_at,
            creator: self.creator.name().to_string(),
        }
    }
}

/// Value snapshot of a playlist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieInfo {
    pub id: MovieId,
    #[serde(flatten)]
    pub base: MovieBase,
    pub pull_key: String,
    pub create_at: i64,
    pub last_edit_at: i64,
    pub creator: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_channel_flags() {
        let mut base = MovieBase::default();
        assert!(!base.needs_live_channel());

        base.live = true;
        assert!(!base.needs_live_channel());

        base.proxy = true;
        assert!(base.needs_live_channel());

        let rtmp = MovieBase {
            rtmp_source: true,
            ..MovieBase::default()
        };
        assert!(rtmp.needs_live_channel());
    }

    #[test]
    fn test_movie_info_serializes_flat() {
        let info = MovieInfo {
            id: MovieId(7),
            base: MovieBase {
                url: "https://example.com/a.m3u8".to_string(),
                name: "a".to_string(),
                media_type: "m3u8".to_string(),
                ..MovieBase::default()
            },
            pull_key: String::new(),
            create_at: 1,
            last_edit_at: 2,
            creator: "alice".to_string(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "m3u8");
        assert_eq!(json["creator"], "alice");
    }
}
