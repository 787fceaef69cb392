//! Synchronized group playback core.
//!
//! A [`Room`] owns its users, an ordered playlist ([`Movies`]), the shared
//! playback cursor ([`Current`]) and a broadcast [`Hub`] of client
//! connections. Playlist entries backed by a live source are bridged to
//! channels on a [`LiveServer`].

pub mod auth;
pub mod config;
pub mod error;
pub mod hub;
pub mod live;
pub mod logging;
pub mod manager;
pub mod models;
pub mod room;

pub use crate::config::Config;
pub use error::{Error, Result, ValidationError};
pub use hub::{BroadcastOptions, Client, ClientConn, Hub, MemoryConn};
pub use live::{LiveApp, LiveError, LiveServer, MemoryLiveServer};
pub use manager::RoomManager;
pub use room::{Current, Movies, Room, RoomOption, User, UserOption};
