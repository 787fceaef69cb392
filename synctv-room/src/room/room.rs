use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::RngExt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::current::Current;
use super::init::InitCell;
use super::movies::Movies;
use super::user::{User, UserInfo, UserOption};
use crate::auth::{hash_password, verify_password};
use crate::config::RoomConfig;
use crate::error::{Error, Result};
use crate::hub::{ActionHandler, BroadcastOptions, Client, ClientConn, Hub};
use crate::live::{LiveApp, LiveChannel, LiveServer};
use crate::models::{
    now_millis, ClientAction, CurrentSnapshot, Message, Movie, MovieBase, MovieId, MovieInfo,
    PlaybackReport, RoomId, Status, StatusKind,
};

/// Construction-time tweak applied before the room is published
pub struct RoomOption(Box<dyn FnOnce(&mut Room) + Send>);

impl RoomOption {
    /// Zero means "pick a random version"
    #[must_use]
    pub fn with_version(version: u64) -> Self {
        Self(Box::new(move |r| *r.version.get_mut() = version))
    }

    #[must_use]
    pub fn with_hidden(hidden: bool) -> Self {
        Self(Box::new(move |r| *r.hidden.get_mut() = hidden))
    }

    /// Promotes `user` to admin and makes it the room's first user
    #[must_use]
    pub fn with_root_user(user: Arc<User>) -> Self {
        Self(Box::new(move |r| {
            user.set_admin(true);
            user.bind_room(r.this.clone());
            r.users.insert(user.name().to_string(), user.clone());
            *r.root_user.get_mut() = Some(user);
        }))
    }

    #[must_use]
    pub fn with_config(config: RoomConfig) -> Self {
        Self(Box::new(move |r| r.config = config))
    }
}

/// Components created by [`Room::init`]
struct RoomState {
    hub: Hub,
    movies: Movies,
    current: Current,
    live_app: Arc<dyn LiveApp>,
}

/// A synchronized playback session.
///
/// Sub-structures lock independently; scalar fields are plain atomics.
pub struct Room {
    this: Weak<Room>,
    id: RoomId,
    config: RoomConfig,
    password: RwLock<Option<Arc<str>>>,
    need_password: AtomicBool,
    version: AtomicU64,
    hidden: AtomicBool,
    last_active: AtomicI64,
    create_at: AtomicI64,
    mid: AtomicU64,
    root_user: RwLock<Option<Arc<User>>>,
    users: DashMap<String, Arc<User>>,
    live: Arc<dyn LiveServer>,
    state: InitCell<RoomState>,
}

impl Room {
    /// Builds an uninitialized room; call [`Room::init`] before use.
    pub async fn new(
        id: impl Into<String>,
        password: &str,
        live: Arc<dyn LiveServer>,
        options: impl IntoIterator<Item = RoomOption>,
    ) -> Result<Arc<Self>> {
        let id = RoomId::parse(id)?;
        let now = now_millis();

        let room = Arc::new_cyclic(|this| {
            let mut room = Self {
                this: this.clone(),
                id,
                config: RoomConfig::default(),
                password: RwLock::new(None),
                need_password: AtomicBool::new(false),
                version: AtomicU64::new(0),
                hidden: AtomicBool::new(false),
                last_active: AtomicI64::new(now),
                create_at: AtomicI64::new(now),
                mid: AtomicU64::new(0),
                root_user: RwLock::new(None),
                users: DashMap::new(),
                live,
                state: InitCell::new(),
            };
            for option in options {
                (option.0)(&mut room);
            }
            if *room.version.get_mut() == 0 {
                // Leave headroom for later increments
                *room.version.get_mut() = rand::rng().random_range(1..=u64::MAX / 2);
            }
            room
        });

        room.set_password(password).await?;
        Ok(room)
    }

    /// Creates the hub, playlist, cursor and live app exactly once.
    ///
    /// Concurrent callers block until the first one has finished.
    pub fn init(&self) {
        let (_, created) = self.state.get_or_init(|| RoomState {
            hub: Hub::new(self.id.as_str(), self.config.hub.clone()),
            movies: Movies::new(),
            current: Current::new(),
            live_app: self.live.get_or_new_app(self.id.as_str()),
        });
        if created {
            info!(room_id = %self.id, "Room initialized");
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.is_ready()
    }

    fn state(&self) -> Arc<RoomState> {
        self.state
            .get()
            .unwrap_or_else(|| panic!("room {} used before init()", self.id))
    }

    #[must_use]
    pub const fn id(&self) -> &RoomId {
        &self.id
    }

    #[must_use]
    pub fn create_at(&self) -> i64 {
        self.create_at.load(Ordering::Acquire)
    }

    pub fn update_active_time(&self) {
        self.last_active.store(now_millis(), Ordering::Release);
    }

    #[must_use]
    pub fn last_active_time(&self) -> i64 {
        self.last_active.load(Ordering::Acquire)
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::Release);
    }

    #[must_use]
    pub fn hidden(&self) -> bool {
        self.hidden.load(Ordering::Acquire)
    }

    // ---- access control -------------------------------------------------

    /// Empty clears the password. Always bumps the version.
    pub async fn set_password(&self, password: &str) -> Result<()> {
        let hash = if password.is_empty() {
            None
        } else {
            Some(hash_password(password, &self.config.password).await?)
        };
        {
            // Flag and hash change together under the write guard
            let mut stored = self.password.write();
            self.need_password.store(hash.is_some(), Ordering::Release);
            *stored = hash.map(Into::into);
        }
        self.update_version();
        debug!(room_id = %self.id, need_password = self.need_password(), "Room password changed");
        Ok(())
    }

    /// Changes the password and drops every connected client
    pub async fn set_password_and_close_all(&self, password: &str) -> Result<()> {
        self.set_password(password).await?;
        self.state().hub.close_all_clients();
        info!(room_id = %self.id, "Closed all clients after password change");
        Ok(())
    }

    pub async fn check_password(&self, password: &str) -> bool {
        if !self.need_password() {
            return true;
        }
        let hash = self.password.read().clone();
        match hash {
            Some(hash) => verify_password(password, &hash).await,
            None => true,
        }
    }

    #[must_use]
    pub fn need_password(&self) -> bool {
        self.need_password.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn has_password_hash(&self) -> bool {
        self.password.read().is_some()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn check_version(&self, version: u64) -> bool {
        self.version() == version
    }

    pub fn set_version(&self, version: u64) {
        self.version.store(version, Ordering::Release);
    }

    fn update_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    // ---- users ----------------------------------------------------------

    #[must_use]
    pub fn root_user(&self) -> Option<Arc<User>> {
        self.root_user.read().clone()
    }

    pub fn set_root_user(&self, user: Arc<User>) {
        user.bind_room(self.this.clone());
        *self.root_user.write() = Some(user);
    }

    /// Creates a user bound to this room; the name must be unused
    pub async fn new_user(
        &self,
        name: &str,
        password: &str,
        options: impl IntoIterator<Item = UserOption>,
    ) -> Result<Arc<User>> {
        if self.users.contains_key(name) {
            return Err(Error::AlreadyExists(format!("user {name}")));
        }
        let user = Arc::new(User::new(name, password, &self.config.password, options).await?);
        self.add_user(user.clone())?;
        Ok(user)
    }

    pub fn add_user(&self, user: Arc<User>) -> Result<()> {
        match self.users.entry(user.name().to_string()) {
            Entry::Occupied(_) => Err(Error::AlreadyExists(format!("user {}", user.name()))),
            Entry::Vacant(vacant) => {
                user.bind_room(self.this.clone());
                debug!(room_id = %self.id, user = %user.name(), "User added");
                vacant.insert(user);
                Ok(())
            }
        }
    }

    pub fn get_user(&self, name: &str) -> Result<Arc<User>> {
        self.users
            .get(name)
            .map(|u| u.value().clone())
            .ok_or_else(|| Error::NotFound(format!("user {name}")))
    }

    pub fn del_user(&self, name: &str) -> Result<()> {
        self.get_and_del_user(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("user {name}")))
    }

    pub fn get_and_del_user(&self, name: &str) -> Option<Arc<User>> {
        self.users.remove(name).map(|(_, u)| u)
    }

    /// Returns the existing user of that name, or creates one
    pub async fn get_or_new_user(
        &self,
        name: &str,
        password: &str,
        options: impl IntoIterator<Item = UserOption>,
    ) -> Result<Arc<User>> {
        if let Some(user) = self.users.get(name) {
            return Ok(user.value().clone());
        }
        let user = Arc::new(User::new(name, password, &self.config.password, options).await?);
        let stored = self
            .users
            .entry(user.name().to_string())
            .or_insert_with(|| {
                user.bind_room(self.this.clone());
                user
            })
            .value()
            .clone();
        Ok(stored)
    }

    #[must_use]
    pub fn user_list(&self) -> Vec<UserInfo> {
        self.users.iter().map(|u| UserInfo::from(&**u.value())).collect()
    }

    // ---- lifecycle ------------------------------------------------------

    pub async fn new_live_channel(&self, name: &str) -> Result<Arc<LiveChannel>> {
        Ok(self.state().live_app.new_channel(name).await?)
    }

    /// Runs [`Room::serve`] on a background task
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let room = self.clone();
        tokio::spawn(async move {
            if let Err(e) = room.serve().await {
                warn!(room_id = %room.id, error = %e, "Room dispatch loop failed");
            }
        })
    }

    /// Dispatch loop for hub traffic; returns once the room is closed
    pub async fn serve(&self) -> Result<()> {
        let handler = Arc::new(RoomActions {
            room: self.this.clone(),
        });
        self.state().hub.serve(handler).await
    }

    /// Closes the hub, then releases the room's app on the live server.
    ///
    /// Closing again is a no-op.
    pub async fn close(&self) -> Result<()> {
        if !self.state().hub.close() {
            return Ok(());
        }
        self.live.del_app(self.id.as_str()).await?;
        info!(room_id = %self.id, "Room closed");
        Ok(())
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.state().hub.closed()
    }

    pub fn client_num(&self) -> i64 {
        self.update_active_time();
        self.state().hub.client_num()
    }

    pub fn reg_client(&self, user: Arc<User>, conn: Arc<dyn ClientConn>) -> Result<Arc<Client>> {
        self.update_active_time();
        self.state().hub.reg_client(user, conn)
    }

    pub fn unreg_client(&self, user: &User) -> Result<()> {
        self.update_active_time();
        self.state().hub.unreg_client(user)
    }

    pub fn broadcast(&self, message: Message, options: BroadcastOptions) -> Result<()> {
        self.update_active_time();
        self.state().hub.broadcast(message, options)
    }

    /// Best-effort notification after a committed change
    fn notify(&self, state: &RoomState, message: Message) {
        if let Err(e) = state.hub.broadcast(message, BroadcastOptions::new()) {
            debug!(room_id = %self.id, error = %e, "Change notification not sent");
        }
    }

    // ---- playlist -------------------------------------------------------

    /// Builds a playlist entry with the next free id of this room
    pub fn new_movie(&self, base: MovieBase, creator: Arc<User>) -> Movie {
        let id = MovieId(self.mid.fetch_add(1, Ordering::AcqRel) + 1);
        Movie::new(id, base, creator)
    }

    pub async fn push_back_movie(&self, movie: Movie) -> Result<MovieInfo> {
        self.push_movie(movie, false).await
    }

    pub async fn push_front_movie(&self, movie: Movie) -> Result<MovieInfo> {
        self.push_movie(movie, true).await
    }

    /// Live entries get their channel before they become visible
    async fn push_movie(&self, movie: Movie, front: bool) -> Result<MovieInfo> {
        let state = self.state();
        if state.hub.closed() {
            return Err(Error::AlreadyClosed);
        }
        self.update_active_time();

        let info = movie.info();
        if movie.needs_live_channel() {
            state.live_app.new_channel(movie.pull_key()).await?;
        }

        let pushed = if front {
            state.movies.push_front_movie(movie)
        } else {
            state.movies.push_back_movie(movie)
        };
        if let Err(e) = pushed {
            if info.base.needs_live_channel() {
                if let Err(cleanup) = state.live_app.del_channel(&info.pull_key).await {
                    warn!(
                        room_id = %self.id,
                        pull_key = %info.pull_key,
                        error = %cleanup,
                        "Failed to release channel of rejected movie"
                    );
                }
            }
            return Err(e);
        }

        debug!(room_id = %self.id, movie_id = %info.id, front, "Movie added");
        self.notify(&state, Message::ChangeMovies);
        Ok(info)
    }

    /// Removes the entries, then tears down their live channels.
    ///
    /// A teardown failure is reported but the removal stands.
    pub async fn del_movie(&self, ids: &[MovieId]) -> Result<()> {
        self.update_active_time();
        let state = self.state();
        let removed = state.movies.get_and_del_movie(ids)?;
        if state.current.clear_if_any(ids) {
            self.notify(
                &state,
                Message::ChangeCurrent {
                    current: state.current.snapshot(),
                },
            );
        }
        self.notify(&state, Message::ChangeMovies);
        self.close_live(&state, &removed).await
    }

    pub async fn clear_movies(&self) -> Result<()> {
        self.update_active_time();
        let state = self.state();
        let removed = state.movies.get_and_clear();
        let ids: Vec<MovieId> = removed.iter().map(Movie::id).collect();
        if state.current.clear_if_any(&ids) {
            self.notify(
                &state,
                Message::ChangeCurrent {
                    current: state.current.snapshot(),
                },
            );
        }
        self.notify(&state, Message::ChangeMovies);
        self.close_live(&state, &removed).await
    }

    async fn close_live(&self, state: &RoomState, removed: &[Movie]) -> Result<()> {
        let mut first_err = None;
        for movie in removed.iter().filter(|m| m.needs_live_channel()) {
            if let Err(source) = state.live_app.del_channel(movie.pull_key()).await {
                warn!(
                    room_id = %self.id,
                    movie_id = %movie.id(),
                    pull_key = %movie.pull_key(),
                    error = %source,
                    "Failed to tear down live channel"
                );
                first_err.get_or_insert(Error::ChannelTeardown {
                    pull_key: movie.pull_key().to_string(),
                    source,
                });
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn swap_movie(&self, a: MovieId, b: MovieId) -> Result<()> {
        self.update_active_time();
        let state = self.state();
        state.movies.swap_movie(a, b)?;
        self.notify(&state, Message::ChangeMovies);
        Ok(())
    }

    /// Replaces the source fields of an entry, moving its live channel if
    /// the entry starts or stops needing one.
    pub async fn edit_movie(&self, id: MovieId, base: MovieBase) -> Result<MovieInfo> {
        self.update_active_time();
        let state = self.state();
        let before = state.movies.movie_info(id)?;
        let had_channel = before.base.needs_live_channel();

        let pull_key = match (had_channel, base.needs_live_channel()) {
            (true, true) => before.pull_key.clone(),
            (false, true) => {
                let key = crate::models::generate_id();
                state.live_app.new_channel(&key).await?;
                key
            }
            (_, false) => String::new(),
        };

        let new_key = (!had_channel && !pull_key.is_empty()).then(|| pull_key.clone());
        let after = match state.movies.edit_movie(id, base, pull_key) {
            Ok(after) => after,
            Err(e) => {
                // Removed while the channel was being created
                if let Some(key) = new_key {
                    if let Err(cleanup) = state.live_app.del_channel(&key).await {
                        warn!(
                            room_id = %self.id,
                            movie_id = %id,
                            pull_key = %key,
                            error = %cleanup,
                            "Failed to release channel of vanished movie"
                        );
                    }
                }
                return Err(e);
            }
        };
        self.notify(&state, Message::ChangeMovies);

        if had_channel && !after.base.needs_live_channel() {
            state
                .live_app
                .del_channel(&before.pull_key)
                .await
                .map_err(|source| Error::ChannelTeardown {
                    pull_key: before.pull_key.clone(),
                    source,
                })?;
        }
        Ok(after)
    }

    pub fn movie(&self, id: MovieId) -> Result<MovieInfo> {
        self.state().movies.movie_info(id)
    }

    /// Runs `f` against the stored entry without copying it out
    pub fn with_movie<R>(&self, id: MovieId, f: impl FnOnce(&Movie) -> R) -> Result<R> {
        self.state().movies.with_movie(id, f)
    }

    #[must_use]
    pub fn movie_list(&self) -> Vec<MovieInfo> {
        self.state().movies.movie_list()
    }

    #[must_use]
    pub fn movies_page(&self, offset: usize, limit: usize) -> (Vec<MovieInfo>, usize) {
        self.state().movies.movies_page(offset, limit)
    }

    #[must_use]
    pub fn movie_ids(&self) -> Vec<MovieId> {
        self.state().movies.ids()
    }

    #[must_use]
    pub fn movie_num(&self) -> usize {
        self.state().movies.len()
    }

    // ---- playback cursor ------------------------------------------------

    #[must_use]
    pub fn current(&self) -> CurrentSnapshot {
        self.state().current.snapshot()
    }

    /// Makes `id` the active entry, rewound and paused
    pub fn change_current_movie(&self, id: MovieId) -> Result<CurrentSnapshot> {
        self.update_active_time();
        let state = self.state();
        // Holding the playlist read lock keeps a concurrent delete from
        // slipping between the lookup and the switch
        let current = state
            .movies
            .with_movie(id, |movie| state.current.set_movie(movie.info()))?;
        self.notify(
            &state,
            Message::ChangeCurrent {
                current: current.clone(),
            },
        );
        Ok(current)
    }

    pub fn set_status(&self, playing: bool, seek: f64, rate: f64, time_diff: f64) -> Status {
        self.update_active_time();
        let state = self.state();
        let status = state.current.set_status(playing, seek, rate, time_diff);
        let kind = if playing {
            StatusKind::Play
        } else {
            StatusKind::Pause
        };
        self.publish_status(&state, kind, None, status);
        status
    }

    pub fn set_seek_rate(&self, seek: f64, rate: f64, time_diff: f64) -> Status {
        self.update_active_time();
        let state = self.state();
        let status = state.current.set_seek_rate(seek, rate, time_diff);
        self.publish_status(&state, StatusKind::ChangeSeek, None, status);
        status
    }

    /// The originating client already knows the change and is skipped
    fn publish_status(
        &self,
        state: &RoomState,
        kind: StatusKind,
        sender: Option<&User>,
        status: Status,
    ) {
        let mut options = BroadcastOptions::new();
        if let Some(sender) = sender {
            options = options.ignore_user(sender.name());
        }
        let message = Message::Status {
            kind,
            sender: sender.map(|u| u.name().to_string()),
            status,
        };
        if let Err(e) = state.hub.broadcast(message, options) {
            debug!(room_id = %self.id, error = %e, "Status update not sent");
        }
    }

    // ---- inbound client traffic -----------------------------------------

    fn handle_client_action(&self, client: &Arc<Client>, action: ClientAction) {
        self.update_active_time();
        let state = self.state();
        let user = client.user();

        match action {
            ClientAction::Chat { message } => {
                self.notify(
                    &state,
                    Message::ChatMessage {
                        sender: user.name().to_string(),
                        message,
                        time: now_millis(),
                    },
                );
            }
            ClientAction::Play(r) => {
                let status = state.current.set_status(true, r.seek, r.rate, r.time_diff);
                self.publish_status(&state, StatusKind::Play, Some(user), status);
            }
            ClientAction::Pause(r) => {
                let status = state.current.set_status(false, r.seek, r.rate, r.time_diff);
                self.publish_status(&state, StatusKind::Pause, Some(user), status);
            }
            ClientAction::ChangeSeek(r) => {
                let status = state.current.set_seek_rate(r.seek, r.rate, r.time_diff);
                self.publish_status(&state, StatusKind::ChangeSeek, Some(user), status);
            }
            ClientAction::ChangeRate(r) => {
                let status = state.current.set_seek_rate(r.seek, r.rate, r.time_diff);
                self.publish_status(&state, StatusKind::ChangeRate, Some(user), status);
            }
            ClientAction::CheckSeek(r) => self.check_seek(&state, client, r),
        }
    }

    /// Tells a drifting client where the room clock is
    fn check_seek(&self, state: &RoomState, client: &Arc<Client>, report: PlaybackReport) {
        let snapshot = state.current.snapshot();
        if snapshot.movie.is_none() {
            return;
        }
        let status = snapshot.status;
        let reported = if status.playing {
            report.seek + report.time_diff * report.rate
        } else {
            report.seek
        };
        let drift = reported - status.seek;
        let tolerance = self.config.hub.seek_tolerance_secs;

        let reply = if drift > tolerance {
            Message::TooFast { status }
        } else if drift < -tolerance {
            Message::TooSlow { status }
        } else {
            return;
        };
        debug!(
            room_id = %self.id,
            user = %client.user().name(),
            drift,
            event_type = %reply.event_type(),
            "Client out of sync"
        );
        if let Err(e) = client.send_message(&reply) {
            debug!(room_id = %self.id, client_id = %client.id(), error = %e, "Sync hint not sent");
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("version", &self.version())
            .field("hidden", &self.hidden())
            .field("need_password", &self.need_password())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// Routes hub traffic back into the room without keeping it alive
struct RoomActions {
    room: Weak<Room>,
}

#[async_trait]
impl ActionHandler for RoomActions {
    async fn handle_action(&self, client: &Arc<Client>, action: ClientAction) {
        if let Some(room) = self.room.upgrade() {
            room.handle_client_action(client, action);
        }
    }
}
