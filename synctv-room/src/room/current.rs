use parking_lot::RwLock;

use crate::models::{now_millis, CurrentSnapshot, MovieId, MovieInfo, Status};

#[derive(Default)]
struct CurrentState {
    movie: Option<MovieInfo>,
    status: Status,
}

impl CurrentState {
    /// Timestamps never go backwards even if the wall clock does
    fn stamp(&mut self) {
        self.status.last_update_time = now_millis().max(self.status.last_update_time);
        self.status.seq += 1;
    }

    /// Points at `movie` (or nothing), paused at the start
    fn rewind(&mut self, movie: Option<MovieInfo>) {
        self.movie = movie;
        self.status.seek = 0.0;
        self.status.playing = false;
        self.status.time_diff = 0.0;
        self.stamp();
    }

    fn apply_seek(&mut self, seek: f64, rate: f64, time_diff: f64) {
        self.status.seek = if self.status.playing {
            seek + time_diff * rate
        } else {
            seek
        };
        self.status.rate = rate;
        self.status.time_diff = time_diff;
    }
}

/// Shared playback cursor of a room
#[derive(Default)]
pub struct Current {
    state: RwLock<CurrentState>,
}

impl Current {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn movie(&self) -> Option<MovieInfo> {
        self.state.read().movie.clone()
    }

    /// Status exactly as last written
    #[must_use]
    pub fn status(&self) -> Status {
        self.state.read().status
    }

    /// Status with the seek position carried forward to now
    #[must_use]
    pub fn snapshot(&self) -> CurrentSnapshot {
        let state = self.state.read();
        let now = now_millis().max(state.status.last_update_time);
        let mut status = state.status;
        status.seek = status.projected_seek(now);
        status.last_update_time = now;
        CurrentSnapshot {
            movie: state.movie.clone(),
            status,
        }
    }

    /// Switches the active entry and rewinds to a paused start.
    ///
    /// The playback rate carries over to the new entry.
    pub fn set_movie(&self, movie: MovieInfo) -> CurrentSnapshot {
        let mut state = self.state.write();
        state.rewind(Some(movie));
        CurrentSnapshot {
            movie: state.movie.clone(),
            status: state.status,
        }
    }

    /// Clears the active entry if it is one of `ids`
    pub fn clear_if_any(&self, ids: &[MovieId]) -> bool {
        let mut state = self.state.write();
        let hit = state.movie.as_ref().is_some_and(|m| ids.contains(&m.id));
        if hit {
            state.rewind(None);
        }
        hit
    }

    /// When playing, the stored seek is advanced by the reporter's skew
    pub fn set_status(&self, playing: bool, seek: f64, rate: f64, time_diff: f64) -> Status {
        let mut state = self.state.write();
        state.status.playing = playing;
        state.apply_seek(seek, rate, time_diff);
        state.stamp();
        state.status
    }

    /// Like [`Current::set_status`] but leaves the play state untouched
    pub fn set_seek_rate(&self, seek: f64, rate: f64, time_diff: f64) -> Status {
        let mut state = self.state.write();
        state.apply_seek(seek, rate, time_diff);
        state.stamp();
        state.status
    }
}
