use serde::{Deserialize, Serialize};

use super::movie::MovieInfo;

/// Playback clock shared by everyone in a room
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub playing: bool,
    /// Position in seconds at `last_update_time`
    pub seek: f64,
    pub rate: f64,
    /// Skew between the reporting client's clock and the server, in seconds
    pub time_diff: f64,
    /// Milliseconds since the epoch, never decreases within a room
    pub last_update_time: i64,
    /// Tie-breaker for updates stamped in the same millisecond
    pub seq: u64,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            playing: false,
            seek: 0.0,
            rate: 1.0,
            time_diff: 0.0,
            last_update_time: 0,
            seq: 0,
        }
    }
}

impl Status {
    /// Last-write-wins ordering for receivers that may see updates out of order
    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        (self.last_update_time, self.seq) > (other.last_update_time, other.seq)
    }

    /// Position extrapolated to `now_ms` assuming playback continued at `rate`
    #[must_use]
    pub fn projected_seek(&self, now_ms: i64) -> f64 {
        if !self.playing {
            return self.seek;
        }
        let elapsed = (now_ms - self.last_update_time).max(0) as f64 / 1000.0;
        self.seek + elapsed * self.rate
    }
}

/// Immutable view of the room's playback cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSnapshot {
    pub movie: Option<MovieInfo>,
    pub status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_by_time_then_seq() {
        let a = Status {
            last_update_time: 10,
            seq: 5,
            ..Status::default()
        };
        let b = Status {
            last_update_time: 11,
            seq: 1,
            ..Status::default()
        };
        let c = Status {
            last_update_time: 11,
            seq: 2,
            ..Status::default()
        };
        assert!(b.is_newer_than(&a));
        assert!(c.is_newer_than(&b));
        assert!(!a.is_newer_than(&a));
    }

    #[test]
    fn test_projected_seek() {
        let paused = Status {
            seek: 30.0,
            last_update_time: 1_000,
            ..Status::default()
        };
        assert!((paused.projected_seek(5_000) - 30.0).abs() < f64::EPSILON);

        let playing = Status {
            playing: true,
            seek: 30.0,
            rate: 2.0,
            last_update_time: 1_000,
            ..Status::default()
        };
        assert!((playing.projected_seek(3_000) - 34.0).abs() < 1e-9);
        // Clock going backwards never rewinds
        assert!((playing.projected_seek(0) - 30.0).abs() < f64::EPSILON);
    }
}
