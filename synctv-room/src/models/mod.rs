pub mod id;
pub mod message;
pub mod movie;
pub mod status;

pub use id::{generate_id, MovieId, RoomId};
pub use message::{ClientAction, Message, PlaybackReport, StatusKind};
pub use movie::{Movie, MovieBase, MovieInfo};
pub use status::{CurrentSnapshot, Status};

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
