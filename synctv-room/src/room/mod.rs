mod current;
mod init;
mod movies;
#[allow(clippy::module_inception)]
mod room;
mod user;

pub use current::Current;
pub use init::InitCell;
pub use movies::Movies;
pub use room::{Room, RoomOption};
pub use user::{User, UserInfo, UserOption};
