mod client;
mod conn;
#[allow(clippy::module_inception)]
mod hub;

pub use client::Client;
pub use conn::{ClientConn, ConnError, MemoryConn};
pub use hub::{ActionHandler, BroadcastOptions, Hub};
