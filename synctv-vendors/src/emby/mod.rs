//! Emby/Jellyfin vendor

mod client;
mod error;
mod grpc;
mod service;
mod types;

pub use error::EmbyError;
pub use grpc::{new_emby_grpc_client, GrpcEmbyClient};
pub use service::{EmbyInterface, EmbyService};
