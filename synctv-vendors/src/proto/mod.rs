//! Wire messages and client stubs for the remote vendor service, generated
//! from `proto/*.proto` by `build.rs`.

pub mod emby {
    tonic::include_proto!("api.emby");
}
