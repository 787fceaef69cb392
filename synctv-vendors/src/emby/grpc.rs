//! gRPC-backed Emby client for a remote vendor service

use std::sync::Arc;

use async_trait::async_trait;
use tonic::transport::Channel;

use super::{EmbyError, EmbyInterface};
use crate::error::VendorError;
use crate::proto::emby::emby_client::EmbyClient;
use crate::proto::emby::{
    FsListReq, FsListResp, GetItemReq, GetItemsReq, GetItemsResp, Item, LoginReq, LoginResp,
    MeReq, MeResp, SystemInfoReq, SystemInfoResp,
};

/// Emby client that forwards every call to a remote vendor service.
#[derive(Clone)]
pub struct GrpcEmbyClient {
    inner: EmbyClient<Channel>,
}

impl GrpcEmbyClient {
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: EmbyClient::new(channel),
        }
    }

    // Generated calls take `&mut self`; clones share the channel
    fn client(&self) -> EmbyClient<Channel> {
        self.inner.clone()
    }
}

/// Wrap a connection to a remote vendor service.
///
/// A missing connection is a configuration error, reported up front rather
/// than on first use.
pub fn new_emby_grpc_client(
    channel: Option<Channel>,
) -> Result<Arc<dyn EmbyInterface>, VendorError> {
    let channel = channel.ok_or(VendorError::MissingConnection)?;
    Ok(Arc::new(GrpcEmbyClient::new(channel)))
}

#[async_trait]
impl EmbyInterface for GrpcEmbyClient {
    async fn fs_list(&self, request: FsListReq) -> Result<FsListResp, EmbyError> {
        Ok(self.client().fs_list(request).await?.into_inner())
    }

    async fn get_item(&self, request: GetItemReq) -> Result<Item, EmbyError> {
        Ok(self.client().get_item(request).await?.into_inner())
    }

    async fn get_items(&self, request: GetItemsReq) -> Result<GetItemsResp, EmbyError> {
        Ok(self.client().get_items(request).await?.into_inner())
    }

    async fn get_system_info(&self, request: SystemInfoReq) -> Result<SystemInfoResp, EmbyError> {
        Ok(self.client().get_system_info(request).await?.into_inner())
    }

    async fn login(&self, request: LoginReq) -> Result<LoginResp, EmbyError> {
        Ok(self.client().login(request).await?.into_inner())
    }

    async fn me(&self, request: MeReq) -> Result<MeResp, EmbyError> {
        Ok(self.client().me(request).await?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::transport::Endpoint;

    #[test]
    fn test_missing_connection_rejected() {
        let err = new_emby_grpc_client(None).err().unwrap();
        assert!(matches!(err, VendorError::MissingConnection));
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_at_call_time() {
        let channel = Endpoint::from_static("http://127.0.0.1:1").connect_lazy();
        let client = new_emby_grpc_client(Some(channel)).unwrap();

        let err = client
            .get_system_info(SystemInfoReq {
                host: "http://emby.local".to_string(),
                token: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EmbyError::Rpc { .. }), "unexpected error: {err}");
    }
}
