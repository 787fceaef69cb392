//! Emby Service
//!
//! In-process implementation of [`EmbyInterface`] that talks HTTP to the
//! media server directly. The remote vendor service runs the same code.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::client::EmbyClient;
use super::types;
use super::EmbyError;
use crate::error::VendorError;
use crate::proto::emby::{
    FsListReq, FsListResp, GetItemReq, GetItemsReq, GetItemsResp, Item, LoginReq, LoginResp,
    MeReq, MeResp, Path, SystemInfoReq, SystemInfoResp,
};

/// Emby operations, expressed over the wire message types so that local and
/// remote backends are interchangeable.
#[async_trait]
pub trait EmbyInterface: Send + Sync {
    async fn fs_list(&self, request: FsListReq) -> Result<FsListResp, EmbyError>;

    async fn get_item(&self, request: GetItemReq) -> Result<Item, EmbyError>;

    async fn get_items(&self, request: GetItemsReq) -> Result<GetItemsResp, EmbyError>;

    async fn get_system_info(&self, request: SystemInfoReq) -> Result<SystemInfoResp, EmbyError>;

    async fn login(&self, request: LoginReq) -> Result<LoginResp, EmbyError>;

    async fn me(&self, request: MeReq) -> Result<MeResp, EmbyError>;
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// HTTP-backed Emby service.
///
/// Redirects are disabled to prevent SSRF via redirect to private IPs.
#[derive(Clone)]
pub struct EmbyService {
    http: Client,
}

impl EmbyService {
    pub fn new() -> Result<Self, VendorError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| VendorError::HttpClient(e.to_string()))?;
        Ok(Self { http })
    }

    #[must_use]
    pub const fn with_client(http: Client) -> Self {
        Self { http }
    }

    fn client(&self, host: &str, token: &str, user_id: &str) -> EmbyClient {
        EmbyClient::with_credentials(self.http.clone(), host, token, user_id)
    }
}

#[async_trait]
impl EmbyInterface for EmbyService {
    async fn fs_list(&self, request: FsListReq) -> Result<FsListResp, EmbyError> {
        let client = self.client(&request.host, &request.token, &request.user_id);
        let listing = client
            .fs_list(
                non_empty(&request.path),
                request.start_index,
                request.limit,
                non_empty(&request.search_term),
            )
            .await?;
        Ok(listing.into())
    }

    async fn get_item(&self, request: GetItemReq) -> Result<Item, EmbyError> {
        let client = self.client(&request.host, &request.token, &request.user_id);
        let item = client.get_item(&request.item_id).await?;
        Ok(item.into())
    }

    async fn get_items(&self, request: GetItemsReq) -> Result<GetItemsResp, EmbyError> {
        let client = self.client(&request.host, &request.token, &request.user_id);
        let items = client
            .get_items(non_empty(&request.parent_id), non_empty(&request.search_term))
            .await?;
        Ok(items.into())
    }

    async fn get_system_info(&self, request: SystemInfoReq) -> Result<SystemInfoResp, EmbyError> {
        let client = self.client(&request.host, &request.token, "");
        let info = client.get_system_info().await?;
        Ok(info.into())
    }

    async fn login(&self, request: LoginReq) -> Result<LoginResp, EmbyError> {
        let mut client = EmbyClient::new(self.http.clone(), &request.host);
        let auth = client.login(&request.username, &request.password).await?;

        // Older servers omit ServerId from the auth response
        let server_id = if auth.server_id.is_empty() {
            client.get_system_info().await?.id
        } else {
            auth.server_id
        };

        Ok(LoginResp {
            token: auth.access_token,
            user_id: auth.user.id,
            server_id,
        })
    }

    async fn me(&self, request: MeReq) -> Result<MeResp, EmbyError> {
        let client = self.client(&request.host, &request.token, &request.user_id);
        let user = client.me().await?;
        Ok(user.into())
    }
}

impl From<types::Item> for Item {
    fn from(item: types::Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            r#type: item.item_type,
            parent_id: item.parent_id.unwrap_or_default(),
            series_name: item.series_name.unwrap_or_default(),
            series_id: item.series_id.unwrap_or_default(),
            season_name: item.season_name.unwrap_or_default(),
            season_id: item.season_id.unwrap_or_default(),
            collection_type: item.collection_type.unwrap_or_default(),
            is_folder: item.is_folder,
            run_time_ticks: item.run_time_ticks.unwrap_or_default(),
            production_year: item.production_year.unwrap_or_default(),
        }
    }
}

impl From<types::ItemsResponse> for GetItemsResp {
    fn from(resp: types::ItemsResponse) -> Self {
        Self {
            items: resp.items.into_iter().map(Into::into).collect(),
            total: resp.total_record_count,
        }
    }
}

impl From<types::FsListResponse> for FsListResp {
    fn from(resp: types::FsListResponse) -> Self {
        Self {
            paths: resp
                .paths
                .into_iter()
                .map(|p| Path {
                    name: p.name,
                    path: p.path,
                })
                .collect(),
            items: resp.items.into_iter().map(Into::into).collect(),
            total: resp.total,
        }
    }
}

impl From<types::SystemInfo> for SystemInfoResp {
    fn from(info: types::SystemInfo) -> Self {
        Self {
            id: info.id,
            server_name: info.server_name,
            version: info.version,
            operating_system: info.operating_system,
            local_address: info.local_address,
        }
    }
}

impl From<types::UserInfo> for MeResp {
    fn from(user: types::UserInfo) -> Self {
        Self {
            id: user.id,
            name: user.name,
            server_id: user.server_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty("x"), Some("x"));
    }

    #[test]
    fn test_item_conversion_fills_defaults() {
        let item = types::Item {
            id: "1".to_string(),
            name: "Film".to_string(),
            item_type: "Movie".to_string(),
            is_folder: false,
            parent_id: None,
            series_name: Some("Show".to_string()),
            series_id: None,
            season_name: None,
            season_id: None,
            collection_type: None,
            run_time_ticks: Some(600),
            production_year: None,
        };
        let wire: Item = item.into();
        assert_eq!(wire.r#type, "Movie");
        assert_eq!(wire.series_name, "Show");
        assert!(wire.parent_id.is_empty());
        assert_eq!(wire.run_time_ticks, 600);
        assert_eq!(wire.production_year, 0);
    }

    #[test]
    fn test_service_builds() {
        assert!(EmbyService::new().is_ok());
    }
}
