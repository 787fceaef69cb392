//! Emby/Jellyfin HTTP Client

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde_json::json;

use super::error::{check_response, json_with_limit, EmbyError};
use super::types::{AuthResponse, FsListResponse, Item, ItemsResponse, PathInfo, SystemInfo, UserInfo};

/// URL-encode a string for safe use in query parameters
fn url_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

const X_EMBY_TOKEN: &str = "X-Emby-Token";

/// Emby/Jellyfin HTTP Client
///
/// Cheap to construct: the connection pool lives in the `reqwest::Client`
/// handed in by the owning service.
pub struct EmbyClient {
    host: String,
    token: Option<String>,
    user_id: Option<String>,
    client: Client,
}

impl EmbyClient {
    pub fn new(client: Client, host: impl Into<String>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            token: None,
            user_id: None,
            client,
        }
    }

    pub fn with_credentials(
        client: Client,
        host: impl Into<String>,
        token: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let mut this = Self::new(client, host);
        this.set_credentials(token, user_id);
        this
    }

    /// Set authentication token and user ID. Empty values count as unset.
    pub fn set_credentials(&mut self, token: impl Into<String>, user_id: impl Into<String>) {
        self.token = Some(token.into()).filter(|t| !t.is_empty());
        self.user_id = Some(user_id.into()).filter(|u| !u.is_empty());
    }

    /// Get API prefix (/emby or /jellyfin), detected from the host URL.
    fn get_api_prefix(&self) -> &'static str {
        if self.host.contains("jellyfin") {
            "/jellyfin"
        } else {
            "/emby"
        }
    }

    fn build_headers(&self) -> Result<HeaderMap, EmbyError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref token) = self.token {
            headers.insert(X_EMBY_TOKEN, HeaderValue::from_str(token)?);
        }

        Ok(headers)
    }

    fn require_user_id(&self) -> Result<&str, EmbyError> {
        self.user_id
            .as_deref()
            .ok_or_else(|| EmbyError::InvalidConfig("Missing user_id".to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, EmbyError> {
        let response = self
            .client
            .get(url)
            .headers(self.build_headers()?)
            .send()
            .await?;

        let response = check_response(response)?;
        json_with_limit(response).await
    }

    /// Login to Emby/Jellyfin server
    pub async fn login(&mut self, username: &str, password: &str) -> Result<AuthResponse, EmbyError> {
        let url = format!("{}{}/Users/authenticatebyname", self.host, self.get_api_prefix());

        let body = json!({
            "Username": username,
            "Pw": password,
        });

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmbyError::Auth(format!("Login failed: {}", response.status())));
        }

        let auth_resp: AuthResponse = json_with_limit(response).await?;
        self.set_credentials(auth_resp.access_token.clone(), auth_resp.user.id.clone());
        Ok(auth_resp)
    }

    /// Get a single item. Scoped to the user when a user id is known.
    pub async fn get_item(&self, item_id: &str) -> Result<Item, EmbyError> {
        let prefix = self.get_api_prefix();
        let url = match self.user_id.as_deref() {
            Some(uid) => format!(
                "{}{}/Users/{}/Items?Ids={}",
                self.host,
                prefix,
                url_encode(uid),
                url_encode(item_id)
            ),
            None => format!("{}{}/Items?Ids={}", self.host, prefix, url_encode(item_id)),
        };

        let items: ItemsResponse = self.get_json(&url).await?;
        items
            .items
            .into_iter()
            .next()
            .ok_or_else(|| EmbyError::NotFound(format!("item {item_id}")))
    }

    /// Get current user information
    pub async fn me(&self) -> Result<UserInfo, EmbyError> {
        let user_id = self.require_user_id()?;
        let url = format!("{}{}/Users/{}", self.host, self.get_api_prefix(), url_encode(user_id));
        self.get_json(&url).await
    }

    /// Get items list
    pub async fn get_items(
        &self,
        parent_id: Option<&str>,
        search_term: Option<&str>,
    ) -> Result<ItemsResponse, EmbyError> {
        let user_id = self.require_user_id()?;

        let mut url = format!(
            "{}{}/Users/{}/Items?SortBy=SortName&SortOrder=Ascending",
            self.host,
            self.get_api_prefix(),
            url_encode(user_id)
        );

        if let Some(pid) = parent_id {
            url.push_str(&format!("&ParentId={}", url_encode(pid)));
        }

        if let Some(term) = search_term {
            url.push_str(&format!("&SearchTerm={}&Recursive=true", url_encode(term)));
        } else {
            url.push_str("&Filters=IsNotFolder");
        }

        self.get_json(&url).await
    }

    /// Get system information
    pub async fn get_system_info(&self) -> Result<SystemInfo, EmbyError> {
        let url = format!("{}{}/System/Info", self.host, self.get_api_prefix());
        self.get_json(&url).await
    }

    /// Filesystem-style listing. No path and no search term lists the user's libraries.
    pub async fn fs_list(
        &self,
        path: Option<&str>,
        start_index: u64,
        limit: u64,
        search_term: Option<&str>,
    ) -> Result<FsListResponse, EmbyError> {
        let user_id = self.require_user_id()?;
        let prefix = self.get_api_prefix();
        let home = PathInfo {
            name: "Home".to_string(),
            path: String::new(),
        };

        if path.is_none() && search_term.is_none() {
            let url = format!("{}{}/Users/{}/Views", self.host, prefix, url_encode(user_id));
            let views: ItemsResponse = self.get_json(&url).await?;
            return Ok(FsListResponse {
                items: views.items,
                paths: vec![home],
                total: views.total_record_count,
            });
        }

        let mut url = format!(
            "{}{}/Users/{}/Items?StartIndex={}&Limit={}",
            self.host,
            prefix,
            url_encode(user_id),
            start_index,
            limit
        );

        if let Some(p) = path {
            url.push_str(&format!("&ParentId={}", url_encode(p)));
        }

        if let Some(term) = search_term {
            url.push_str(&format!("&SearchTerm={}&Recursive=true", url_encode(term)));
        }

        let items: ItemsResponse = self.get_json(&url).await?;

        let mut paths = vec![home];
        if let Some(p) = path {
            match self.get_item(p).await {
                Ok(item) => paths.push(PathInfo {
                    name: item.name,
                    path: item.id,
                }),
                Err(e) => tracing::debug!(path = %p, error = %e, "Failed to resolve listing breadcrumb"),
            }
        }

        Ok(FsListResponse {
            items: items.items,
            paths,
            total: items.total_record_count,
        })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.token.is_some() && self.user_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = EmbyClient::new(Client::new(), "https://emby.example.com/");
        assert_eq!(client.host(), "https://emby.example.com");
        assert!(!client.has_credentials());

        let with_creds =
            EmbyClient::with_credentials(Client::new(), "https://emby.example.com", "token", "user123");
        assert!(with_creds.has_credentials());

        let empty_creds = EmbyClient::with_credentials(Client::new(), "https://emby.example.com", "", "");
        assert!(!empty_creds.has_credentials());
    }

    #[test]
    fn test_api_prefix_detection() {
        let emby = EmbyClient::new(Client::new(), "https://emby.example.com");
        assert_eq!(emby.get_api_prefix(), "/emby");

        let jellyfin = EmbyClient::new(Client::new(), "https://jellyfin.example.com");
        assert_eq!(jellyfin.get_api_prefix(), "/jellyfin");
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("a b&c"), "a+b%26c");
    }

    #[tokio::test]
    async fn test_me_requires_user_id() {
        let client = EmbyClient::new(Client::new(), "http://127.0.0.1:1");
        let err = client.me().await.unwrap_err();
        assert!(matches!(err, EmbyError::InvalidConfig(_)));
    }
}
