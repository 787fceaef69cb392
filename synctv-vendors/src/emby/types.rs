//! Emby/Jellyfin API Data Structures

use serde::Deserialize;

/// Authentication response
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "AccessToken")]
    pub access_token: String,
    #[serde(rename = "ServerId", default)]
    pub server_id: String,
    #[serde(rename = "User")]
    pub user: User,
}

/// User information (for authentication response)
#[derive(Debug, Deserialize)]
pub struct User {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
}

/// User information (detailed)
#[derive(Debug, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ServerId", default)]
    pub server_id: String,
}

/// Media item information
#[derive(Debug, Deserialize, Clone)]
pub struct Item {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub item_type: String,
    #[serde(rename = "IsFolder", default)]
    pub is_folder: bool,
    #[serde(rename = "ParentId", default)]
    pub parent_id: Option<String>,
    #[serde(rename = "SeriesName", default)]
    pub series_name: Option<String>,
    #[serde(rename = "SeriesId", default)]
    pub series_id: Option<String>,
    #[serde(rename = "SeasonName", default)]
    pub season_name: Option<String>,
    #[serde(rename = "SeasonId", default)]
    pub season_id: Option<String>,
    #[serde(rename = "CollectionType", default)]
    pub collection_type: Option<String>,
    #[serde(rename = "RunTimeTicks", default)]
    pub run_time_ticks: Option<u64>,
    #[serde(rename = "ProductionYear", default)]
    pub production_year: Option<u32>,
}

/// Items response
#[derive(Debug, Deserialize)]
pub struct ItemsResponse {
    #[serde(rename = "Items", default)]
    pub items: Vec<Item>,
    #[serde(rename = "TotalRecordCount", default)]
    pub total_record_count: u64,
}

/// System information
#[derive(Debug, Deserialize)]
pub struct SystemInfo {
    #[serde(rename = "Id", default)]
    pub id: String,
    #[serde(rename = "ServerName", default)]
    pub server_name: String,
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "OperatingSystem", default)]
    pub operating_system: String,
    #[serde(rename = "LocalAddress", default)]
    pub local_address: String,
}

/// Breadcrumb entry for a directory-style listing
#[derive(Debug, Clone)]
pub struct PathInfo {
    pub name: String,
    pub path: String,
}

/// Directory-style listing
#[derive(Debug)]
pub struct FsListResponse {
    pub items: Vec<Item>,
    pub paths: Vec<PathInfo>,
    pub total: u64,
}
