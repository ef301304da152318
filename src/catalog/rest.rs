//! Catalog client for the hosted backend's REST interface.
//!
//! Tables are exposed PostgREST-style under `{url}/rest/v1/{table}`.
//! Filters use the `column=op.value` syntax, e.g. `album_id=eq.a1`.
//! Every request carries the anonymous key both as `apikey` and as a
//! bearer token.

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;

use super::{Catalog, CatalogError, TrackScope, playlist_order, sort_album_tracks};
use crate::model::{Album, Playlist, PlaylistEntry, TrackDescriptor};

/// User agent sent with every request
const USER_AGENT: &str = concat!("soundshelf/", env!("CARGO_PKG_VERSION"));

/// Hosted backend catalog client
pub struct RestCatalog {
    http_client: reqwest::Client,
    base_url: Url,
    anon_key: String,
}

impl RestCatalog {
    /// Create a client for the project at `url`.
    pub fn new(url: &str, anon_key: impl Into<String>) -> Result<Self, CatalogError> {
        let trimmed = url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(CatalogError::NotConfigured("backend url is empty".to_string()));
        }
        let base_url = Url::parse(&format!("{}/rest/v1/", trimmed))
            .map_err(|e| CatalogError::NotConfigured(format!("invalid backend url '{}': {}", url, e)))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            anon_key: anon_key.into(),
        })
    }

    /// Build the URL for a table query. Always selects every column.
    pub fn table_url(&self, table: &str, filters: &[(&str, String)]) -> Result<Url, CatalogError> {
        let mut url = self
            .base_url
            .join(table)
            .map_err(|e| CatalogError::NotConfigured(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            for (key, value) in filters {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Send a query and parse the returned rows.
    async fn fetch<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, CatalogError> {
        let url = self.table_url(table, filters)?;
        tracing::debug!(%url, "Catalog query");

        let response = self
            .http_client
            .get(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .filter(|body| !body.trim().is_empty())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());
            return Err(CatalogError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

/// Filters for a track listing.
fn track_filters(scope: &TrackScope) -> Vec<(&'static str, String)> {
    match scope {
        TrackScope::All => vec![("order", "title.asc".to_string())],
        TrackScope::Album(id) => vec![
            ("album_id", format!("eq.{}", id)),
            ("order", "track_number.asc.nullslast".to_string()),
        ],
        // Playlist scope is resolved through `playlist_tracks` first
        TrackScope::Playlist(_) => Vec::new(),
    }
}

/// `in.(...)` filter value, quoting each id.
fn in_list(ids: &[&str]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[async_trait]
impl Catalog for RestCatalog {
    async fn tracks(&self, scope: &TrackScope) -> Result<Vec<TrackDescriptor>, CatalogError> {
        match scope {
            TrackScope::Playlist(playlist_id) => {
                let entries: Vec<PlaylistEntry> = self
                    .fetch(
                        "playlist_tracks",
                        &[
                            ("playlist_id", format!("eq.{}", playlist_id)),
                            ("order", "position.asc".to_string()),
                        ],
                    )
                    .await?;
                if entries.is_empty() {
                    return Ok(Vec::new());
                }
                let ids: Vec<&str> = entries.iter().map(|e| e.track_id.as_str()).collect();
                let tracks: Vec<TrackDescriptor> =
                    self.fetch("tracks", &[("id", in_list(&ids))]).await?;
                Ok(playlist_order(entries, &tracks))
            }
            scope => {
                let mut tracks: Vec<TrackDescriptor> =
                    self.fetch("tracks", &track_filters(scope)).await?;
                if matches!(scope, TrackScope::Album(_)) {
                    sort_album_tracks(&mut tracks);
                }
                Ok(tracks)
            }
        }
    }

    async fn track(&self, id: &str) -> Result<TrackDescriptor, CatalogError> {
        let rows: Vec<TrackDescriptor> = self
            .fetch("tracks", &[("id", format!("eq.{}", id)), ("limit", "1".to_string())])
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| CatalogError::TrackNotFound(id.to_string()))
    }

    async fn albums(&self) -> Result<Vec<Album>, CatalogError> {
        self.fetch("albums", &[("order", "title.asc".to_string())])
            .await
    }

    async fn playlists(&self) -> Result<Vec<Playlist>, CatalogError> {
        self.fetch("playlists", &[("order", "name.asc".to_string())])
            .await
    }
}
