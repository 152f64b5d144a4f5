//! Catalog collaborator: searchable streaming-audio items over HTTP.
//!
//! Search results are resolved into tagged items exactly once, here at the
//! boundary; the rest of the player never inspects a `kind` field.

use std::fmt;
use std::time::Duration;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::queue::Track;

/// One playable catalog track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTrack {
    pub id: u64,
    pub title: String,
    pub username: String,
    pub stream_url: String,
    pub permalink_url: String,
}

impl CatalogTrack {
    /// Converts into a queue track; position and slot id come later, from
    /// synchronization.
    pub fn into_track(self) -> Track {
        Track {
            id: self.id,
            title: self.title,
            username: self.username,
            stream_url: self.stream_url,
            permalink_url: self.permalink_url,
            idx: None,
            slot_id: None,
        }
    }
}

/// A named collection (playlist) with its tracks already embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCollection {
    pub id: u64,
    pub title: String,
    pub username: String,
    pub tracks: Vec<CatalogTrack>,
}

/// A catalog user; their tracks are fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogUser {
    pub id: u64,
    pub username: String,
}

/// A search result, tagged once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogItem {
    Track(CatalogTrack),
    Collection(CatalogCollection),
    User(CatalogUser),
}

impl fmt::Display for CatalogItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Track(track) => write!(f, "{} - {}", track.username, track.title),
            Self::Collection(collection) => write!(
                f,
                "{} - {} ({} tracks)",
                collection.username,
                collection.title,
                collection.tracks.len()
            ),
            Self::User(user) => write!(f, "{}", user.username),
        }
    }
}

/// What a search is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCategory {
    Track,
    Collection,
    User,
}

fn category_token(token: &str) -> Option<SearchCategory> {
    match token {
        "t" | "ts" | "track" | "tracks" => Some(SearchCategory::Track),
        "p" | "ps" | "playlist" | "playlists" => Some(SearchCategory::Collection),
        "u" | "user" | "users" => Some(SearchCategory::User),
        _ => None,
    }
}

/// Parsed search arguments: optional owner, category, optional free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub username: Option<String>,
    pub category: SearchCategory,
    pub query: Option<String>,
}

/// Parses positional search arguments.
///
/// Forms: `<category> <query>`, `<username>`, `<username> <category> [query]`.
pub fn parse_search_args(args: &[String]) -> Result<SearchQuery> {
    let non_empty: Vec<&String> = args.iter().filter(|arg| !arg.trim().is_empty()).collect();
    match non_empty.as_slice() {
        [] => Err(Error::Parse("not enough arguments".to_string())),
        [first] => match category_token(first) {
            Some(_) => Err(Error::Parse(format!(
                "category '{first}' needs a query or a username before it"
            ))),
            None => Ok(SearchQuery {
                username: Some((*first).clone()),
                category: SearchCategory::User,
                query: None,
            }),
        },
        [first, second, rest @ ..] => {
            if let Some(category) = category_token(first) {
                if !rest.is_empty() {
                    return Err(Error::Parse(format!(
                        "too many arguments after '{first} {second}'"
                    )));
                }
                return Ok(SearchQuery {
                    username: None,
                    category,
                    query: Some((*second).clone()),
                });
            }
            let Some(category) = category_token(second) else {
                return Err(Error::Parse(format!("unrecognized category '{second}'")));
            };
            let query = match rest {
                [] => None,
                [third] => Some((*third).clone()),
                _ => {
                    return Err(Error::Parse("too many arguments".to_string()));
                }
            };
            Ok(SearchQuery {
                username: Some((*first).clone()),
                category,
                query,
            })
        }
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = match self.category {
            SearchCategory::Track => "tracks",
            SearchCategory::Collection => "playlists",
            SearchCategory::User => "users",
        };
        match (&self.username, &self.query) {
            (Some(username), Some(query)) => {
                write!(f, "{username}'s {noun} like '{query}'")
            }
            (Some(username), None) if self.category == SearchCategory::User => {
                write!(f, "users like '{username}'")
            }
            (Some(username), None) => write!(f, "{username}'s {noun}"),
            (None, Some(query)) => write!(f, "{noun} like '{query}'"),
            (None, None) => write!(f, "{noun}"),
        }
    }
}

/// Ranks `items` by fuzzy similarity between `query` and each item's key,
/// best first; items that do not match at all are dropped.
pub fn fuzzy_rank<T>(items: Vec<T>, query: &str, key: impl Fn(&T) -> &str) -> Vec<T> {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, T)> = items
        .into_iter()
        .filter_map(|item| {
            matcher
                .fuzzy_match(key(&item), query)
                .map(|score| (score, item))
        })
        .collect();
    scored.sort_by_key(|(score, _)| std::cmp::Reverse(*score));
    scored.into_iter().map(|(_, item)| item).collect()
}

/// Searchable catalog of playable items.
pub trait Catalog {
    fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogItem>>;
    /// Resolves one track by its stable catalog id.
    fn track_by_id(&self, id: u64) -> Result<CatalogTrack>;
    /// All tracks owned by a user.
    fn user_tracks(&self, user_id: u64) -> Result<Vec<CatalogTrack>>;
}

/// `Catalog` backed by an HTTP+JSON API via `ureq`.
pub struct HttpCatalog {
    http_client: ureq::Agent,
    base_url: String,
    client_id: String,
}

impl HttpCatalog {
    pub fn new(base_url: &str, client_id: &str) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        }
    }

    fn request_json(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let mut query_parts = vec![
            format!("client_id={}", urlencoding::encode(&self.client_id)),
            "limit=100".to_string(),
        ];
        query_parts.extend(
            params
                .iter()
                .map(|(key, value)| format!("{key}={}", urlencoding::encode(value))),
        );
        let url = format!("{}{path}?{}", self.base_url, query_parts.join("&"));
        let response = self
            .http_client
            .get(&url)
            .call()
            .map_err(|err| Error::Catalog(format!("{path}: {err}")))?;
        response
            .into_json()
            .map_err(|err| Error::Catalog(format!("{path}: bad response body ({err})")))
    }

    fn stream_url(&self, raw: &str) -> String {
        format!("{raw}?client_id={}", self.client_id)
    }

    fn parse_track(&self, value: &Value) -> Option<CatalogTrack> {
        let id = value.get("id")?.as_u64()?;
        let title = value.get("title")?.as_str()?.to_string();
        let username = value
            .get("user")
            .and_then(|user| user.get("username"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let stream_url = self.stream_url(value.get("stream_url")?.as_str()?);
        let permalink_url = value
            .get("permalink_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(CatalogTrack {
            id,
            title,
            username,
            stream_url,
            permalink_url,
        })
    }

    fn parse_collection(&self, value: &Value) -> Option<CatalogCollection> {
        let id = value.get("id")?.as_u64()?;
        let title = value.get("title")?.as_str()?.to_string();
        let username = value
            .get("user")
            .and_then(|user| user.get("username"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let tracks = value
            .get("tracks")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| self.parse_track(entry))
                    .collect()
            })
            .unwrap_or_default();
        Some(CatalogCollection {
            id,
            title,
            username,
            tracks,
        })
    }

    fn parse_user(value: &Value) -> Option<CatalogUser> {
        let id = value.get("id")?.as_u64()?;
        let username = value.get("username")?.as_str()?.to_string();
        Some(CatalogUser { id, username })
    }

    fn array(value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            item @ Value::Object(_) => vec![item],
            _ => Vec::new(),
        }
    }

    fn find_user(&self, name: &str) -> Result<CatalogUser> {
        let users = if name.parse::<u64>().is_ok() {
            Self::array(self.request_json(&format!("/users/{name}"), &[])?)
        } else {
            Self::array(self.request_json("/users", &[("q", name)])?)
        };
        users
            .iter()
            .filter_map(Self::parse_user)
            .next()
            .ok_or_else(|| Error::not_found(format!("user '{name}'")))
    }

    fn search_tracks(&self, query: &SearchQuery) -> Result<Vec<CatalogTrack>> {
        match &query.username {
            Some(name) => {
                let user = self.find_user(name)?;
                let tracks = self.user_tracks(user.id)?;
                Ok(match &query.query {
                    Some(text) => fuzzy_rank(tracks, text, |track| track.title.as_str()),
                    None => tracks,
                })
            }
            None => {
                let text = query.query.as_deref().unwrap_or_default();
                if let Ok(id) = text.parse::<u64>() {
                    return Ok(vec![self.track_by_id(id)?]);
                }
                let values = Self::array(self.request_json("/tracks", &[("q", text)])?);
                Ok(values
                    .iter()
                    .filter_map(|value| self.parse_track(value))
                    .collect())
            }
        }
    }

    fn search_collections(&self, query: &SearchQuery) -> Result<Vec<CatalogCollection>> {
        match &query.username {
            Some(name) => {
                let user = self.find_user(name)?;
                let values =
                    Self::array(self.request_json(&format!("/users/{}/playlists", user.id), &[])?);
                let collections: Vec<CatalogCollection> = values
                    .iter()
                    .filter_map(|value| self.parse_collection(value))
                    .collect();
                Ok(match &query.query {
                    Some(text) => fuzzy_rank(collections, text, |c| c.title.as_str()),
                    None => collections,
                })
            }
            None => {
                let text = query.query.as_deref().unwrap_or_default();
                let values = Self::array(self.request_json("/playlists", &[("q", text)])?);
                Ok(values
                    .iter()
                    .filter_map(|value| self.parse_collection(value))
                    .collect())
            }
        }
    }
}

impl Catalog for HttpCatalog {
    fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogItem>> {
        match query.category {
            SearchCategory::Track => Ok(self
                .search_tracks(query)?
                .into_iter()
                .map(CatalogItem::Track)
                .collect()),
            SearchCategory::Collection => Ok(self
                .search_collections(query)?
                .into_iter()
                .map(CatalogItem::Collection)
                .collect()),
            SearchCategory::User => {
                let name = query
                    .username
                    .as_deref()
                    .or(query.query.as_deref())
                    .ok_or_else(|| Error::Parse("user search needs a name".to_string()))?;
                let values = if name.parse::<u64>().is_ok() {
                    Self::array(self.request_json(&format!("/users/{name}"), &[])?)
                } else {
                    Self::array(self.request_json("/users", &[("q", name)])?)
                };
                Ok(values
                    .iter()
                    .filter_map(Self::parse_user)
                    .map(CatalogItem::User)
                    .collect())
            }
        }
    }

    fn track_by_id(&self, id: u64) -> Result<CatalogTrack> {
        let value = self.request_json(&format!("/tracks/{id}"), &[])?;
        self.parse_track(&value)
            .ok_or_else(|| Error::not_found(format!("track {id}")))
    }

    fn user_tracks(&self, user_id: u64) -> Result<Vec<CatalogTrack>> {
        let values = Self::array(self.request_json(&format!("/users/{user_id}/tracks"), &[])?);
        Ok(values
            .iter()
            .filter_map(|value| self.parse_track(value))
            .collect())
    }
}
