use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::entity::EntityFetcher;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com/";

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

/// Unauthenticated client for Reddit's public JSON endpoints.
pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("reddit client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base).context("reddit: parse base url")?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn subreddit_about(&self, name: &str) -> Result<Subreddit> {
        let path = format!("r/{}/about.json", name.trim_start_matches("r/"));
        let thing: Thing<Subreddit> = self.get_json(&path, &[])?;
        Ok(thing.data)
    }

    pub fn user_about(&self, name: &str) -> Result<User> {
        let path = format!("user/{}/about.json", name.trim_start_matches("u/"));
        let thing: Thing<User> = self.get_json(&path, &[])?;
        Ok(thing.data)
    }

    pub fn post_by_id(&self, id: &str) -> Result<Post> {
        self.info(&fullname("t3", id))
            .context("reddit: fetch post")
    }

    pub fn comment_by_id(&self, id: &str) -> Result<Comment> {
        self.info(&fullname("t1", id))
            .context("reddit: fetch comment")
    }

    fn info<T>(&self, fullname: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let params = [("id".to_string(), fullname.to_string())];
        let listing: ListingEnvelope<T> = self.get_json("api/info.json", &params)?;
        listing
            .data
            .children
            .into_iter()
            .next()
            .map(|thing| thing.data)
            .ok_or_else(|| anyhow!("reddit: {} not found", fullname))
    }

    fn get_json<T>(&self, path: &str, params: &[(String, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let resp = self.request(path, params)?;
        resp.json()
            .with_context(|| format!("reddit: decode {}", path))
    }

    fn request(&self, path: &str, params: &[(String, String)]) -> Result<Response> {
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .send()?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            match status.as_u16() {
                403 => Err(anyhow!("reddit: forbidden")),
                404 => Err(anyhow!("reddit: not found")),
                429 => Err(anyhow!("reddit: rate limited: {}", body)),
                _ => Err(anyhow!("reddit: api error {}: {}", status, body)),
            }
        }
    }
}

impl EntityFetcher for Client {
    fn fetch_subreddit(&self, name: &str) -> Result<Subreddit> {
        self.subreddit_about(name)
    }

    fn fetch_post(&self, id: &str) -> Result<Post> {
        self.post_by_id(id)
    }

    fn fetch_comment(&self, id: &str) -> Result<Comment> {
        self.comment_by_id(id)
    }

    fn fetch_user(&self, name: &str) -> Result<User> {
        self.user_about(name)
    }
}

fn fullname(kind: &str, id: &str) -> String {
    let prefix = format!("{}_", kind);
    if id.starts_with(&prefix) {
        id.to_string()
    } else {
        format!("{}{}", prefix, id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub after: Option<String>,
    pub before: Option<String>,
    pub children: Vec<Thing<T>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ListingEnvelope<T> {
    kind: String,
    data: Listing<T>,
}

/// The post description consumed by the extractor. Every field is optional in
/// practice, so everything defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Post {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub post_hint: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub preview: Option<Preview>,
    #[serde(default)]
    pub gallery_data: Option<GalleryData>,
    #[serde(default)]
    pub media_metadata: Option<HashMap<String, MediaMetadata>>,
    #[serde(default)]
    pub media: Option<PostMedia>,
    #[serde(default)]
    pub secure_media: Option<PostMedia>,
    #[serde(default)]
    pub crosspost_parent_list: Vec<Post>,
}

impl Post {
    /// First usable preview image, if Reddit generated any.
    pub fn preview_source(&self) -> Option<&PreviewSource> {
        self.preview
            .as_ref()?
            .images
            .iter()
            .map(|image| &image.source)
            .find(|source| !source.url.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Preview {
    #[serde(default)]
    pub images: Vec<PreviewImage>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub reddit_video_preview: Option<RedditVideo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PreviewImage {
    #[serde(default)]
    pub source: PreviewSource,
    #[serde(default)]
    pub resolutions: Vec<PreviewSource>,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PreviewSource {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GalleryData {
    #[serde(default)]
    pub items: Vec<GalleryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GalleryItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub media_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MediaMetadata {
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "e")]
    pub kind: String,
    #[serde(default, rename = "m")]
    pub mime: String,
    #[serde(default, rename = "s")]
    pub full: MediaMetadataImage,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MediaMetadataImage {
    #[serde(default, rename = "u")]
    pub url: String,
    #[serde(default, rename = "x")]
    pub width: i64,
    #[serde(default, rename = "y")]
    pub height: i64,
    #[serde(default)]
    pub gif: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PostMedia {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub reddit_video: Option<RedditVideo>,
    #[serde(default)]
    pub oembed: Option<Oembed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RedditVideo {
    #[serde(default)]
    pub hls_url: String,
    #[serde(default)]
    pub fallback_url: String,
    #[serde(default)]
    pub dash_url: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub is_gif: bool,
    #[serde(default)]
    pub transcoding_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Oembed {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub thumbnail_width: Option<i64>,
    #[serde(default)]
    pub thumbnail_height: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Comment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub link_id: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub created_utc: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Subreddit {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "display_name_prefixed")]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub public_description: String,
    #[serde(default)]
    pub subscribers: i64,
    #[serde(default, rename = "over18")]
    pub over_18: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon_img: String,
    #[serde(default)]
    pub link_karma: i64,
    #[serde(default)]
    pub comment_karma: i64,
    #[serde(default)]
    pub created_utc: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_sparse_post() {
        let post: Post = serde_json::from_str(
            r#"{"url": "https://i.redd.it/abc.png", "domain": "i.redd.it", "is_self": false}"#,
        )
        .unwrap();
        assert_eq!(post.url, "https://i.redd.it/abc.png");
        assert!(post.preview.is_none());
        assert!(post.crosspost_parent_list.is_empty());
    }

    #[test]
    fn decodes_media_metadata_short_keys() {
        let meta: MediaMetadata = serde_json::from_str(
            r#"{"status": "valid", "e": "Image", "m": "image/jpg", "s": {"u": "x", "x": 640, "y": 480}, "id": "abc"}"#,
        )
        .unwrap();
        assert_eq!(meta.mime, "image/jpg");
        assert_eq!(meta.full.width, 640);
        assert_eq!(meta.full.height, 480);
    }

    #[test]
    fn preview_source_skips_empty_urls() {
        let post = Post {
            preview: Some(Preview {
                images: vec![
                    PreviewImage::default(),
                    PreviewImage {
                        source: PreviewSource {
                            url: "https://preview.redd.it/a.jpg".into(),
                            width: 10,
                            height: 20,
                        },
                        ..PreviewImage::default()
                    },
                ],
                ..Preview::default()
            }),
            ..Post::default()
        };
        assert_eq!(
            post.preview_source().map(|s| s.url.as_str()),
            Some("https://preview.redd.it/a.jpg")
        );
    }

    #[test]
    fn fullname_prefixes_once() {
        assert_eq!(fullname("t3", "abc"), "t3_abc");
        assert_eq!(fullname("t1", "t1_xyz"), "t1_xyz");
    }

    #[test]
    fn client_requires_user_agent() {
        assert!(Client::new(ClientConfig::default()).is_err());
    }
}
