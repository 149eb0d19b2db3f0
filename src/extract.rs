//! Decides which single media representation a post is rendered as.
//!
//! Rules live in [`RULES`] and run top to bottom. The first rule that breaks
//! decides the result, so the order of that table is part of the behavior.

use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::LayoutConfig;
use crate::entity::{self, EntityFetcher, Live};
use crate::layout::{
    decompose_url, gallery_widths, has_suffix, Image, Insets, LayoutContext, Size,
};
use crate::reddit::{Comment, Oembed, Post, PostMedia, RedditVideo, Subreddit, User};

pub const STREAMABLE_MARKER: &str = "streamable.com";
pub const REDGIFS_MARKER: &str = "redgifs.com";
pub const YOUTUBE_MEDIA_TYPE: &str = "youtube.com";

const REDGIFS_HOSTS: [&str; 2] = ["www.redgifs.com", "v3.redgifs.com"];

const PLATFORM_HOSTS: [&str; 6] = [
    "reddit.com",
    "www.reddit.com",
    "old.reddit.com",
    "new.reddit.com",
    "np.reddit.com",
    "m.reddit.com",
];

pub const IMAGE_SUFFIXES: [&str; 6] = [".png", ".jpg", ".jpeg", ".webp", ".gif", ".avif"];
pub const VIDEO_SUFFIXES: [&str; 6] = [".mp4", ".m4v", ".mov", ".webm", ".gifv", ".m3u8"];

const GALLERY_IMAGE_HOST: &str = "https://i.redd.it";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedMedia {
    Link {
        url: String,
        compact: bool,
    },
    Video(VideoMedia),
    Images {
        images: Vec<Image>,
    },
    #[serde(rename = "youtube")]
    YouTube(YouTubeMedia),
    Streamable {
        code: String,
    },
    Redgifs {
        id: String,
    },
    /// The parent of a crosspost; its own media is extracted separately.
    Repost {
        post: Box<Post>,
    },
    Post {
        entity: Live<Post>,
    },
    Comment {
        post_id: String,
        entity: Live<Comment>,
    },
    Subreddit {
        entity: Live<Subreddit>,
    },
    User {
        entity: Live<User>,
    },
}

/// Dimensions may be zero when the source does not report them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMedia {
    pub url: String,
    pub size: Size,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YouTubeMedia {
    pub video_id: String,
    pub size: Size,
    pub thumbnail: Image,
    pub author_name: String,
    pub author_url: String,
}

type Step = ControlFlow<Option<ExtractedMedia>>;

struct Rule {
    name: &'static str,
    apply: fn(&Extractor, &Input<'_>) -> Step,
}

struct Input<'a> {
    post: &'a Post,
    layout: LayoutContext,
}

/// Evaluation order. Moving an entry changes which media a post gets.
static RULES: [Rule; 13] = [
    Rule { name: "self_post", apply: self_post },
    Rule { name: "gallery", apply: gallery },
    Rule { name: "streamable", apply: streamable },
    Rule { name: "redgifs", apply: redgifs },
    Rule { name: "video_preview", apply: video_preview },
    Rule { name: "native_video", apply: native_video },
    Rule { name: "youtube", apply: youtube },
    Rule { name: "repost", apply: repost },
    Rule { name: "direct_image", apply: direct_image },
    Rule { name: "preview_image", apply: preview_image },
    Rule { name: "direct_video", apply: direct_video },
    Rule { name: "platform_link", apply: platform_link },
    Rule { name: "link", apply: link },
];

pub struct Extractor {
    layout: LayoutConfig,
    fetcher: Option<Arc<dyn EntityFetcher>>,
}

impl Extractor {
    /// An extractor without a fetcher hands out live entities that are never
    /// populated.
    pub fn new(layout: LayoutConfig) -> Self {
        Self {
            layout,
            fetcher: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn EntityFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Returns `None` for self posts and for posts no rule recognizes.
    /// `insets` defaults to the configured paddings.
    pub fn extract(
        &self,
        post: &Post,
        compact: bool,
        available_width: f64,
        insets: Option<Insets>,
    ) -> Option<ExtractedMedia> {
        let insets = insets.unwrap_or_else(|| Insets::from_config(&self.layout));
        let input = Input {
            post,
            layout: LayoutContext::new(&self.layout, compact, available_width, insets),
        };
        for rule in RULES.iter() {
            if let ControlFlow::Break(result) = (rule.apply)(self, &input) {
                debug!(rule = rule.name, post = %post.id, matched = result.is_some(), "media rule decided");
                return result;
            }
        }
        debug!(post = %post.id, "no media rule matched");
        None
    }

    fn live<T, F>(&self, id: &str, kind: &'static str, fetch: F) -> Live<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn EntityFetcher, &str) -> Result<T> + Send + 'static,
    {
        let live = Live::new(id);
        if let Some(fetcher) = self.fetcher.clone() {
            let id = id.to_string();
            entity::spawn_fetch(&live, kind, move || fetch(fetcher.as_ref(), &id));
        }
        live
    }
}

fn found(media: ExtractedMedia) -> Step {
    ControlFlow::Break(Some(media))
}

fn self_post(_: &Extractor, input: &Input<'_>) -> Step {
    if input.post.is_self {
        ControlFlow::Break(None)
    } else {
        ControlFlow::Continue(())
    }
}

fn gallery(extractor: &Extractor, input: &Input<'_>) -> Step {
    let post = input.post;
    let Some(gallery) = post.gallery_data.as_ref() else {
        return ControlFlow::Continue(());
    };
    if gallery.items.is_empty() {
        return ControlFlow::Continue(());
    }

    let widths = gallery_widths(
        gallery.items.len(),
        input.layout.content_width,
        extractor.layout.gallery_spacing,
    );
    let images: Vec<Image> = gallery
        .items
        .iter()
        .zip(widths)
        .filter_map(|(item, width)| {
            let meta = post.media_metadata.as_ref()?.get(&item.media_id)?;
            let url = gallery_image_url(&item.media_id, &meta.mime)?;
            let size = Size::from_api(meta.full.width, meta.full.height);
            Some(Image::new(url, size, &input.layout, width))
        })
        .collect();

    if images.is_empty() {
        return ControlFlow::Continue(());
    }
    found(ExtractedMedia::Images { images })
}

fn gallery_image_url(media_id: &str, mime: &str) -> Option<String> {
    let media_id = media_id.trim();
    let (_, ext) = mime.trim().rsplit_once('/')?;
    if media_id.is_empty() || ext.is_empty() {
        return None;
    }
    let url = Url::parse(&format!("{}/{}.{}", GALLERY_IMAGE_HOST, media_id, ext)).ok()?;
    Some(url.to_string())
}

fn streamable(_: &Extractor, input: &Input<'_>) -> Step {
    if !input.post.domain.contains(STREAMABLE_MARKER) {
        return ControlFlow::Continue(());
    }
    match streamable_code(&input.post.url) {
        Some(code) => found(ExtractedMedia::Streamable { code }),
        None => ControlFlow::Continue(()),
    }
}

/// Last path segment of the URL; `None` when the path is empty.
fn streamable_code(raw: &str) -> Option<String> {
    let (_, segments) = decompose_url(raw)?;
    segments.last().cloned()
}

fn redgifs(_: &Extractor, input: &Input<'_>) -> Step {
    if !input.post.domain.contains(REDGIFS_MARKER) {
        return ControlFlow::Continue(());
    }
    match redgifs_id(&input.post.url) {
        Some(id) => found(ExtractedMedia::Redgifs { id }),
        None => ControlFlow::Continue(()),
    }
}

fn redgifs_id(raw: &str) -> Option<String> {
    let (url, segments) = decompose_url(raw)?;
    let host = url.host_str()?;
    if !REDGIFS_HOSTS.contains(&host) {
        return None;
    }
    match segments.as_slice() {
        [first, id, ..] if first == "watch" || first == "ifr" => Some(id.clone()),
        _ => None,
    }
}

fn video_preview(_: &Extractor, input: &Input<'_>) -> Step {
    let video = input
        .post
        .preview
        .as_ref()
        .and_then(|preview| preview.reddit_video_preview.as_ref())
        .and_then(video_media);
    match video {
        Some(video) => found(ExtractedMedia::Video(video)),
        None => ControlFlow::Continue(()),
    }
}

fn native_video(_: &Extractor, input: &Input<'_>) -> Step {
    let post = input.post;
    let video = [post.secure_media.as_ref(), post.media.as_ref()]
        .into_iter()
        .flatten()
        .filter_map(|media| media.reddit_video.as_ref())
        .find_map(video_media);
    match video {
        Some(video) => found(ExtractedMedia::Video(video)),
        None => ControlFlow::Continue(()),
    }
}

/// Streams need a URL and both dimensions to count.
fn video_media(video: &RedditVideo) -> Option<VideoMedia> {
    if video.transcoding_status.eq_ignore_ascii_case("error") {
        return None;
    }
    let url = [&video.hls_url, &video.fallback_url, &video.dash_url]
        .into_iter()
        .map(|candidate| sanitize_url(candidate))
        .find(|candidate| !candidate.is_empty())?;
    let size = Size::from_api(video.width, video.height);
    if !size.is_known() {
        return None;
    }
    Some(VideoMedia { url, size })
}

fn youtube(_: &Extractor, input: &Input<'_>) -> Step {
    let post = input.post;
    let media = [post.secure_media.as_ref(), post.media.as_ref()]
        .into_iter()
        .flatten()
        .find_map(|media| youtube_media(media, &input.layout));
    match media {
        Some(media) => found(ExtractedMedia::YouTube(media)),
        None => ControlFlow::Continue(()),
    }
}

fn youtube_media(media: &PostMedia, layout: &LayoutContext) -> Option<YouTubeMedia> {
    if media.kind.as_deref() != Some(YOUTUBE_MEDIA_TYPE) {
        return None;
    }
    let Oembed {
        html: Some(html),
        width: Some(width),
        height: Some(height),
        author_name: Some(author_name),
        author_url: Some(author_url),
        thumbnail_url: Some(thumbnail_url),
        thumbnail_width,
        thumbnail_height,
        ..
    } = media.oembed.as_ref()?
    else {
        return None;
    };

    let video_id = youtube_id(html)?;
    let size = Size::from_api(*width, *height);
    let thumbnail_size = match (thumbnail_width, thumbnail_height) {
        (Some(w), Some(h)) => Size::from_api(*w, *h),
        _ => size,
    };
    let thumbnail = Image::new(
        sanitize_url(thumbnail_url),
        thumbnail_size,
        layout,
        layout.content_width,
    );
    Some(YouTubeMedia {
        video_id,
        size,
        thumbnail,
        author_name: author_name.clone(),
        author_url: author_url.clone(),
    })
}

/// Pulls the id out of `youtube.com/embed/<id>?...` in an oEmbed snippet.
///
/// The id runs to the next `?` or the end of the snippet. Without a `?` the
/// rest of the HTML is kept as part of the id.
pub fn youtube_id(html: &str) -> Option<String> {
    static EMBED_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"youtube\.com/embed/([^?]*)").expect("valid youtube embed regex"));
    let id = EMBED_RE.captures(html)?.get(1)?.as_str();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn repost(_: &Extractor, input: &Input<'_>) -> Step {
    match input.post.crosspost_parent_list.first() {
        Some(parent) => found(ExtractedMedia::Repost {
            post: Box::new(parent.clone()),
        }),
        None => ControlFlow::Continue(()),
    }
}

fn direct_image(_: &Extractor, input: &Input<'_>) -> Step {
    let post = input.post;
    if !IMAGE_SUFFIXES.iter().any(|suffix| has_suffix(&post.url, suffix)) {
        return ControlFlow::Continue(());
    }
    let size = post
        .preview_source()
        .map(|source| Size::from_api(source.width, source.height))
        .unwrap_or_default();
    let image = Image::new(
        sanitize_url(&post.url),
        size,
        &input.layout,
        input.layout.content_width,
    );
    found(ExtractedMedia::Images {
        images: vec![image],
    })
}

fn preview_image(_: &Extractor, input: &Input<'_>) -> Step {
    let Some(source) = input.post.preview_source() else {
        return ControlFlow::Continue(());
    };
    let Some(url) = direct_preview_url(&source.url) else {
        return ControlFlow::Continue(());
    };
    if url.contains("external-preview") {
        return ControlFlow::Continue(());
    }
    let size = Size::from_api(source.width, source.height);
    let image = Image::new(url, size, &input.layout, input.layout.content_width);
    found(ExtractedMedia::Images {
        images: vec![image],
    })
}

/// Rewrites a `preview.` host to its `i.` counterpart and normalizes escaping.
fn direct_preview_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(&sanitize_url(raw)).ok()?;
    let host = url.host_str()?.to_string();
    if let Some(rest) = host.strip_prefix("preview.") {
        url.set_host(Some(&format!("i.{}", rest))).ok()?;
    }
    Some(url.to_string())
}

fn direct_video(_: &Extractor, input: &Input<'_>) -> Step {
    let post = input.post;
    if !VIDEO_SUFFIXES.iter().any(|suffix| has_suffix(&post.url, suffix)) {
        return ControlFlow::Continue(());
    }
    found(ExtractedMedia::Video(VideoMedia {
        url: sanitize_url(&post.url),
        size: Size::default(),
    }))
}

fn platform_link(extractor: &Extractor, input: &Input<'_>) -> Step {
    let Some((url, segments)) = decompose_url(&input.post.url) else {
        return ControlFlow::Continue(());
    };
    let on_platform = url
        .host_str()
        .map(|host| PLATFORM_HOSTS.contains(&host))
        .unwrap_or(false);
    if !on_platform || segments.len() < 2 {
        return ControlFlow::Continue(());
    }

    let media = match segments[0].as_str() {
        "r" => match (segments.get(2).map(String::as_str), segments.get(3)) {
            (Some("comments"), Some(post_id)) => match segments.get(5) {
                Some(comment_id) => ExtractedMedia::Comment {
                    post_id: post_id.clone(),
                    entity: extractor.live(comment_id, "comment", |f, id| f.fetch_comment(id)),
                },
                None => ExtractedMedia::Post {
                    entity: extractor.live(post_id, "post", |f, id| f.fetch_post(id)),
                },
            },
            _ => ExtractedMedia::Subreddit {
                entity: extractor.live(&segments[1], "subreddit", |f, name| {
                    f.fetch_subreddit(name)
                }),
            },
        },
        "user" | "u" => ExtractedMedia::User {
            entity: extractor.live(&segments[1], "user", |f, name| f.fetch_user(name)),
        },
        _ => return ControlFlow::Continue(()),
    };
    found(media)
}

fn link(_: &Extractor, input: &Input<'_>) -> Step {
    let post = input.post;
    if post.post_hint != "link" && post.domain.trim().is_empty() {
        return ControlFlow::Continue(());
    }
    match decompose_url(&post.url) {
        Some((url, _)) => found(ExtractedMedia::Link {
            url: url.to_string(),
            compact: input.layout.compact,
        }),
        None => ControlFlow::Continue(()),
    }
}

fn sanitize_url(raw: &str) -> String {
    raw.trim().replace("&amp;", "&")
}
