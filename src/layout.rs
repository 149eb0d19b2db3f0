use serde::Serialize;
use url::Url;

use crate::config::LayoutConfig;

const PLATFORM_ORIGIN: &str = "https://www.reddit.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    /// Builds a size from loosely typed API dimensions; negatives become zero.
    pub fn from_api(width: i64, height: i64) -> Self {
        Self::new(clamp_dimension(width), clamp_dimension(height))
    }

    pub fn is_known(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

fn clamp_dimension(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

/// Horizontal paddings, per side, around the post content.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Insets {
    pub inner: f64,
    pub outer: f64,
}

impl Insets {
    pub fn from_config(cfg: &LayoutConfig) -> Self {
        Self {
            inner: cfg.inner_padding,
            outer: cfg.outer_padding,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    AspectFill,
    AspectFit,
}

/// What the image loader should do with a URL before display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub url: String,
    /// Target box in pixels. `None` passes the image through unresized.
    pub target: Option<Size>,
    pub mode: ContentMode,
    pub crop: bool,
    pub upscale: bool,
    /// Also decode a square low-res thumbnail the size of `target`.
    pub thumbnail: bool,
}

impl ImageRequest {
    pub fn new(url: impl Into<String>, target: Size, crop: bool, thumbnail: bool) -> Self {
        Self {
            url: url.into(),
            target: Some(target),
            mode: ContentMode::AspectFill,
            crop,
            upscale: true,
            thumbnail,
        }
    }

    pub fn passthrough(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target: None,
            mode: ContentMode::AspectFill,
            crop: false,
            upscale: false,
            thumbnail: false,
        }
    }
}

/// Everything the request builders need to know about where media is shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutContext {
    pub compact: bool,
    /// Usable width in points once paddings are removed.
    pub content_width: f64,
    pub display_scale: f64,
    pub thumbnail_px: u32,
}

impl LayoutContext {
    pub fn new(cfg: &LayoutConfig, compact: bool, available_width: f64, insets: Insets) -> Self {
        Self {
            compact,
            content_width: content_width(available_width, insets),
            display_scale: cfg.display_scale,
            thumbnail_px: compact_thumbnail_px(cfg.compact_thumbnail, cfg.display_scale),
        }
    }

    /// Request for an image laid out `width` points wide.
    ///
    /// A zero width never yields a resize target. Compact mode always asks for
    /// the fixed square thumbnail, and gifs never get the secondary thumbnail
    /// so they keep animating.
    pub fn request(&self, url: &str, natural: Size, width: f64) -> ImageRequest {
        let width_px = to_pixels(width, self.display_scale);
        if width_px == 0 {
            return ImageRequest::passthrough(url);
        }

        if self.compact {
            if self.thumbnail_px == 0 {
                return ImageRequest::passthrough(url);
            }
            let thumbnail = !has_suffix(url, ".gif");
            return ImageRequest::new(url, Size::square(self.thumbnail_px), false, thumbnail);
        }

        let height_px = if natural.is_known() {
            let ratio = f64::from(natural.height) / f64::from(natural.width);
            (f64::from(width_px) * ratio).round().max(1.0) as u32
        } else {
            width_px
        };
        ImageRequest::new(url, Size::new(width_px, height_px), false, false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    pub url: String,
    pub size: Size,
    pub request: ImageRequest,
}

impl Image {
    pub fn new(url: impl Into<String>, size: Size, ctx: &LayoutContext, width: f64) -> Self {
        let url = url.into();
        let request = ctx.request(&url, size, width);
        Self { url, size, request }
    }
}

/// Available width minus both inner and both outer horizontal paddings.
pub fn content_width(available: f64, insets: Insets) -> f64 {
    let width = available - insets.inner * 2.0 - insets.outer * 2.0;
    if width.is_finite() {
        width.max(0.0)
    } else {
        0.0
    }
}

/// Per-item widths for a gallery of `count` images.
///
/// One image spans the full width. Two images split it around `spacing`.
/// Three put two halves over a full-width third. Anything else falls back to
/// halves for every item.
pub fn gallery_widths(count: usize, width: f64, spacing: f64) -> Vec<f64> {
    let half = ((width - spacing) / 2.0).max(0.0);
    match count {
        0 => Vec::new(),
        1 => vec![width],
        2 => vec![half, half],
        3 => vec![half, half, width],
        _ => vec![half; count],
    }
}

/// Square thumbnail edge in pixels for compact rows.
pub fn compact_thumbnail_px(points: f64, scale: f64) -> u32 {
    to_pixels(points, scale)
}

fn to_pixels(points: f64, scale: f64) -> u32 {
    let px = (points * scale).round();
    if px.is_finite() && px > 0.0 {
        px.min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

/// Parses a link that may be relative to reddit (`/r/...`, `r/...`, `u/...`)
/// and returns it with its non-empty path segments.
pub fn decompose_url(raw: &str) -> Option<(Url, Vec<String>)> {
    let raw = raw.trim().replace("&amp;", "&");
    if raw.is_empty() {
        return None;
    }
    let absolute = if raw.starts_with('/') && !raw.starts_with("//") {
        format!("{}{}", PLATFORM_ORIGIN, raw)
    } else if raw.starts_with("r/") || raw.starts_with("u/") {
        format!("{}/{}", PLATFORM_ORIGIN, raw)
    } else {
        raw
    };
    let url = Url::parse(&absolute).ok()?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return None;
    }
    let segments = url
        .path_segments()
        .map(|parts| {
            parts
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some((url, segments))
}

/// Exact suffix test on the URL's path, ignoring any query or fragment.
pub fn has_suffix(url: &str, suffix: &str) -> bool {
    let end = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
    url[..end].ends_with(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(compact: bool, width: f64) -> LayoutContext {
        LayoutContext {
            compact,
            content_width: width,
            display_scale: 2.0,
            thumbnail_px: 144,
        }
    }

    #[test]
    fn gallery_layout_table() {
        assert_eq!(gallery_widths(1, 300.0, 8.0), vec![300.0]);
        assert_eq!(gallery_widths(2, 300.0, 8.0), vec![146.0, 146.0]);
        assert_eq!(gallery_widths(3, 300.0, 8.0), vec![146.0, 146.0, 300.0]);
        assert_eq!(gallery_widths(5, 300.0, 8.0), vec![146.0; 5]);
        assert!(gallery_widths(0, 300.0, 8.0).is_empty());
    }

    #[test]
    fn content_width_subtracts_both_sides() {
        let insets = Insets {
            inner: 8.0,
            outer: 12.0,
        };
        assert_eq!(content_width(400.0, insets), 360.0);
        assert_eq!(content_width(10.0, insets), 0.0);
    }

    #[test]
    fn zero_width_passes_through() {
        let request = ctx(false, 0.0).request("https://i.redd.it/a.png", Size::new(10, 10), 0.0);
        assert_eq!(request, ImageRequest::passthrough("https://i.redd.it/a.png"));

        let request = ctx(true, 0.0).request("https://i.redd.it/a.png", Size::new(10, 10), 0.0);
        assert!(request.target.is_none());
    }

    #[test]
    fn full_mode_keeps_aspect_ratio() {
        let request = ctx(false, 300.0).request("https://i.redd.it/a.png", Size::new(1000, 500), 300.0);
        assert_eq!(request.target, Some(Size::new(600, 300)));
        assert_eq!(request.mode, ContentMode::AspectFill);
        assert!(!request.crop);
        assert!(request.upscale);
        assert!(!request.thumbnail);
    }

    #[test]
    fn full_mode_unknown_size_is_square() {
        let request = ctx(false, 100.0).request("https://i.redd.it/a.png", Size::default(), 100.0);
        assert_eq!(request.target, Some(Size::square(200)));
    }

    #[test]
    fn compact_mode_uses_fixed_thumbnail() {
        let request = ctx(true, 300.0).request("https://i.redd.it/a.jpg", Size::new(1000, 500), 146.0);
        assert_eq!(request.target, Some(Size::square(144)));
        assert!(request.thumbnail);
    }

    #[test]
    fn compact_gif_skips_secondary_thumbnail() {
        let request = ctx(true, 300.0).request("https://i.redd.it/a.gif?x=1", Size::new(10, 10), 300.0);
        assert_eq!(request.target, Some(Size::square(144)));
        assert!(!request.thumbnail);
    }

    #[test]
    fn thumbnail_pixels_follow_scale() {
        assert_eq!(compact_thumbnail_px(72.0, 2.0), 144);
        assert_eq!(compact_thumbnail_px(72.0, 0.0), 0);
        assert_eq!(compact_thumbnail_px(-1.0, 2.0), 0);
    }

    #[test]
    fn decompose_relative_links() {
        let (url, segments) = decompose_url("/r/rust/comments/abc/title/").unwrap();
        assert_eq!(url.host_str(), Some("www.reddit.com"));
        assert_eq!(segments, vec!["r", "rust", "comments", "abc", "title"]);

        let (_, segments) = decompose_url("u/spez").unwrap();
        assert_eq!(segments, vec!["u", "spez"]);
    }

    #[test]
    fn decompose_rejects_garbage() {
        assert!(decompose_url("").is_none());
        assert!(decompose_url("not a url").is_none());
        assert!(decompose_url("mailto:someone@example.com").is_none());
    }

    #[test]
    fn suffix_ignores_query() {
        assert!(has_suffix("https://x.test/a.png?width=10", ".png"));
        assert!(!has_suffix("https://x.test/a.png.html", ".png"));
        assert!(!has_suffix("https://x.test/a.PNG", ".png"));
    }

    #[test]
    fn api_sizes_clamp_negatives() {
        assert_eq!(Size::from_api(-5, 20), Size::new(0, 20));
        assert!(!Size::from_api(0, 20).is_known());
    }
}
