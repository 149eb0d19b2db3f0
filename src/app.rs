use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config;
use crate::extract::{ExtractedMedia, Extractor};
use crate::reddit::{self, Post};
use crate::redgifs;

/// Width in points used when none is given.
pub const DEFAULT_WIDTH: f64 = 390.0;

#[derive(Debug, Clone)]
pub struct Options {
    /// `None` or `-` reads the post from stdin.
    pub input: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub compact: bool,
    pub width: f64,
    /// Fetch linked entities and wait this long for them.
    pub wait: Option<Duration>,
    /// Look up redgifs details for a redgifs result.
    pub resolve: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            input: None,
            config_file: None,
            compact: false,
            width: DEFAULT_WIDTH,
            wait: None,
            resolve: false,
        }
    }
}

pub fn run(opts: Options) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: opts.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;

    let raw = read_input(opts.input.as_ref())?;
    let post = parse_post(&raw)?;

    let mut extractor = Extractor::new(cfg.layout.clone());
    if opts.wait.is_some() {
        let client = reddit::Client::new(reddit::ClientConfig {
            user_agent: cfg.reddit.user_agent.clone(),
            base_url: Some(cfg.reddit.base_url.clone()),
            timeout: Some(cfg.reddit.timeout),
            http_client: None,
        })
        .context("build reddit client")?;
        extractor = extractor.with_fetcher(Arc::new(client));
    }

    let media = extractor.extract(&post, opts.compact, opts.width, None);
    if let (Some(timeout), Some(media)) = (opts.wait, media.as_ref()) {
        wait_for_entity(media, timeout);
    }

    let mut output = serde_json::to_value(&media).context("serialize media")?;
    if opts.resolve {
        if let Some(ExtractedMedia::Redgifs { id }) = &media {
            let tokens = redgifs::TokenClient::shared(&cfg.redgifs)?;
            let gif = redgifs::Client::new(tokens)?
                .gif(id)
                .with_context(|| format!("resolve redgifs {}", id))?;
            output = json!({ "media": output, "gif": gif });
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &output).context("write output")?;
    writeln!(out)?;
    Ok(())
}

fn wait_for_entity(media: &ExtractedMedia, timeout: Duration) {
    let populated = match media {
        ExtractedMedia::Post { entity } => entity.wait_timeout(timeout),
        ExtractedMedia::Comment { entity, .. } => entity.wait_timeout(timeout),
        ExtractedMedia::Subreddit { entity } => entity.wait_timeout(timeout),
        ExtractedMedia::User { entity } => entity.wait_timeout(timeout),
        _ => return,
    };
    if !populated {
        warn!(?timeout, "linked entity not populated");
    }
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path)
            .with_context(|| format!("read post from {}", path.display())),
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("read post from stdin")?;
            Ok(buf)
        }
    }
}

/// Accepts either a bare post object or a `{kind, data}` thing wrapper.
pub fn parse_post(raw: &str) -> Result<Post> {
    let value: Value = serde_json::from_str(raw).context("parse post json")?;
    let value = if value.get("kind").is_some() && value.get("data").is_some() {
        debug!("unwrapping thing envelope");
        value["data"].clone()
    } else {
        value
    };
    serde_json::from_value(value).context("decode post")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_wrapped_posts() {
        let bare = parse_post(r#"{"id": "a", "url": "https://streamable.com/x"}"#).unwrap();
        assert_eq!(bare.id, "a");

        let wrapped = parse_post(r#"{"kind": "t3", "data": {"id": "b"}}"#).unwrap();
        assert_eq!(wrapped.id, "b");
    }

    #[test]
    fn rejects_non_objects() {
        assert!(parse_post("[1, 2]").is_err());
        assert!(parse_post("not json").is_err());
    }
}
