use std::sync::Arc;

use anyhow::{bail, Context};
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::RedgifsConfig;

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("redgifs: token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("redgifs: token request returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("redgifs: decode token response: {0}")]
    Decode(String),
    #[error("redgifs: token response missing token")]
    MissingToken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BearerToken {
    pub value: String,
    /// `None` when the token's payload carries no readable `exp` claim.
    pub expires_at: Option<DateTime<Utc>>,
}

impl BearerToken {
    pub fn new(value: String) -> Self {
        let expires_at = token_expiry(&value);
        if expires_at.is_none() {
            warn!("redgifs token expiry unreadable; keeping it until invalidated");
        }
        Self { value, expires_at }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry > now,
            None => true,
        }
    }
}

/// Holds the temporary bearer token for the redgifs API.
///
/// The lock is held across the expiry check and the refresh, so callers that
/// arrive during a refresh wait for it and reuse its result instead of
/// issuing their own request.
pub struct TokenClient {
    cfg: RedgifsConfig,
    http: HttpClient,
    current: Mutex<Option<BearerToken>>,
}

impl TokenClient {
    pub fn new(cfg: RedgifsConfig) -> Result<Self, AuthError> {
        let http = HttpClient::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            cfg,
            http,
            current: Mutex::new(None),
        })
    }

    /// Process-wide instance. The config only applies to the first call.
    pub fn shared(cfg: &RedgifsConfig) -> Result<Arc<TokenClient>, AuthError> {
        static SHARED: OnceCell<Arc<TokenClient>> = OnceCell::new();
        SHARED
            .get_or_try_init(|| TokenClient::new(cfg.clone()).map(Arc::new))
            .cloned()
    }

    /// Returns a usable token, fetching one first if none is held or the
    /// held one has expired. Failures are returned as-is, without retry.
    pub fn token(&self) -> Result<String, AuthError> {
        let mut current = self.current.lock();
        if let Some(token) = current.as_ref() {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.value.clone());
            }
            debug!(expires_at = ?token.expires_at, "redgifs token expired");
        }

        let fresh = self.fetch()?;
        let value = fresh.value.clone();
        *current = Some(fresh);
        Ok(value)
    }

    pub fn current(&self) -> Option<BearerToken> {
        self.current.lock().clone()
    }

    /// Drops the held token so the next [`TokenClient::token`] refetches.
    pub fn invalidate(&self) {
        *self.current.lock() = None;
    }

    fn fetch(&self) -> Result<BearerToken, AuthError> {
        let resp = self
            .http
            .get(&self.cfg.auth_url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, self.cfg.user_agent.clone())
            .header(ACCEPT_ENCODING, "identity")
            .header(ACCEPT_LANGUAGE, self.cfg.accept_language.clone())
            .send()?;

        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(AuthError::Status { status, body });
        }

        let payload: TokenResponse =
            serde_json::from_str(&body).map_err(|err| AuthError::Decode(err.to_string()))?;
        let value = payload
            .token
            .filter(|token| !token.trim().is_empty())
            .ok_or(AuthError::MissingToken)?;

        let token = BearerToken::new(value);
        debug!(expires_at = ?token.expires_at, "redgifs token refreshed");
        Ok(token)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

/// Reads the `exp` claim (epoch seconds) from a JWT-shaped token.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp, 0)
}

/// Media lookups that need a redgifs bearer token.
pub struct Client {
    tokens: Arc<TokenClient>,
    api_url: Url,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gif {
    pub id: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub urls: GifUrls,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GifUrls {
    #[serde(default)]
    pub hd: Option<String>,
    #[serde(default)]
    pub sd: Option<String>,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl Gif {
    pub fn best_url(&self) -> Option<&str> {
        self.urls.hd.as_deref().or(self.urls.sd.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct GifResponse {
    gif: Gif,
}

impl Client {
    pub fn new(tokens: Arc<TokenClient>) -> anyhow::Result<Self> {
        let api_url = Url::parse(&tokens.cfg.api_url).context("redgifs: parse api url")?;
        Ok(Self { tokens, api_url })
    }

    pub fn gif(&self, id: &str) -> anyhow::Result<Gif> {
        if id.trim().is_empty() {
            bail!("redgifs: gif id required");
        }
        let token = self.tokens.token()?;
        let path = format!("gifs/{}", utf8_percent_encode(id, PATH_SEGMENT));
        let url = self.api_url.join(&path)?;

        let resp = self
            .tokens
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, self.tokens.cfg.user_agent.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .context("redgifs: gif request")?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate();
            bail!("redgifs: unauthorized");
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            bail!("redgifs: gif request failed {}: {}", status, body);
        }

        let payload: GifResponse = resp.json().context("redgifs: decode gif")?;
        Ok(payload.gif)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn jwt(payload: &str) -> String {
        format!(
            "eyJhbGciOiJIUzI1NiJ9.{}.signature",
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn expiry_from_exp_claim() {
        let token = jwt(r#"{"exp": 1000000000}"#);
        assert_eq!(
            token_expiry(&token),
            DateTime::from_timestamp(1_000_000_000, 0)
        );
    }

    #[test]
    fn expiry_accepts_padded_segments() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":12}"#);
        let token = format!("head.{}.sig", payload);
        assert_eq!(token_expiry(&token), DateTime::from_timestamp(12, 0));
    }

    #[test]
    fn unreadable_expiry_is_none() {
        assert_eq!(token_expiry("plain-token"), None);
        assert_eq!(token_expiry("a.!!!.c"), None);
        assert_eq!(token_expiry(&jwt("not json")), None);
        assert_eq!(token_expiry(&jwt(r#"{"sub": "x"}"#)), None);
    }

    #[test]
    fn validity_follows_clock() {
        let now = Utc::now();
        let token = BearerToken {
            value: "t".into(),
            expires_at: Some(now + Duration::seconds(60)),
        };
        assert!(token.is_valid_at(now));
        assert!(!token.is_valid_at(now + Duration::seconds(61)));

        let forever = BearerToken::new("no-expiry".into());
        assert_eq!(forever.expires_at, None);
        assert!(forever.is_valid_at(now + Duration::days(365)));
    }

    #[test]
    fn gif_prefers_hd() {
        let gif: Gif = serde_json::from_str(
            r#"{"id": "abc", "urls": {"sd": "https://media.test/sd.mp4", "hd": "https://media.test/hd.mp4"}}"#,
        )
        .unwrap();
        assert_eq!(gif.best_url(), Some("https://media.test/hd.mp4"));
    }
}
