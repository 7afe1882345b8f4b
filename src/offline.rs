//! Request routing for the static-asset cache that serves the dashboard
//! shell offline. Storage belongs to whatever host applies the strategy.

use reqwest::Url;
use serde::Serialize;

pub const SHELL_CACHE_NAME: &str = "live-feed-shell-v1";
pub const SHELL_ENTRY: &str = "/index.html";
pub const PRECACHE_MANIFEST: &[&str] = &["/", SHELL_ENTRY, "/live-feed.js", "/manifest.json"];

/// Responses from this host are never cached.
pub const STREAM_ORIGIN_HOST: &str = "stream.binance.com";

const PASS_THROUGH_SCHEMES: &[&str] = &["ws", "wss", "data", "chrome-extension"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheStrategy {
    /// Not intercepted at all.
    PassThrough,
    /// Network, cache a copy, serve the shell entry when offline.
    NetworkFirstShell,
    /// Network, never cache, serve any previously cached copy when offline.
    NetworkFirstUncached,
    /// Cache, then network with a best-effort cache write.
    CacheFirst,
    /// Network, then whatever the cache holds for the same request.
    NetworkFirst,
}

impl CacheStrategy {
    pub fn caches_response(self) -> bool {
        matches!(self, Self::NetworkFirstShell | Self::CacheFirst)
    }

    pub fn offline_fallback(self) -> Option<&'static str> {
        match self {
            Self::NetworkFirstShell | Self::CacheFirst => Some(SHELL_ENTRY),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: String,
    pub navigate: bool,
    pub accept: Option<String>,
}

impl RequestDescriptor {
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: "GET".to_string(),
            ..Default::default()
        }
    }

    fn wants_html(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
            && self
                .accept
                .as_deref()
                .is_some_and(|accept| accept.contains("text/html"))
    }
}

/// Cache names left over from earlier shell versions, to drop on activation.
pub fn stale_caches<'a>(cache_names: &[&'a str]) -> Vec<&'a str> {
    cache_names
        .iter()
        .copied()
        .filter(|name| *name != SHELL_CACHE_NAME)
        .collect()
}

pub fn classify_request(request: &RequestDescriptor, page_origin: &str) -> CacheStrategy {
    let scheme = request
        .url
        .split_once(':')
        .map(|(scheme, _)| scheme.to_ascii_lowercase());
    if scheme
        .as_deref()
        .is_some_and(|scheme| PASS_THROUGH_SCHEMES.contains(&scheme))
    {
        return CacheStrategy::PassThrough;
    }

    if request.navigate || request.wants_html() {
        return CacheStrategy::NetworkFirstShell;
    }

    let Ok(url) = Url::parse(&request.url) else {
        return CacheStrategy::NetworkFirst;
    };

    let path = url.path();
    if url.host_str() == Some(STREAM_ORIGIN_HOST) || path.ends_with(".js") || path.ends_with(".json")
    {
        return CacheStrategy::NetworkFirstUncached;
    }

    let same_origin = Url::parse(page_origin)
        .map(|page| page.origin() == url.origin())
        .unwrap_or(false);
    if same_origin {
        CacheStrategy::CacheFirst
    } else {
        CacheStrategy::NetworkFirst
    }
}
