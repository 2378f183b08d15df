//! HTTP plumbing shared by the OpenFDA label client and the chat-completions client.
//!
//! Every request goes through [`fetch`], which applies the cache mode, caps the
//! body size and hands back a [`RawResponse`] for the client to interpret.

use std::borrow::Cow;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use http_cache_reqwest::{
    CACacheManager, Cache, CacheMode, CacheOptions, HttpCache, HttpCacheOptions,
};
use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::LabelQaError;

pub(crate) mod openai;
pub(crate) mod openfda;

/// Upper bound on any response body; a full label is well under 1 MiB.
pub(crate) const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const EXCERPT_MAX_CHARS: usize = 300;
const MAX_RETRIES: u32 = 3;

static HTTP_CLIENT: OnceLock<ClientWithMiddleware> = OnceLock::new();

tokio::task_local! {
    static NO_CACHE: bool;
}

/// Runs `fut` with the HTTP cache bypassed when `no_cache` is set.
pub(crate) async fn with_no_cache<R, F>(no_cache: bool, fut: F) -> R
where
    F: Future<Output = R>,
{
    NO_CACHE.scope(no_cache, fut).await
}

/// Cache override for one request: authenticated calls and `--no-cache` runs
/// are never stored; everything else uses the client default.
pub(crate) fn cache_override(authenticated: bool) -> Option<CacheMode> {
    let no_cache = NO_CACHE.try_with(|v| *v).unwrap_or(false);
    (authenticated || no_cache).then_some(CacheMode::NoStore)
}

pub(crate) fn env_base(default: &'static str, env_var: &str) -> Cow<'static, str> {
    match env_secret(env_var) {
        Some(base) => Cow::Owned(base),
        None => Cow::Borrowed(default),
    }
}

/// Reads an optional setting, treating blank values as unset.
pub(crate) fn env_secret(env_var: &str) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Shared client: disk cache under the labelqa cache dir, then transient retries.
///
/// Label responses without caching headers are served from cache for up to a
/// day (`max-stale=86400`).
pub(crate) fn shared_client() -> Result<ClientWithMiddleware, LabelQaError> {
    if let Some(client) = HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let mut default_headers = HeaderMap::new();
    default_headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-stale=86400"));

    let base_client = reqwest::Client::builder()
        // Generation calls can take well over the usual API latency.
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("labelqa-cli/", env!("CARGO_PKG_VERSION")))
        .default_headers(default_headers)
        .build()
        .map_err(LabelQaError::HttpClientInit)?;

    let cache_dir = crate::utils::cache::labelqa_cache_dir().join("http-cacache");
    std::fs::create_dir_all(&cache_dir)?;

    let cache = Cache(HttpCache {
        mode: CacheMode::Default,
        manager: CACacheManager { path: cache_dir },
        options: HttpCacheOptions {
            // Shared-cache semantics keep authenticated responses out of the store.
            cache_options: Some(CacheOptions {
                shared: true,
                ..CacheOptions::default()
            }),
            ..HttpCacheOptions::default()
        },
    });
    let retry = RetryTransientMiddleware::new_with_policy(
        ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES),
    );

    let client = ClientBuilder::new(base_client).with(cache).with(retry).build();
    Ok(HTTP_CLIENT.get_or_init(|| client).clone())
}

/// Status, content type and capped body of a completed request.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Short single-line preview of the body for error messages.
    pub fn excerpt(&self) -> String {
        excerpt(&self.body)
    }

    /// Parses the body as JSON after rejecting HTML error pages.
    pub fn json<T: DeserializeOwned>(&self, api: &str) -> Result<T, LabelQaError> {
        check_json_media_type(api, self.content_type.as_ref(), &self.body)?;
        serde_json::from_slice(&self.body).map_err(|source| LabelQaError::ApiJson {
            api: api.to_string(),
            source,
        })
    }

    /// `Api` error carrying the status and `detail`.
    pub fn status_error(&self, api: &str, detail: &str) -> LabelQaError {
        LabelQaError::Api {
            api: api.to_string(),
            message: format!("HTTP {}: {detail}", self.status),
        }
    }
}

/// Sends `req` and reads its body, capped at [`MAX_BODY_BYTES`].
pub(crate) async fn fetch(
    req: RequestBuilder,
    api: &str,
    authenticated: bool,
) -> Result<RawResponse, LabelQaError> {
    let req = match cache_override(authenticated) {
        Some(mode) => req.with_extension(mode),
        None => req,
    };
    let resp = req.send().await?;
    let status = resp.status();
    let content_type = resp.headers().get(CONTENT_TYPE).cloned();
    let body = read_capped(resp, api, MAX_BODY_BYTES).await?;
    debug!(api, %status, bytes = body.len(), "Response received");
    Ok(RawResponse {
        status,
        content_type,
        body,
    })
}

async fn read_capped(
    mut resp: reqwest::Response,
    api: &str,
    cap: usize,
) -> Result<Vec<u8>, LabelQaError> {
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if body.len() + chunk.len() > cap {
            return Err(LabelQaError::Api {
                api: api.to_string(),
                message: format!("Response body exceeded {cap} bytes"),
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out = String::new();
    let mut count = 0;
    for word in text.split_whitespace() {
        let len = word.chars().count();
        if count + len > EXCERPT_MAX_CHARS {
            out.push_str(" …");
            return out;
        }
        if !out.is_empty() {
            out.push(' ');
            count += 1;
        }
        out.push_str(word);
        count += len;
    }
    out
}

fn check_json_media_type(
    api: &str,
    content_type: Option<&HeaderValue>,
    body: &[u8],
) -> Result<(), LabelQaError> {
    let Some(raw) = content_type.and_then(|v| v.to_str().ok()) else {
        return Ok(());
    };
    let media_type = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match media_type.as_str() {
        "" | "application/json" | "text/json" => Ok(()),
        "text/html" | "application/xhtml+xml" => Err(LabelQaError::Api {
            api: api.to_string(),
            message: format!("Unexpected HTML response: {}", excerpt(body)),
        }),
        other if other.ends_with("+json") => Ok(()),
        other => {
            warn!(api, content_type = other, "Non-JSON content type; parsing as JSON anyway");
            Ok(())
        }
    }
}
